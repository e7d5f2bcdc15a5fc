use crate::core::model::{ProgressInfo, TaskId, TaskStatus};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    TaskAdded { task_id: TaskId, filename: String, target_path: PathBuf, url: String },
    TaskRemoved { task_id: TaskId },
    TaskStatusChanged { task_id: TaskId, old: TaskStatus, new: TaskStatus },
    Progress { task_id: TaskId, progress: ProgressInfo },
}

/// Delivered to each status subscriber of a task, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub task_id: TaskId,
    pub old: TaskStatus,
    pub new: TaskStatus,
}
