use crate::core::model::{TaskId, TaskStatus};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("cannot {op} a task in status {status:?}")]
    InvalidState { op: &'static str, status: TaskStatus },

    #[error("no transport registered for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
