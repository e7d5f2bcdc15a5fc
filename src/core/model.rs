use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    None,
    Queued,
    Connecting,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Error)
    }

    /// Occupies an execution slot in the queue.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Connecting | TaskStatus::Downloading)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            TaskStatus::None => 0,
            TaskStatus::Queued => 1,
            TaskStatus::Connecting => 2,
            TaskStatus::Downloading => 3,
            TaskStatus::Paused => 4,
            TaskStatus::Completed => 5,
            TaskStatus::Error => 6,
            TaskStatus::Canceled => 7,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskStatus::Queued,
            2 => TaskStatus::Connecting,
            3 => TaskStatus::Downloading,
            4 => TaskStatus::Paused,
            5 => TaskStatus::Completed,
            6 => TaskStatus::Error,
            7 => TaskStatus::Canceled,
            _ => TaskStatus::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    None,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl SegmentStatus {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            SegmentStatus::None => 0,
            SegmentStatus::Downloading => 1,
            SegmentStatus::Paused => 2,
            SegmentStatus::Completed => 3,
            SegmentStatus::Error => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SegmentStatus::Downloading,
            2 => SegmentStatus::Paused,
            3 => SegmentStatus::Completed,
            4 => SegmentStatus::Error,
            _ => SegmentStatus::None,
        }
    }
}

/// Advisory only; admission is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskType {
    #[default]
    Regular,
    Streaming,
    Batch,
    Scheduled,
}

/// Inclusive byte range owned by one segment. `end == None` means the
/// resource length is unknown and the segment reads until EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
}

impl SegmentRange {
    pub fn len(&self) -> Option<u64> {
        self.end.map(|e| e - self.start + 1)
    }
}

/// Everything a caller supplies when creating a task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub url: String,
    pub destination: PathBuf,
    pub filename: Option<String>,
    pub segment_count: usize,
    pub priority: Priority,
    pub task_type: TaskType,
    pub headers: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

impl TaskRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            filename: None,
            segment_count: 1,
            priority: Priority::default(),
            task_type: TaskType::default(),
            headers: HashMap::new(),
            options: HashMap::new(),
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn segments(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub percent: f64,
    pub speed_bps: u64,
    pub average_speed_bps: u64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SegmentSnapshot {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
    pub status: SegmentStatus,
    pub downloaded: u64,
    pub speed_bps: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    pub destination: PathBuf,
    pub filename: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub task_type: TaskType,
    pub total_size: Option<u64>,
    pub supports_resume: bool,
    pub segment_count: usize,
    pub error: Option<String>,
    pub progress: ProgressInfo,
    pub segments: Vec<SegmentSnapshot>,
}

impl TaskSnapshot {
    pub fn file_path(&self) -> PathBuf {
        self.destination.join(&self.filename)
    }
}
