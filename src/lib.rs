//! Segmented, resumable, multi-protocol download engine.

pub mod config;
pub mod core;
pub mod plugins;

pub use crate::config::Settings;
pub use crate::core::engine::Engine;
pub use crate::core::error::{EngineError, EngineResult};
pub use crate::core::events::EngineEvent;
pub use crate::core::model::{ProgressInfo, TaskId, TaskRequest, TaskSnapshot, TaskStatus};
pub use crate::plugins::registry::ProtocolRegistry;
