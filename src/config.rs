use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::plugins::registry::DriverContext;

/// Values read from the optional JSON settings file. Every field has a
/// default so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub download_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub segment_count: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Global cap across every segment of every task, bytes per second.
    pub speed_limit_bps: Option<u32>,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let ctx = DriverContext::default();
        Self {
            download_dir: PathBuf::from("./downloads"),
            max_concurrent_downloads: 3,
            segment_count: 4,
            max_retries: ctx.retries,
            retry_backoff_ms: ctx.retry_backoff_ms,
            speed_limit_bps: None,
            user_agent: ctx.user_agent,
            timeout_secs: ctx.timeout_secs,
        }
    }
}

impl Settings {
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("read settings {}", path.display())),
        };
        serde_json::from_str(&raw).with_context(|| format!("parse settings {}", path.display()))
    }

    pub fn driver_context(&self) -> DriverContext {
        DriverContext {
            user_agent: self.user_agent.clone(),
            timeout_secs: self.timeout_secs,
            retries: self.max_retries.max(1),
            retry_backoff_ms: self.retry_backoff_ms,
            ..DriverContext::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.max_concurrent_downloads, 3);
        assert_eq!(s.segment_count, 4);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segdl.json");
        std::fs::write(&path, r#"{ "segment_count": 8, "speed_limit_bps": 1048576 }"#).unwrap();

        let s = Settings::load(&path).unwrap();
        assert_eq!(s.segment_count, 8);
        assert_eq!(s.speed_limit_bps, Some(1_048_576));
        assert_eq!(s.max_retries, 3);

        let ctx = s.driver_context();
        assert_eq!(ctx.retries, 3);
        assert_eq!(ctx.retry_backoff_ms, 2000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse settings"));
    }
}
