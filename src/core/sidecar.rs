//! `<filename>.meta` companion record written next to the destination file.
//!
//! Line oriented `key=value`; unknown keys are ignored on read so newer
//! writers stay readable.

use anyhow::Context;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarRecord {
    pub id: String,
    pub url: String,
    pub file_size: Option<u64>,
    pub supports_resume: bool,
    pub segment_count: usize,
    pub timestamp: i64,
}

pub fn sidecar_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".meta");
    file_path.with_file_name(name)
}

fn now_epoch() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl SidecarRecord {
    pub fn new(id: String, url: String, file_size: Option<u64>, supports_resume: bool, segment_count: usize) -> Self {
        Self { id, url, file_size, supports_resume, segment_count, timestamp: now_epoch() }
    }

    fn render(&self) -> String {
        // -1 keeps the unknown-size convention readable by other tools
        let size = self.file_size.map(|s| s as i64).unwrap_or(-1);
        format!(
            "id={}\nurl={}\nfile_size={}\nsupports_resume={}\nsegment_count={}\ntimestamp={}\n",
            self.id, self.url, size, self.supports_resume, self.segment_count, self.timestamp
        )
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        let mut id = None;
        let mut url = None;
        let mut file_size = None;
        let mut supports_resume = false;
        let mut segment_count = 1;
        let mut timestamp = 0;

        for line in text.lines() {
            let Some((k, v)) = line.split_once('=') else { continue };
            let v = v.trim();
            match k.trim() {
                "id" => id = Some(v.to_string()),
                "url" => url = Some(v.to_string()),
                "file_size" => {
                    let n: i64 = v.parse().context("file_size")?;
                    file_size = (n >= 0).then_some(n as u64);
                }
                "supports_resume" => supports_resume = v == "true" || v == "1",
                "segment_count" => segment_count = v.parse().context("segment_count")?,
                "timestamp" => timestamp = v.parse().context("timestamp")?,
                _ => {}
            }
        }

        Ok(Self {
            id: id.context("missing id")?,
            url: url.context("missing url")?,
            file_size,
            supports_resume,
            segment_count,
            timestamp,
        })
    }

    pub async fn write(&self, file_path: &Path) -> anyhow::Result<()> {
        let path = sidecar_path(file_path);
        tokio::fs::write(&path, self.render())
            .await
            .with_context(|| format!("write sidecar {}", path.display()))
    }

    /// `Ok(None)` when no sidecar exists.
    pub async fn read(file_path: &Path) -> anyhow::Result<Option<Self>> {
        let path = sidecar_path(file_path);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(Self::parse(&text).with_context(|| format!("parse {}", path.display()))?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read sidecar {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_file() {
        let p = sidecar_path(Path::new("/tmp/dl/movie.mkv"));
        assert_eq!(p, PathBuf::from("/tmp/dl/movie.mkv.meta"));
    }

    #[tokio::test]
    async fn written_record_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        let rec = SidecarRecord::new("abc".into(), "http://h/a.bin".into(), Some(1000), true, 4);
        rec.write(&file).await.unwrap();

        let text = tokio::fs::read_to_string(dir.path().join("a.bin.meta")).await.unwrap();
        assert!(text.contains("file_size=1000\n"));
        assert!(text.contains("supports_resume=true\n"));
        assert!(text.contains("segment_count=4\n"));

        assert_eq!(SidecarRecord::read(&file).await.unwrap(), Some(rec));
    }

    #[test]
    fn unknown_size_round_trips_as_minus_one() {
        let rec = SidecarRecord::new("x".into(), "ftp://h/x".into(), None, false, 1);
        assert!(rec.render().contains("file_size=-1\n"));
        assert_eq!(SidecarRecord::parse(&rec.render()).unwrap().file_size, None);
    }

    #[tokio::test]
    async fn missing_sidecar_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SidecarRecord::read(&dir.path().join("nope.bin")).await.unwrap(), None);
    }
}
