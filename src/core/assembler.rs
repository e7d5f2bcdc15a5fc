use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Destination file shared by every segment of one task. Segments write only
/// inside their own range; the mutex serialises seek+write pairs.
pub struct Assembler {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl Assembler {
    /// Create (truncating) the destination and pre-allocate it when the size
    /// is known.
    pub async fn create(path: &Path, total_size: Option<u64>) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .await
            .with_context(|| format!("open {:?}", path))?;

        if let Some(sz) = total_size {
            file.set_len(sz)
                .await
                .with_context(|| format!("pre-allocate {} bytes for {:?}", sz, path))?;
        }

        Ok(Self { path: path.to_path_buf(), file: tokio::sync::Mutex::new(file) })
    }

    /// Open an existing destination without touching its contents.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .with_context(|| format!("open {:?}", path))?;
        Ok(Self { path: path.to_path_buf(), file: tokio::sync::Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_at(&self, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        let mut f = self.file.lock().await;
        f.seek(std::io::SeekFrom::Start(offset)).await?;
        f.write_all(data).await?;
        Ok(())
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        let mut f = self.file.lock().await;
        f.flush().await.with_context(|| format!("flush {}", self.path.display()))?;
        f.sync_data().await.with_context(|| format!("sync {}", self.path.display()))?;
        Ok(())
    }
}
