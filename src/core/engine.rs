use crate::config::Settings;
use crate::core::error::{EngineError, EngineResult};
use crate::core::events::EngineEvent;
use crate::core::model::*;
use crate::core::queue::DownloadQueue;
use crate::core::task::{DownloadTask, TaskDeps};
use crate::core::throttle::Throttle;
use crate::plugins::registry::ProtocolRegistry;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{info, warn};

struct Defaults {
    download_dir: PathBuf,
    segment_count: usize,
}

/// Command surface over one queue. Cheap to clone; every clone drives the
/// same tasks and the same event bus.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ProtocolRegistry>,
    queue: DownloadQueue,
    deps: TaskDeps,
    event_tx: broadcast::Sender<EngineEvent>,
    defaults: Arc<Mutex<Defaults>>,
}

impl Engine {
    pub async fn new(registry: ProtocolRegistry, settings: &Settings) -> anyhow::Result<Self> {
        let (event_tx, _) = broadcast::channel(1024);

        tokio::fs::create_dir_all(&settings.download_dir)
            .await
            .with_context(|| format!("create download dir {}", settings.download_dir.display()))?;

        let registry = Arc::new(registry);
        let throttle = settings.speed_limit_bps.and_then(Throttle::new).map(Arc::new);
        if let Some(t) = &throttle {
            info!(bytes_per_sec = t.bytes_per_sec(), "global speed limit enabled");
        }

        Ok(Self {
            deps: TaskDeps { registry: registry.clone(), throttle, events: event_tx.clone() },
            registry,
            queue: DownloadQueue::new(settings.max_concurrent_downloads),
            event_tx,
            defaults: Arc::new(Mutex::new(Defaults {
                download_dir: settings.download_dir.clone(),
                segment_count: settings.segment_count.max(1),
            })),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    fn defaults(&self) -> std::sync::MutexGuard<'_, Defaults> {
        self.defaults.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A request prefilled with the default directory and segment count.
    pub fn request(&self, url: impl Into<String>) -> TaskRequest {
        let d = self.defaults();
        TaskRequest::new(url, d.download_dir.clone()).segments(d.segment_count)
    }

    pub async fn add(
        &self,
        url: &str,
        destination: Option<&Path>,
        filename: Option<&str>,
        autostart: bool,
    ) -> EngineResult<TaskId> {
        let mut req = self.request(url);
        if let Some(d) = destination {
            req.destination = d.to_path_buf();
        }
        if let Some(f) = filename {
            req.filename = Some(f.to_string());
        }
        self.add_download(req, autostart).await
    }

    /// Register a task. With `autostart` it goes straight into admission; a
    /// start failure leaves the task registered in ERROR.
    pub async fn add_download(&self, request: TaskRequest, autostart: bool) -> EngineResult<TaskId> {
        let task = DownloadTask::new(request, self.deps.clone())?;
        let task_id = task.id();
        let snap = task.snapshot();

        self.queue.add_task(task).await;
        let _ = self.event_tx.send(EngineEvent::TaskAdded {
            task_id,
            filename: snap.filename.clone(),
            target_path: snap.file_path(),
            url: snap.url.clone(),
        });
        info!(task_id = %task_id, url = %snap.url, path = %snap.file_path().display(), "task added");

        if autostart {
            if let Err(e) = self.queue.start_task(task_id).await {
                warn!(task_id = %task_id, error = %e, "autostart failed");
            }
        }
        Ok(task_id)
    }

    pub async fn start(&self, id: TaskId) -> EngineResult<()> {
        self.queue.start_task(id).await
    }

    pub async fn pause(&self, id: TaskId) -> EngineResult<()> {
        self.queue.pause_task(id).await
    }

    pub async fn resume(&self, id: TaskId) -> EngineResult<()> {
        self.queue.resume_task(id).await
    }

    pub async fn cancel(&self, id: TaskId) -> EngineResult<()> {
        self.queue.cancel_task(id).await
    }

    pub async fn remove(&self, id: TaskId, delete_files: bool) -> EngineResult<()> {
        let task = self.queue.remove_task(id).await?;
        if delete_files {
            task.remove_files().await.map_err(EngineError::Other)?;
        }
        let _ = self.event_tx.send(EngineEvent::TaskRemoved { task_id: id });
        info!(task_id = %id, delete_files, "task removed");
        Ok(())
    }

    pub async fn start_all(&self) {
        self.queue.start_all().await
    }

    pub async fn pause_all(&self) {
        self.queue.pause_all().await
    }

    pub async fn resume_all(&self) {
        self.queue.resume_all().await
    }

    pub async fn cancel_all(&self) {
        self.queue.cancel_all().await
    }

    pub fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.queue.get(id).map(|t| t.snapshot())
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.queue.tasks().iter().map(|t| t.snapshot()).collect()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskSnapshot> {
        self.queue.tasks_by_status(status).iter().map(|t| t.snapshot()).collect()
    }

    pub async fn set_max_concurrency(&self, max: usize) {
        self.queue.set_max_concurrent(max).await
    }

    pub fn max_concurrency(&self) -> usize {
        self.queue.max_concurrent()
    }

    pub fn set_default_directory(&self, dir: impl Into<PathBuf>) {
        self.defaults().download_dir = dir.into();
    }

    pub fn default_directory(&self) -> PathBuf {
        self.defaults().download_dir.clone()
    }

    pub fn set_default_segments(&self, count: usize) {
        self.defaults().segment_count = count.max(1);
    }

    /// The periodic progress tick: recomputes every running task's progress
    /// and publishes it on the event bus. Abort the handle to stop it.
    pub fn spawn_progress_driver(&self, every: Duration) -> JoinHandle<()> {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                for task in queue.tasks().into_iter().filter(|t| t.status() == TaskStatus::Downloading) {
                    task.update_progress().await;
                }
            }
        })
    }

    /// Resolves once nothing holds a slot and nothing waits for one.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.event_tx.subscribe();
        loop {
            if self.queue.live_count() == 0 && self.queue.pending().is_empty() {
                return;
            }
            tokio::select! {
                r = rx.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = r {
                        return;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
        }
    }
}
