//! One user-visible download and the segment workers it owns.
//!
//! Locking: `ops` serialises the async commands (initialize/start/pause/
//! resume/cancel) and may be held across `.await`; `state` guards the data
//! and is only ever held for short synchronous sections. Neither lock is held
//! while calling into a segment's control path or into the queue; status
//! changes leave the task through channels.

use futures::future::join_all;
use sanitize_filename::sanitize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::core::assembler::Assembler;
use crate::core::error::{EngineError, EngineResult};
use crate::core::events::{EngineEvent, StatusChange};
use crate::core::model::*;
use crate::core::planner::plan_segments;
use crate::core::segment::{SegmentContext, SegmentDownloader, SegmentReport};
use crate::core::sidecar::{sidecar_path, SidecarRecord};
use crate::core::throttle::Throttle;
use crate::plugins::registry::{ProtocolRegistry, ResourceMeta};

const SPEED_WINDOW: usize = 10;
const SPEED_SAMPLE: Duration = Duration::from_secs(1);

/// Collaborators shared by every task of one engine.
#[derive(Clone)]
pub struct TaskDeps {
    pub registry: Arc<ProtocolRegistry>,
    pub throttle: Option<Arc<Throttle>>,
    pub events: broadcast::Sender<EngineEvent>,
}

/// Rolling window of aggregate speed samples, at most one per second.
#[derive(Debug, Default)]
struct SpeedWindow {
    samples: VecDeque<u64>,
    last: Option<Instant>,
}

impl SpeedWindow {
    fn observe(&mut self, now: Instant, speed: u64) {
        if self.last.is_some_and(|t| now - t < SPEED_SAMPLE) {
            return;
        }
        self.samples.push_back(speed);
        while self.samples.len() > SPEED_WINDOW {
            self.samples.pop_front();
        }
        self.last = Some(now);
    }

    fn average(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        self.samples.iter().sum::<u64>() / self.samples.len() as u64
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.last = None;
    }
}

/// Remaining bytes over the current speed; unknown without a size or speed.
fn eta(total: Option<u64>, downloaded: u64, speed: u64) -> Option<Duration> {
    match total {
        Some(total) if speed > 0 => {
            Some(Duration::from_secs_f64(total.saturating_sub(downloaded) as f64 / speed as f64))
        }
        _ => None,
    }
}

struct TaskState {
    status: TaskStatus,
    filename: String,
    total_size: Option<u64>,
    supports_resume: bool,
    last_modified: Option<String>,
    segment_count: usize,
    priority: Priority,
    error: Option<String>,
    start_time: Option<Instant>,
    finished_at: Option<Instant>,
    last_update: Option<Instant>,
    speed: SpeedWindow,
    segments: Vec<SegmentDownloader>,
    assembler: Option<Arc<Assembler>>,
    supervisor: Option<CancellationToken>,
    progress: ProgressInfo,
    observers: Vec<mpsc::UnboundedSender<StatusChange>>,
}

struct TaskInner {
    id: TaskId,
    url: Url,
    destination: PathBuf,
    task_type: TaskType,
    headers: HashMap<String, String>,
    options: HashMap<String, String>,
    deps: TaskDeps,
    status: AtomicU8,
    ops: tokio::sync::Mutex<()>,
    state: Mutex<TaskState>,
}

#[derive(Clone)]
pub struct DownloadTask {
    inner: Arc<TaskInner>,
}

/// Last url path segment, sanitized; `download.bin` when there is none.
pub fn resolve_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|s| s.last())
        .filter(|s| !s.is_empty())
        .map(|s| sanitize(s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download.bin".to_string())
}

impl DownloadTask {
    pub fn new(request: TaskRequest, deps: TaskDeps) -> EngineResult<Self> {
        let url = Url::parse(&request.url).map_err(|e| EngineError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let filename = request
            .filename
            .as_deref()
            .map(sanitize)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| resolve_filename(&url));

        Ok(Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                url,
                destination: request.destination,
                task_type: request.task_type,
                headers: request.headers,
                options: request.options,
                deps,
                status: AtomicU8::new(TaskStatus::None.as_u8()),
                ops: tokio::sync::Mutex::new(()),
                state: Mutex::new(TaskState {
                    status: TaskStatus::None,
                    filename,
                    total_size: None,
                    supports_resume: false,
                    last_modified: None,
                    segment_count: request.segment_count.max(1),
                    priority: request.priority,
                    error: None,
                    start_time: None,
                    finished_at: None,
                    last_update: None,
                    speed: SpeedWindow::default(),
                    segments: Vec::new(),
                    assembler: None,
                    supervisor: None,
                    progress: ProgressInfo::default(),
                    observers: Vec::new(),
                }),
            }),
        })
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Lock-free read of the mirrored status.
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn file_path(&self) -> PathBuf {
        self.inner.destination.join(&self.state().filename)
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn last_modified(&self) -> Option<String> {
        self.state().last_modified.clone()
    }

    /// When progress was last aggregated.
    pub fn last_update(&self) -> Option<Instant> {
        self.state().last_update
    }

    pub fn segments(&self) -> Vec<SegmentDownloader> {
        self.state().segments.clone()
    }

    pub fn set_priority(&self, priority: Priority) {
        self.state().priority = priority;
    }

    /// Only takes effect for the next `start()`; refused while running.
    pub fn set_segment_count(&self, count: usize) -> EngineResult<()> {
        let mut st = self.state();
        if st.status.is_active() || st.status == TaskStatus::Paused {
            return Err(EngineError::InvalidState { op: "resize", status: st.status });
        }
        st.segment_count = count.max(1);
        Ok(())
    }

    /// Status transitions in the order they happen. The sender is dropped
    /// together with the task.
    pub fn subscribe_status(&self) -> mpsc::UnboundedReceiver<StatusChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().observers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let st = self.state();
        TaskSnapshot {
            id: self.inner.id,
            url: self.inner.url.to_string(),
            destination: self.inner.destination.clone(),
            filename: st.filename.clone(),
            status: st.status,
            priority: st.priority,
            task_type: self.inner.task_type,
            total_size: st.total_size,
            supports_resume: st.supports_resume,
            segment_count: st.segment_count,
            error: st.error.clone(),
            progress: st.progress.clone(),
            segments: st.segments.iter().map(|s| s.snapshot()).collect(),
        }
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Must be called with the state lock held so observers see transitions
    /// in order.
    fn set_status(&self, st: &mut TaskState, new: TaskStatus) {
        let old = st.status;
        if old == new {
            return;
        }
        st.status = new;
        // bus first, mirror second, observers last: a queue pass woken by an
        // observer always sees the new status, and no admission it makes can
        // be published ahead of this event
        let _ = self.inner.deps.events.send(EngineEvent::TaskStatusChanged { task_id: self.inner.id, old, new });
        self.inner.status.store(new.as_u8(), Ordering::Release);

        let change = StatusChange { task_id: self.inner.id, old, new };
        st.observers.retain(|tx| tx.send(change).is_ok());
        debug!(task_id = %self.inner.id, ?old, ?new, "task status changed");
    }

    fn fail(&self, message: String) {
        let mut st = self.state();
        error!(task_id = %self.inner.id, url = %self.inner.url, error = %message, "download failed");
        st.error = Some(message);
        st.finished_at = Some(Instant::now());
        if let Some(t) = st.supervisor.take() {
            t.cancel();
        }
        self.set_status(&mut st, TaskStatus::Error);
    }

    pub async fn initialize(&self) -> EngineResult<()> {
        let _ops = self.inner.ops.lock().await;
        self.initialize_locked().await
    }

    /// Probe, prepare the destination file and write the sidecar. A no-op
    /// unless the task is fresh or failed.
    async fn initialize_locked(&self) -> EngineResult<()> {
        if !matches!(self.status(), TaskStatus::None | TaskStatus::Error) {
            return Ok(());
        }
        let url = &self.inner.url;
        let registry = &self.inner.deps.registry;

        let Some(driver) = registry.driver_for(url) else {
            let err = EngineError::UnsupportedScheme(url.scheme().to_string());
            self.fail(err.to_string());
            return Err(err);
        };
        let ctx = registry.context_for(&self.inner.headers, &self.inner.options);

        let meta = match driver.probe(url, &ctx).await {
            Ok(m) => m,
            Err(e) => {
                warn!(task_id = %self.inner.id, url = %url, error = %e, "probe failed, continuing with unknown size");
                ResourceMeta::default()
            }
        };
        let supports_resume = meta.accepts_ranges && driver.range_capable();
        info!(
            task_id = %self.inner.id,
            url = %url,
            driver = driver.name(),
            size = ?meta.size,
            supports_resume,
            "probed resource"
        );

        let path = self.file_path();
        let reuse = self.can_reuse(&path, &meta).await;
        let prepared = if reuse {
            debug!(task_id = %self.inner.id, path = %path.display(), "reusing destination from earlier run");
            Assembler::open(&path).await
        } else {
            Assembler::create(&path, meta.size).await
        };
        let assembler = match prepared {
            Ok(a) => Arc::new(a),
            Err(e) => {
                self.fail(format!("cannot prepare {}: {:#}", path.display(), e));
                return Err(EngineError::Other(e));
            }
        };

        let segment_count = self.state().segment_count;
        let record = SidecarRecord::new(
            self.inner.id.to_string(),
            url.to_string(),
            meta.size,
            supports_resume,
            segment_count,
        );
        if let Err(e) = record.write(&path).await {
            warn!(task_id = %self.inner.id, error = %format!("{:#}", e), "sidecar not written");
        }

        let mut st = self.state();
        st.total_size = meta.size;
        st.supports_resume = supports_resume;
        st.last_modified = meta.last_modified;
        st.assembler = Some(assembler);
        st.error = None;
        st.progress = ProgressInfo { total_bytes: meta.size, ..ProgressInfo::default() };
        self.set_status(&mut st, TaskStatus::Queued);
        Ok(())
    }

    async fn can_reuse(&self, path: &Path, meta: &ResourceMeta) -> bool {
        let Some(size) = meta.size else { return false };
        let record = match SidecarRecord::read(path).await {
            Ok(Some(r)) => r,
            Ok(None) => return false,
            Err(e) => {
                warn!(task_id = %self.inner.id, error = %format!("{:#}", e), "ignoring unreadable sidecar");
                return false;
            }
        };
        let on_disk = tokio::fs::metadata(path).await.map(|m| m.len()).ok();
        record.url == self.inner.url.as_str() && record.file_size == Some(size) && on_disk == Some(size)
    }

    /// Partition and launch. Initializes first when needed; a no-op while
    /// already running; delegates to resume when paused.
    pub async fn start(&self) -> EngineResult<()> {
        let _ops = self.inner.ops.lock().await;
        match self.status() {
            TaskStatus::Connecting | TaskStatus::Downloading => return Ok(()),
            s @ (TaskStatus::Completed | TaskStatus::Canceled) => {
                return Err(EngineError::InvalidState { op: "start", status: s })
            }
            TaskStatus::Paused => return self.resume_locked().await,
            TaskStatus::None | TaskStatus::Error => self.initialize_locked().await?,
            TaskStatus::Queued => {}
        }

        // leftovers of a failed run must not keep writing
        let stale = std::mem::take(&mut self.state().segments);
        join_all(stale.iter().map(|s| s.cancel())).await;

        let url = self.inner.url.clone();
        let registry = &self.inner.deps.registry;
        let Some(driver) = registry.driver_for(&url) else {
            let err = EngineError::UnsupportedScheme(url.scheme().to_string());
            self.fail(err.to_string());
            return Err(err);
        };
        let ctx = registry.context_for(&self.inner.headers, &self.inner.options);

        let (assembler, total, supports_resume, count) = {
            let st = self.state();
            (st.assembler.clone(), st.total_size, st.supports_resume, st.segment_count)
        };
        let assembler = match assembler {
            Some(a) => a,
            None => match Assembler::create(&self.file_path(), total).await {
                Ok(a) => Arc::new(a),
                Err(e) => {
                    self.fail(format!("cannot prepare {}: {:#}", self.file_path().display(), e));
                    return Err(EngineError::Other(e));
                }
            },
        };

        let plan = plan_segments(total, supports_resume, count);
        {
            let mut st = self.state();
            self.set_status(&mut st, TaskStatus::Connecting);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = SegmentContext {
            url,
            driver,
            ctx,
            assembler: assembler.clone(),
            throttle: self.inner.deps.throttle.clone(),
            supports_resume,
            reports: tx,
        };
        let segments: Vec<SegmentDownloader> =
            plan.into_iter().map(|r| SegmentDownloader::new(r, shared.clone())).collect();
        drop(shared);

        let supervisor = CancellationToken::new();
        {
            let mut st = self.state();
            st.segments = segments.clone();
            st.assembler = Some(assembler);
            st.supervisor = Some(supervisor.clone());
            st.start_time = Some(Instant::now());
            st.finished_at = None;
            st.last_update = None;
            st.speed.clear();
            st.error = None;
            st.progress = ProgressInfo { total_bytes: total, ..ProgressInfo::default() };
            self.set_status(&mut st, TaskStatus::Downloading);
        }
        self.spawn_supervisor(rx, supervisor);

        info!(
            task_id = %self.inner.id,
            url = %self.inner.url,
            segments = segments.len(),
            size = ?total,
            "download started"
        );
        for s in &segments {
            s.start();
        }
        Ok(())
    }

    /// Consumes segment reports for one run. Holds only a weak reference so
    /// a dropped task ends it.
    fn spawn_supervisor(&self, mut rx: mpsc::UnboundedReceiver<SegmentReport>, token: CancellationToken) {
        let weak: Weak<TaskInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let report = tokio::select! {
                    _ = token.cancelled() => break,
                    r = rx.recv() => match r {
                        Some(r) => r,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else { break };
                let task = DownloadTask { inner };
                match report {
                    SegmentReport::Completed { index } => task.on_segment_completed(index).await,
                    SegmentReport::Failed { index, message } => task.on_segment_failed(index, &message),
                    SegmentReport::Paused { index } => debug!(segment = index, "segment paused"),
                }
            }
        });
    }

    pub(crate) async fn on_segment_completed(&self, index: usize) {
        let done = {
            let mut st = self.state();
            debug!(task_id = %self.inner.id, segment = index, "segment reported completion");
            self.complete_if_done(&mut st)
        };
        if let Some(assembler) = done {
            self.after_complete(assembler).await;
        }
    }

    /// One failed segment fails the whole task; its siblings are stopped.
    pub(crate) fn on_segment_failed(&self, index: usize, message: &str) {
        let siblings = {
            let mut st = self.state();
            self.fail_from_segment(&mut st, index, message)
        };
        for s in siblings.iter().filter(|s| s.index() != index) {
            s.abort();
        }
    }

    /// Moves a DOWNLOADING or PAUSED task to ERROR and returns the segments
    /// to stop. Any other status is left alone.
    fn fail_from_segment(&self, st: &mut TaskState, index: usize, message: &str) -> Vec<SegmentDownloader> {
        if !matches!(st.status, TaskStatus::Downloading | TaskStatus::Paused) {
            return Vec::new();
        }
        error!(task_id = %self.inner.id, url = %self.inner.url, segment = index, error = %message, "download failed");
        st.error = Some(format!("segment {} failed: {}", index, message));
        st.finished_at = Some(Instant::now());
        st.progress.speed_bps = 0;
        st.progress.eta = None;
        if let Some(t) = st.supervisor.take() {
            t.cancel();
        }
        self.set_status(st, TaskStatus::Error);
        st.segments.clone()
    }

    /// First segment that gave up, with its last error.
    fn failed_segment(st: &TaskState) -> Option<(usize, String)> {
        st.segments.iter().find(|s| s.status() == SegmentStatus::Error).map(|s| {
            let message = s.last_error().unwrap_or_else(|| "unknown error".to_string());
            (s.index(), message)
        })
    }

    /// COMPLETED exactly once: only the caller that still sees DOWNLOADING
    /// with every segment done wins.
    fn complete_if_done(&self, st: &mut TaskState) -> Option<Arc<Assembler>> {
        if st.status != TaskStatus::Downloading || st.segments.is_empty() {
            return None;
        }
        if !st.segments.iter().all(|s| s.status() == SegmentStatus::Completed) {
            return None;
        }

        let downloaded: u64 = st.segments.iter().map(|s| s.downloaded()).sum();
        let now = Instant::now();
        st.finished_at = Some(now);
        st.last_update = Some(now);
        st.progress = ProgressInfo {
            total_bytes: Some(st.total_size.unwrap_or(downloaded)),
            downloaded_bytes: st.total_size.unwrap_or(downloaded),
            percent: 100.0,
            speed_bps: 0,
            average_speed_bps: st.progress.average_speed_bps,
            elapsed: st.start_time.map(|t| now - t).unwrap_or_default(),
            eta: None,
        };
        if st.total_size.is_none() {
            st.total_size = Some(downloaded);
        }
        if let Some(t) = st.supervisor.take() {
            t.cancel();
        }
        self.set_status(st, TaskStatus::Completed);
        st.assembler.clone()
    }

    async fn after_complete(&self, assembler: Arc<Assembler>) {
        if let Err(e) = assembler.flush().await {
            warn!(task_id = %self.inner.id, error = %format!("{:#}", e), "flush after completion failed");
        }
        let progress = self.state().progress.clone();
        info!(
            task_id = %self.inner.id,
            path = %assembler.path().display(),
            bytes = progress.downloaded_bytes,
            elapsed = ?progress.elapsed,
            "download completed"
        );
        let _ = self.inner.deps.events.send(EngineEvent::Progress { task_id: self.inner.id, progress });
    }

    /// Fails without side effects unless DOWNLOADING.
    pub async fn pause(&self) -> EngineResult<()> {
        let _ops = self.inner.ops.lock().await;
        let status = self.status();
        if status != TaskStatus::Downloading {
            return Err(EngineError::InvalidState { op: "pause", status });
        }

        let segments = self.segments();
        join_all(segments.iter().map(|s| s.pause())).await;

        let (done, siblings) = {
            let mut st = self.state();
            // a final attempt may have given up while we were stopping it
            match Self::failed_segment(&st) {
                Some((index, message)) => (None, self.fail_from_segment(&mut st, index, &message)),
                None => (self.pause_or_complete(&mut st), Vec::new()),
            }
        };
        for s in &siblings {
            s.abort();
        }
        if let Some(assembler) = done {
            self.after_complete(assembler).await;
        }
        Ok(())
    }

    fn pause_or_complete(&self, st: &mut TaskState) -> Option<Arc<Assembler>> {
        let done = self.complete_if_done(st);
        if st.status == TaskStatus::Downloading {
            st.progress.speed_bps = 0;
            st.progress.eta = None;
            self.set_status(st, TaskStatus::Paused);
            info!(task_id = %self.inner.id, "download paused");
        }
        done
    }

    pub async fn resume(&self) -> EngineResult<()> {
        let _ops = self.inner.ops.lock().await;
        self.resume_locked().await
    }

    async fn resume_locked(&self) -> EngineResult<()> {
        let status = self.status();
        if status != TaskStatus::Paused {
            return Err(EngineError::InvalidState { op: "resume", status });
        }

        let (segments, done) = {
            let mut st = self.state();
            if let Some((index, message)) = Self::failed_segment(&st) {
                let siblings = self.fail_from_segment(&mut st, index, &message);
                drop(st);
                for s in &siblings {
                    s.abort();
                }
                return Ok(());
            }
            self.set_status(&mut st, TaskStatus::Downloading);
            st.finished_at = None;
            // everything may have finished while pausing
            (st.segments.clone(), self.complete_if_done(&mut st))
        };
        if let Some(assembler) = done {
            self.after_complete(assembler).await;
            return Ok(());
        }

        info!(task_id = %self.inner.id, "download resumed");
        for s in &segments {
            match s.status() {
                SegmentStatus::Paused => s.resume(),
                SegmentStatus::None => s.start(),
                _ => false,
            };
        }
        Ok(())
    }

    /// Valid unless already CANCELED or COMPLETED. Segments are stopped and
    /// discarded.
    pub async fn cancel(&self) -> EngineResult<()> {
        let _ops = self.inner.ops.lock().await;
        let status = self.status();
        if matches!(status, TaskStatus::Canceled | TaskStatus::Completed) {
            return Err(EngineError::InvalidState { op: "cancel", status });
        }

        let (segments, supervisor) = {
            let mut st = self.state();
            (std::mem::take(&mut st.segments), st.supervisor.take())
        };
        if let Some(t) = supervisor {
            t.cancel();
        }
        join_all(segments.iter().map(|s| s.cancel())).await;

        let mut st = self.state();
        st.finished_at = Some(Instant::now());
        st.progress.speed_bps = 0;
        st.progress.eta = None;
        self.set_status(&mut st, TaskStatus::Canceled);
        info!(task_id = %self.inner.id, "download canceled");
        Ok(())
    }

    /// Delete the destination file and its sidecar. Missing files are fine.
    pub async fn remove_files(&self) -> anyhow::Result<()> {
        let path = self.file_path();
        for p in [sidecar_path(&path), path] {
            match tokio::fs::remove_file(&p).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(anyhow::Error::new(e).context(format!("remove {}", p.display()))),
            }
        }
        Ok(())
    }

    /// Aggregate segment counters into a fresh `ProgressInfo`. Driven from
    /// outside; also completes the task early when every segment is done.
    pub async fn update_progress(&self) -> ProgressInfo {
        let (info, done) = {
            let mut st = self.state();
            let done = self.complete_if_done(&mut st);
            if st.status == TaskStatus::Completed {
                (st.progress.clone(), done)
            } else {
                let info = Self::aggregate(&mut st);
                st.progress = info.clone();
                (info, done)
            }
        };
        if let Some(assembler) = done {
            self.after_complete(assembler).await;
        } else {
            let _ = self
                .inner
                .deps
                .events
                .send(EngineEvent::Progress { task_id: self.inner.id, progress: info.clone() });
        }
        info
    }

    fn aggregate(st: &mut TaskState) -> ProgressInfo {
        let now = Instant::now();
        let running = st.status == TaskStatus::Downloading;
        let downloaded: u64 = st.segments.iter().map(|s| s.downloaded()).sum();
        let speed: u64 = if running { st.segments.iter().map(|s| s.speed()).sum() } else { 0 };

        let percent = match st.total_size {
            Some(total) if total > 0 => (downloaded as f64 / total as f64 * 100.0).min(100.0),
            _ => 0.0,
        };
        let elapsed = match st.start_time {
            Some(t) => st.finished_at.unwrap_or(now) - t,
            None => Duration::ZERO,
        };
        if running {
            st.speed.observe(now, speed);
        }
        st.last_update = Some(now);

        ProgressInfo {
            total_bytes: st.total_size,
            downloaded_bytes: downloaded,
            percent,
            speed_bps: speed,
            average_speed_bps: st.speed.average(),
            elapsed,
            eta: eta(st.total_size, downloaded, speed),
        }
    }
}
