//! Admission control over every known task.
//!
//! At most `max_concurrent` tasks occupy a slot (CONNECTING or DOWNLOADING).
//! The rest wait in a FIFO. The queue lock is a plain mutex that is never held
//! while a task command runs; task statuses are read through their atomic
//! mirror, so a pass never takes a task lock either.

use futures::future::join_all;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

use crate::core::error::{EngineError, EngineResult};
use crate::core::events::StatusChange;
use crate::core::model::{TaskId, TaskStatus};
use crate::core::task::DownloadTask;

struct QueueState {
    tasks: HashMap<TaskId, DownloadTask>,
    order: Vec<TaskId>,
    pending: VecDeque<TaskId>,
    // popped from the FIFO, start/resume still in flight
    starting: HashSet<TaskId>,
    max_concurrent: usize,
    // advisory; reconciled against a full scan on every pass
    live: usize,
}

impl QueueState {
    fn scan_live(&self) -> usize {
        let running = self
            .tasks
            .values()
            .filter(|t| t.status().is_active() && !self.starting.contains(&t.id()))
            .count();
        running + self.starting.len()
    }

    fn enqueue(&mut self, id: TaskId) {
        if !self.pending.contains(&id) {
            self.pending.push_back(id);
        }
    }

    fn dequeue(&mut self, id: TaskId) {
        self.pending.retain(|p| *p != id);
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
}

#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    tasks: HashMap::new(),
                    order: Vec::new(),
                    pending: VecDeque::new(),
                    starting: HashSet::new(),
                    max_concurrent: max_concurrent.max(1),
                    live: 0,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self, id: TaskId) -> Option<DownloadTask> {
        self.state().tasks.get(&id).cloned()
    }

    fn require(&self, id: TaskId) -> EngineResult<DownloadTask> {
        self.get(id).ok_or(EngineError::TaskNotFound(id))
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> Vec<DownloadTask> {
        let st = self.state();
        st.order.iter().filter_map(|id| st.tasks.get(id).cloned()).collect()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<DownloadTask> {
        self.tasks().into_iter().filter(|t| t.status() == status).collect()
    }

    pub fn pending(&self) -> Vec<TaskId> {
        self.state().pending.iter().copied().collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state().max_concurrent
    }

    /// Tasks currently holding a slot, from a fresh scan.
    pub fn live_count(&self) -> usize {
        self.state().scan_live()
    }

    /// Raising the limit admits waiting tasks right away; lowering it never
    /// stops running ones.
    pub async fn set_max_concurrent(&self, max: usize) {
        {
            let mut st = self.state();
            st.max_concurrent = max.max(1);
            info!(max_concurrent = st.max_concurrent, "concurrency limit changed");
        }
        self.schedule().await;
    }

    /// Register a task. Tasks that are already QUEUED join the FIFO.
    pub async fn add_task(&self, task: DownloadTask) {
        let id = task.id();
        self.watch(&task);
        {
            let mut st = self.state();
            if st.tasks.insert(id, task.clone()).is_none() {
                st.order.push(id);
            }
            if task.status() == TaskStatus::Queued {
                st.enqueue(id);
            }
        }
        debug!(task_id = %id, "task registered");
        self.schedule().await;
    }

    /// Forget a task, cancelling it first unless it already finished.
    pub async fn remove_task(&self, id: TaskId) -> EngineResult<DownloadTask> {
        let task = {
            let mut st = self.state();
            let task = st.tasks.remove(&id).ok_or(EngineError::TaskNotFound(id))?;
            st.order.retain(|o| *o != id);
            st.dequeue(id);
            task
        };
        if !matches!(task.status(), TaskStatus::Completed | TaskStatus::Canceled) {
            if let Err(e) = task.cancel().await {
                debug!(task_id = %id, error = %e, "cancel on remove");
            }
        }
        self.schedule().await;
        Ok(task)
    }

    /// Start now if a slot is free, otherwise wait in the FIFO.
    pub async fn start_task(&self, id: TaskId) -> EngineResult<()> {
        let task = self.require(id)?;
        if self.prepare_start(&task).await? {
            self.state().enqueue(id);
            self.schedule().await;
        }
        Ok(())
    }

    /// Brings the task to QUEUED (or leaves it PAUSED). Returns false when it
    /// already holds a slot.
    async fn prepare_start(&self, task: &DownloadTask) -> EngineResult<bool> {
        match task.status() {
            TaskStatus::Connecting | TaskStatus::Downloading => Ok(false),
            s @ (TaskStatus::Completed | TaskStatus::Canceled) => {
                Err(EngineError::InvalidState { op: "start", status: s })
            }
            TaskStatus::None | TaskStatus::Error => {
                task.initialize().await?;
                Ok(true)
            }
            TaskStatus::Queued | TaskStatus::Paused => Ok(true),
        }
    }

    pub async fn resume_task(&self, id: TaskId) -> EngineResult<()> {
        let task = self.require(id)?;
        let status = task.status();
        if status != TaskStatus::Paused {
            return Err(EngineError::InvalidState { op: "resume", status });
        }
        self.state().enqueue(id);
        self.schedule().await;
        Ok(())
    }

    /// A paused task still waiting for a slot just leaves the FIFO.
    pub async fn pause_task(&self, id: TaskId) -> EngineResult<()> {
        let task = self.require(id)?;
        {
            let mut st = self.state();
            if task.status() == TaskStatus::Paused && st.pending.contains(&id) {
                st.dequeue(id);
                return Ok(());
            }
        }
        task.pause().await
    }

    pub async fn cancel_task(&self, id: TaskId) -> EngineResult<()> {
        let task = self.require(id)?;
        self.state().dequeue(id);
        task.cancel().await
    }

    /// Everything startable goes through admission, so the overflow queues.
    pub async fn start_all(&self) {
        for task in self.tasks() {
            match self.prepare_start(&task).await {
                Ok(true) => self.state().enqueue(task.id()),
                Ok(false) => {}
                Err(EngineError::InvalidState { .. }) => {}
                Err(e) => warn!(task_id = %task.id(), error = %e, "start skipped"),
            }
        }
        self.schedule().await;
    }

    /// Holds back the FIFO first so freed slots are not backfilled.
    pub async fn pause_all(&self) {
        self.state().pending.clear();
        let running: Vec<_> = self.tasks().into_iter().filter(|t| t.status() == TaskStatus::Downloading).collect();
        for (task, res) in running.iter().zip(join_all(running.iter().map(|t| t.pause())).await) {
            if let Err(e) = res {
                debug!(task_id = %task.id(), error = %e, "pause skipped");
            }
        }
    }

    pub async fn resume_all(&self) {
        {
            let mut st = self.state();
            let paused: Vec<TaskId> = st
                .order
                .iter()
                .copied()
                .filter(|id| st.tasks.get(id).is_some_and(|t| t.status() == TaskStatus::Paused))
                .collect();
            for id in paused {
                st.enqueue(id);
            }
        }
        self.schedule().await;
    }

    pub async fn cancel_all(&self) {
        self.state().pending.clear();
        let live: Vec<_> = self
            .tasks()
            .into_iter()
            .filter(|t| !matches!(t.status(), TaskStatus::Completed | TaskStatus::Canceled))
            .collect();
        for (task, res) in live.iter().zip(join_all(live.iter().map(|t| t.cancel())).await) {
            if let Err(e) = res {
                debug!(task_id = %task.id(), error = %e, "cancel skipped");
            }
        }
    }

    /// Scheduler pass: fill free slots from the front of the FIFO. Repeats
    /// until nothing more can be admitted, so a failed start frees its slot
    /// within the same call.
    pub async fn schedule(&self) {
        loop {
            let admitted = self.admit_batch();
            if admitted.is_empty() {
                return;
            }
            join_all(admitted.iter().map(|t| self.launch(t))).await;
        }
    }

    fn admit_batch(&self) -> Vec<DownloadTask> {
        let mut st = self.state();
        let mut live = st.scan_live();
        if live != st.live {
            debug!(cached = st.live, scanned = live, "live count reconciled");
        }
        st.live = live;

        let mut admitted = Vec::new();
        while live < st.max_concurrent {
            let Some(id) = st.pending.pop_front() else { break };
            let Some(task) = st.tasks.get(&id).cloned() else { continue };
            match task.status() {
                TaskStatus::Queued | TaskStatus::Paused => {}
                other => {
                    debug!(task_id = %id, status = ?other, "dropping stale queue entry");
                    continue;
                }
            }
            st.starting.insert(id);
            live += 1;
            admitted.push(task);
        }
        st.live = live;
        if !admitted.is_empty() {
            debug!(admitted = admitted.len(), live, waiting = st.pending.len(), "admission pass");
        }
        admitted
    }

    async fn launch(&self, task: &DownloadTask) {
        let id = task.id();
        let res = match task.status() {
            TaskStatus::Paused => task.resume().await,
            _ => task.start().await,
        };
        if let Err(e) = res {
            warn!(task_id = %id, error = %e, "admitted task did not start");
        }
        self.state().starting.remove(&id);
    }

    /// One listener per task; it re-runs admission on every transition and
    /// ends when the task is dropped or the queue goes away.
    fn watch(&self, task: &DownloadTask) {
        let mut rx = task.subscribe_status();
        let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                DownloadQueue { inner }.on_status_change(change).await;
            }
        });
    }

    async fn on_status_change(&self, change: StatusChange) {
        {
            let mut st = self.state();
            match (change.old.is_active(), change.new.is_active()) {
                (false, true) => st.live += 1,
                (true, false) => st.live = st.live.saturating_sub(1),
                _ => {}
            }
        }
        debug!(task_id = %change.task_id, old = ?change.old, new = ?change.new, "queue saw status change");
        self.schedule().await;
    }
}
