//! One contiguous byte range of one task, fetched by its own tokio task with
//! a bounded retry loop.
//!
//! Counters and status live in atomics so the owning task can aggregate
//! progress without taking the segment's control lock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::core::assembler::Assembler;
use crate::core::model::{SegmentRange, SegmentSnapshot, SegmentStatus};
use crate::core::throttle::Throttle;
use crate::plugins::registry::{DriverContext, FetchOutcome, RangeSink, TransferDriver};

const SPEED_SAMPLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SegmentReport {
    Completed { index: usize },
    Paused { index: usize },
    Failed { index: usize, message: String },
}

/// Everything the segments of one task run have in common.
#[derive(Clone)]
pub(crate) struct SegmentContext {
    pub url: Url,
    pub driver: Arc<dyn TransferDriver>,
    pub ctx: DriverContext,
    pub assembler: Arc<Assembler>,
    pub throttle: Option<Arc<Throttle>>,
    pub supports_resume: bool,
    pub reports: mpsc::UnboundedSender<SegmentReport>,
}

struct Control {
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    discard: bool,
    last_error: Option<String>,
}

struct SegmentInner {
    range: SegmentRange,
    shared: SegmentContext,
    status: AtomicU8,
    downloaded: AtomicU64,
    speed: AtomicU64,
    attempts: AtomicU32,
    born: Instant,
    /// Milliseconds after `born` at which the last chunk was written.
    last_data_ms: AtomicU64,
    control: Mutex<Control>,
}

#[derive(Clone)]
pub struct SegmentDownloader {
    inner: Arc<SegmentInner>,
}

impl SegmentDownloader {
    pub(crate) fn new(range: SegmentRange, shared: SegmentContext) -> Self {
        Self {
            inner: Arc::new(SegmentInner {
                range,
                shared,
                status: AtomicU8::new(SegmentStatus::None.as_u8()),
                downloaded: AtomicU64::new(0),
                speed: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                born: Instant::now(),
                last_data_ms: AtomicU64::new(0),
                control: Mutex::new(Control {
                    cancel: CancellationToken::new(),
                    worker: None,
                    discard: false,
                    last_error: None,
                }),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.range.index
    }

    pub fn range(&self) -> SegmentRange {
        self.inner.range
    }

    pub fn status(&self) -> SegmentStatus {
        self.inner.status()
    }

    pub fn downloaded(&self) -> u64 {
        self.inner.downloaded.load(Ordering::Acquire)
    }

    /// Last sampled rate; reads 0 once no data has arrived for a full
    /// sample period.
    pub fn speed(&self) -> u64 {
        let last = Duration::from_millis(self.inner.last_data_ms.load(Ordering::Relaxed));
        if self.inner.born.elapsed().saturating_sub(last) > SPEED_SAMPLE {
            return 0;
        }
        self.inner.speed.load(Ordering::Relaxed)
    }

    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.control().last_error.clone()
    }

    pub fn snapshot(&self) -> SegmentSnapshot {
        SegmentSnapshot {
            index: self.index(),
            start: self.inner.range.start,
            end: self.inner.range.end,
            status: self.status(),
            downloaded: self.downloaded(),
            speed_bps: self.speed(),
            attempts: self.attempts(),
        }
    }

    /// Launch the retry loop from NONE or PAUSED. Returns false, without side
    /// effects, in any other state or while a previous worker is still exiting.
    pub fn start(&self) -> bool {
        let mut c = self.inner.control();
        let status = self.status();
        if !matches!(status, SegmentStatus::None | SegmentStatus::Paused) {
            debug!(segment = self.index(), ?status, "start ignored");
            return false;
        }
        if c.worker.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!(segment = self.index(), "start ignored, previous worker still running");
            return false;
        }

        c.cancel = CancellationToken::new();
        c.discard = false;
        self.inner.set_status(SegmentStatus::Downloading);

        let inner = self.inner.clone();
        let token = c.cancel.clone();
        c.worker = Some(tokio::spawn(async move { inner.run(token).await }));
        true
    }

    pub fn resume(&self) -> bool {
        if self.status() != SegmentStatus::Paused {
            return false;
        }
        self.start()
    }

    /// Signal the worker and wait for it to observe the stop.
    pub async fn pause(&self) {
        self.stop(false).await;
    }

    /// Like pause, but the worker reports nothing afterwards and is not
    /// expected to run again.
    pub async fn cancel(&self) {
        self.stop(true).await;
    }

    async fn stop(&self, discard: bool) {
        let handle = {
            let mut c = self.inner.control();
            c.discard |= discard;
            c.cancel.cancel();
            c.worker.take()
        };
        if let Some(h) = handle {
            let _ = h.await;
        }
        // never-started segments have no worker to do this for them
        self.inner.transition(SegmentStatus::None, SegmentStatus::Paused);
        self.inner.transition(SegmentStatus::Downloading, SegmentStatus::Paused);
    }

    /// Stop without waiting; used when a sibling failed the whole task.
    pub(crate) fn abort(&self) {
        let mut c = self.inner.control();
        c.discard = true;
        c.cancel.cancel();
    }
}

impl SegmentInner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn status(&self) -> SegmentStatus {
        SegmentStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, s: SegmentStatus) {
        self.status.store(s.as_u8(), Ordering::Release);
    }

    fn transition(&self, from: SegmentStatus, to: SegmentStatus) -> bool {
        self.status
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn filled(&self) -> bool {
        match self.range.len() {
            Some(len) => self.downloaded.load(Ordering::Acquire) >= len,
            None => false,
        }
    }

    fn mark_data(&self) {
        let ms = self.born.elapsed().as_millis() as u64;
        self.last_data_ms.store(ms, Ordering::Relaxed);
    }

    fn report(&self, r: SegmentReport) {
        if self.control().discard {
            return;
        }
        let _ = self.shared.reports.send(r);
    }

    fn finish_completed(&self) {
        self.speed.store(0, Ordering::Relaxed);
        self.set_status(SegmentStatus::Completed);
        debug!(segment = self.range.index, bytes = self.downloaded.load(Ordering::Acquire), "segment completed");
        self.report(SegmentReport::Completed { index: self.range.index });
    }

    fn finish_paused(&self) {
        self.speed.store(0, Ordering::Relaxed);
        self.set_status(SegmentStatus::Paused);
        debug!(segment = self.range.index, bytes = self.downloaded.load(Ordering::Acquire), "segment stopped");
        self.report(SegmentReport::Paused { index: self.range.index });
    }

    fn finish_failed(&self, message: String) {
        self.speed.store(0, Ordering::Relaxed);
        self.control().last_error = Some(message.clone());
        self.set_status(SegmentStatus::Error);
        self.report(SegmentReport::Failed { index: self.range.index, message });
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let max_attempts = self.shared.ctx.retries.max(1);
        let backoff = Duration::from_millis(self.shared.ctx.retry_backoff_ms);
        // only a bounded range on a range-capable origin can continue mid-span
        let resumable = self.shared.supports_resume && self.range.end.is_some();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.attempts.store(attempt, Ordering::Relaxed);
            if cancel.is_cancelled() {
                return self.finish_paused();
            }
            if !resumable {
                self.downloaded.store(0, Ordering::Release);
            }
            if self.filled() {
                return self.finish_completed();
            }

            let offset = self.range.start + self.downloaded.load(Ordering::Acquire);
            let mut sink = SegmentSink::new(self.clone(), cancel.clone());
            let result = self
                .shared
                .driver
                .fetch_range(&self.shared.url, &self.shared.ctx, offset, self.range.end, &mut sink, &cancel)
                .await;
            self.speed.store(0, Ordering::Relaxed);

            match result {
                Ok(FetchOutcome::Completed { .. }) if !self.filled() && self.range.end.is_some() => {
                    last_error = format!(
                        "short read: {} of {} bytes",
                        self.downloaded.load(Ordering::Acquire),
                        self.range.len().unwrap_or_default()
                    );
                }
                Ok(FetchOutcome::Completed { .. }) => return self.finish_completed(),
                Ok(FetchOutcome::Aborted { .. }) if self.filled() => return self.finish_completed(),
                Ok(FetchOutcome::Aborted { .. }) if cancel.is_cancelled() => return self.finish_paused(),
                Ok(FetchOutcome::Aborted { .. }) => last_error = "transfer aborted by sink".to_string(),
                Err(_) if cancel.is_cancelled() => return self.finish_paused(),
                Err(e) => last_error = e.to_string(),
            }

            self.control().last_error = Some(last_error.clone());
            warn!(
                url = %self.shared.url,
                segment = self.range.index,
                attempt,
                max_attempts,
                error = %last_error,
                "segment attempt failed"
            );

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return self.finish_paused(),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        error!(url = %self.shared.url, segment = self.range.index, error = %last_error, "segment gave up");
        self.finish_failed(last_error);
    }
}

/// Writes each chunk at the segment's current offset and keeps the speed
/// sample. Never writes past the segment end.
struct SegmentSink {
    seg: Arc<SegmentInner>,
    cancel: CancellationToken,
    sample_at: Instant,
    sample_bytes: u64,
}

impl SegmentSink {
    fn new(seg: Arc<SegmentInner>, cancel: CancellationToken) -> Self {
        let sample_bytes = seg.downloaded.load(Ordering::Acquire);
        Self { seg, cancel, sample_at: Instant::now(), sample_bytes }
    }

    fn sample_speed(&mut self, done: u64) {
        let elapsed = self.sample_at.elapsed();
        if elapsed < SPEED_SAMPLE {
            return;
        }
        let speed = (done.saturating_sub(self.sample_bytes)) as f64 / elapsed.as_secs_f64();
        self.seg.speed.store(speed as u64, Ordering::Relaxed);
        self.sample_at = Instant::now();
        self.sample_bytes = done;
    }
}

#[async_trait]
impl RangeSink for SegmentSink {
    async fn on_data(&mut self, chunk: &[u8]) -> anyhow::Result<bool> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let seg = self.seg.clone();
        let done = seg.downloaded.load(Ordering::Acquire);
        let data = match seg.range.len() {
            Some(len) => {
                let room = len.saturating_sub(done);
                if room == 0 {
                    return Ok(false);
                }
                &chunk[..chunk.len().min(room as usize)]
            }
            None => chunk,
        };

        if let Some(t) = &seg.shared.throttle {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                _ = t.acquire(data.len()) => {}
            }
        }

        seg.shared.assembler.write_at(seg.range.start + done, data).await?;
        let now_done = seg.downloaded.fetch_add(data.len() as u64, Ordering::AcqRel) + data.len() as u64;
        seg.mark_data();
        self.sample_speed(now_done);

        Ok(!seg.filled())
    }

    fn on_progress(&mut self, _received: u64, _expected: Option<u64>) -> bool {
        !self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{eventually, MockDriver};

    async fn setup(
        driver: Arc<MockDriver>,
        file_len: u64,
        range: SegmentRange,
    ) -> (SegmentDownloader, mpsc::UnboundedReceiver<SegmentReport>, tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let assembler = Arc::new(Assembler::create(&path, Some(file_len)).await.unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = SegmentContext {
            url: Url::parse("mock://host/file.bin").unwrap(),
            driver,
            ctx: MockDriver::context(),
            assembler,
            throttle: None,
            supports_resume: true,
            reports: tx,
        };
        (SegmentDownloader::new(range, shared), rx, dir, path)
    }

    fn body(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn writes_only_its_own_range() {
        let data = body(100);
        let driver = Arc::new(MockDriver::new(data.clone()));
        let range = SegmentRange { index: 1, start: 40, end: Some(79) };
        let (seg, mut rx, _dir, path) = setup(driver, 100, range).await;

        assert!(seg.start());
        assert_eq!(rx.recv().await, Some(SegmentReport::Completed { index: 1 }));
        assert_eq!(seg.status(), SegmentStatus::Completed);
        assert_eq!(seg.downloaded(), 40);

        let file = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&file[40..80], &data[40..80]);
        assert!(file[..40].iter().all(|b| *b == 0));
        assert!(file[80..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn oversized_response_is_clipped_to_the_span() {
        // mock keeps streaming past the requested end
        let data = body(64);
        let driver = Arc::new(MockDriver::new(data.clone()).ignoring_range_end());
        let range = SegmentRange { index: 0, start: 0, end: Some(15) };
        let (seg, mut rx, _dir, path) = setup(driver, 64, range).await;

        seg.start();
        assert_eq!(rx.recv().await, Some(SegmentReport::Completed { index: 0 }));
        assert_eq!(seg.downloaded(), 16);
        let file = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&file[..16], &data[..16]);
        assert!(file[16..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let driver = Arc::new(MockDriver::new(body(10)));
        driver.fail_at(0, u32::MAX);
        let range = SegmentRange { index: 0, start: 0, end: Some(9) };
        let (seg, mut rx, _dir, _path) = setup(driver.clone(), 10, range).await;

        seg.start();
        match rx.recv().await {
            Some(SegmentReport::Failed { index, message }) => {
                assert_eq!(index, 0);
                assert!(message.contains("mock failure"), "{message}");
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert_eq!(seg.status(), SegmentStatus::Error);
        assert_eq!(seg.attempts(), 3);
        assert_eq!(driver.fetch_count(), 3);
        assert!(seg.last_error().is_some());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let driver = Arc::new(MockDriver::new(body(10)));
        driver.fail_at(0, 2);
        let range = SegmentRange { index: 0, start: 0, end: Some(9) };
        let (seg, mut rx, _dir, _path) = setup(driver, 10, range).await;

        seg.start();
        assert_eq!(rx.recv().await, Some(SegmentReport::Completed { index: 0 }));
        assert_eq!(seg.attempts(), 3);
    }

    #[tokio::test]
    async fn resume_fetches_only_the_remainder() {
        let data = body(400);
        let driver = Arc::new(MockDriver::new(data.clone()).chunked(10, Duration::from_millis(10)));
        let range = SegmentRange { index: 0, start: 0, end: Some(399) };
        let (seg, mut rx, _dir, path) = setup(driver.clone(), 400, range).await;

        seg.start();
        eventually("some progress", || seg.downloaded() >= 30).await;
        seg.pause().await;
        assert_eq!(seg.status(), SegmentStatus::Paused);
        assert_eq!(rx.recv().await, Some(SegmentReport::Paused { index: 0 }));

        let paused_at = seg.downloaded();
        assert!(paused_at < 400);
        assert!(seg.resume());
        assert_eq!(rx.recv().await, Some(SegmentReport::Completed { index: 0 }));

        assert_eq!(seg.downloaded(), 400);
        assert_eq!(driver.fetch_starts(), vec![0, paused_at]);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), data);
    }

    #[tokio::test]
    async fn start_is_rejected_while_running() {
        let driver = Arc::new(MockDriver::new(body(100)).chunked(10, Duration::from_millis(20)));
        let range = SegmentRange { index: 0, start: 0, end: Some(99) };
        let (seg, _rx, _dir, _path) = setup(driver, 100, range).await;

        assert!(seg.start());
        assert!(!seg.start());
        assert!(!seg.resume());
        seg.cancel().await;
        assert_eq!(seg.status(), SegmentStatus::Paused);
    }

    #[tokio::test]
    async fn cancel_reports_nothing() {
        let driver = Arc::new(MockDriver::new(body(100)).chunked(10, Duration::from_millis(20)));
        let range = SegmentRange { index: 0, start: 0, end: Some(99) };
        let (seg, mut rx, _dir, _path) = setup(driver, 100, range).await;

        seg.start();
        seg.cancel().await;
        drop(seg);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_is_sampled_per_second_and_decays_when_idle() {
        let driver = Arc::new(MockDriver::new(body(10_000)));
        let range = SegmentRange { index: 0, start: 0, end: Some(9_999) };
        let (seg, _rx, _dir, _path) = setup(driver, 10_000, range).await;
        let mut sink = SegmentSink::new(seg.inner.clone(), CancellationToken::new());

        assert!(sink.on_data(&[1u8; 1000]).await.unwrap());
        assert_eq!(seg.speed(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(sink.on_data(&[1u8; 1000]).await.unwrap());
        assert_eq!(seg.speed(), 2000);

        // under a second since the last sample: rate unchanged
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(sink.on_data(&[1u8; 1000]).await.unwrap());
        assert_eq!(seg.speed(), 2000);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(sink.on_data(&[1u8; 1000]).await.unwrap());
        assert_eq!(seg.speed(), 1818);
        assert_eq!(seg.snapshot().speed_bps, 1818);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(seg.speed(), 0);
        assert_eq!(seg.downloaded(), 4000);
    }
}
