//! In-memory transport registered under `mock://` for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::plugins::registry::{
    DriverContext, FetchOutcome, ProtocolRegistry, RangeSink, ResourceMeta, TransferDriver, TransportError,
};

pub(crate) struct MockDriver {
    body: Bytes,
    ranges: bool,
    known_size: bool,
    honour_end: bool,
    chunk: usize,
    delay: Duration,
    gated: AtomicBool,
    released: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<u64, u32>>,
    starts: Mutex<Vec<u64>>,
    fetches: AtomicU32,
    probes: AtomicU32,
}

impl MockDriver {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ranges: true,
            known_size: true,
            honour_end: true,
            chunk: 64 * 1024,
            delay: Duration::ZERO,
            gated: AtomicBool::new(false),
            released: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            starts: Mutex::new(Vec::new()),
            fetches: AtomicU32::new(0),
            probes: AtomicU32::new(0),
        }
    }

    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn unknown_size(mut self) -> Self {
        self.known_size = false;
        self
    }

    /// Serve to the end of the body even when a range end was requested.
    pub fn ignoring_range_end(mut self) -> Self {
        self.honour_end = false;
        self
    }

    pub fn chunked(mut self, chunk: usize, delay: Duration) -> Self {
        self.chunk = chunk.max(1);
        self.delay = delay;
        self
    }

    /// Hold every fetch until its url path is released.
    pub fn gated(self) -> Self {
        self.gated.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self, path: &str) {
        self.released.lock().unwrap().insert(path.to_string());
    }

    pub fn release_all(&self) {
        self.gated.store(false, Ordering::SeqCst);
    }

    /// Fail the next `times` fetches that start at byte `start`.
    pub fn fail_at(&self, start: u64, times: u32) {
        self.failures.lock().unwrap().insert(start, times);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fetch_starts(&self) -> Vec<u64> {
        self.starts.lock().unwrap().clone()
    }

    pub fn context() -> DriverContext {
        DriverContext { retries: 3, retry_backoff_ms: 10, timeout_secs: 5, ..DriverContext::default() }
    }

    pub fn registry(self: &Arc<Self>) -> ProtocolRegistry {
        let mut reg = ProtocolRegistry::empty().with_context(Self::context());
        reg.register(self.clone());
        reg
    }

    fn is_open(&self, url: &Url) -> bool {
        !self.gated.load(Ordering::SeqCst) || self.released.lock().unwrap().contains(url.path())
    }

    fn take_failure(&self, start: u64) -> bool {
        let mut f = self.failures.lock().unwrap();
        match f.get_mut(&start) {
            Some(n) if *n > 0 => {
                if *n != u32::MAX {
                    *n -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TransferDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock-driver"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["mock"]
    }

    async fn probe(&self, _url: &Url, _ctx: &DriverContext) -> Result<ResourceMeta, TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ResourceMeta {
            size: self.known_size.then_some(self.body.len() as u64),
            last_modified: None,
            accepts_ranges: self.ranges,
        })
    }

    async fn fetch_range(
        &self,
        url: &Url,
        _ctx: &DriverContext,
        start: u64,
        end: Option<u64>,
        sink: &mut dyn RangeSink,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.starts.lock().unwrap().push(start);

        while !self.is_open(url) {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(FetchOutcome::Aborted { bytes: 0 }),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }

        if self.take_failure(start) {
            return Err(TransportError::Connect("mock failure".into()));
        }
        if !self.ranges && start > 0 {
            return Err(TransportError::RangeIgnored(start));
        }

        let len = self.body.len() as u64;
        let stop = match end {
            Some(e) if self.honour_end && self.ranges => (e + 1).min(len),
            _ => len,
        };
        let from = if self.ranges { start.min(stop) } else { 0 };
        let slice = self.body.slice(from as usize..stop as usize);

        let mut received = 0u64;
        for chunk in slice.chunks(self.chunk) {
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(FetchOutcome::Aborted { bytes: received }),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Ok(FetchOutcome::Aborted { bytes: received });
            }
            received += chunk.len() as u64;
            let keep = sink.on_data(chunk).await.map_err(|e| TransportError::Sink(e.to_string()))?;
            if !keep || !sink.on_progress(received, Some(stop - from)) {
                return Ok(FetchOutcome::Aborted { bytes: received });
            }
        }
        Ok(FetchOutcome::Completed { bytes: received })
    }
}

pub(crate) async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
