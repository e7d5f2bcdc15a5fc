use async_trait::async_trait;
use clap::{ArgMatches, Command};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-call transport options. The registry keeps one default instance which
/// is merged with each task's own headers/options on every call.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Total attempts per segment, including the first.
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub headers: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            user_agent: format!("segdl/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 60,
            retries: 3,
            retry_backoff_ms: 2000,
            headers: HashMap::new(),
            options: HashMap::new(),
        }
    }
}

impl DriverContext {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Task-level values win over defaults. `timeout_secs` and `user_agent`
    /// may also be overridden through `options`.
    pub fn merged(&self, headers: &HashMap<String, String>, options: &HashMap<String, String>) -> Self {
        let mut out = self.clone();
        out.headers.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        out.options.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(t) = options.get("timeout_secs").and_then(|s| s.parse().ok()) {
            out.timeout_secs = t;
        }
        if let Some(ua) = options.get("user_agent") {
            out.user_agent = ua.clone();
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub accepts_ranges: bool,
}

/// How a fetch ended when it did not fail. A caller abort (cancel token or a
/// `false` from the sink) is a controlled outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed { bytes: u64 },
    Aborted { bytes: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(u16),

    /// Server answered a ranged request with the full body.
    #[error("server ignored range request starting at byte {0}")]
    RangeIgnored(u64),

    #[error("range not supported by server")]
    RangeNotSupported,

    #[error("sink failed: {0}")]
    Sink(String),

    #[error("{0}")]
    Protocol(String),
}

/// Receives streamed bytes of one fetch. Returning `false` from either
/// callback aborts the in-flight request.
#[async_trait]
pub trait RangeSink: Send {
    async fn on_data(&mut self, chunk: &[u8]) -> anyhow::Result<bool>;

    fn on_progress(&mut self, _received: u64, _expected: Option<u64>) -> bool {
        true
    }
}

#[async_trait]
pub trait TransferDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn schemes(&self) -> &'static [&'static str];

    /// Whether the protocol can serve partial ranges at all. When false,
    /// tasks are forced to a single segment regardless of the probe.
    fn range_capable(&self) -> bool {
        true
    }

    async fn probe(&self, url: &Url, ctx: &DriverContext) -> Result<ResourceMeta, TransportError>;

    /// Stream `[start, end]` (inclusive; `end == None` reads to EOF) into
    /// `sink`. `start == 0 && end == None` is a plain whole-resource fetch.
    async fn fetch_range(
        &self,
        url: &Url,
        ctx: &DriverContext,
        start: u64,
        end: Option<u64>,
        sink: &mut dyn RangeSink,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, TransportError>;
}

#[derive(Debug, Clone)]
pub struct DownloadCliConfig {
    pub headers: HashMap<String, String>,
    pub options: HashMap<String, String>,
    pub driver_ctx: DriverContext,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_download_command(&self, cmd: Command) -> Command;
    fn apply_download_matches(&self, matches: &ArgMatches, cfg: &mut DownloadCliConfig) -> anyhow::Result<()>;
}

pub struct ProtocolRegistry {
    drivers: HashMap<String, Arc<dyn TransferDriver>>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
    defaults: DriverContext,
}

impl ProtocolRegistry {
    pub fn empty() -> Self {
        Self { drivers: HashMap::new(), cli_plugins: vec![], defaults: DriverContext::default() }
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        let mut reg = Self::empty();

        reg.register(Arc::new(crate::plugins::http::driver::HttpDriver::new()?));
        reg.register(Arc::new(crate::plugins::ftp::driver::FtpDriver::new()));

        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg.cli_plugins.push(Box::new(crate::plugins::ftp::cli::FtpCliPlugin::new()));
        Ok(reg)
    }

    pub fn register(&mut self, driver: Arc<dyn TransferDriver>) {
        for scheme in driver.schemes() {
            self.drivers.insert(scheme.to_ascii_lowercase(), driver.clone());
        }
    }

    pub fn with_context(mut self, ctx: DriverContext) -> Self {
        self.defaults = ctx;
        self
    }

    pub fn defaults(&self) -> &DriverContext {
        &self.defaults
    }

    pub fn driver_for(&self, url: &Url) -> Option<Arc<dyn TransferDriver>> {
        self.drivers.get(&url.scheme().to_ascii_lowercase()).cloned()
    }

    pub fn context_for(&self, headers: &HashMap<String, String>, options: &HashMap<String, String>) -> DriverContext {
        self.defaults.merged(headers, options)
    }

    pub fn augment_download_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_download_command(c))
    }

    pub fn apply_download_matches(&self, matches: &ArgMatches, cfg: &mut DownloadCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_download_matches(matches, cfg)?;
        }
        Ok(())
    }
}
