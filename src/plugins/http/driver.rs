use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, LAST_MODIFIED, RANGE, USER_AGENT,
};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::plugins::registry::{DriverContext, FetchOutcome, RangeSink, ResourceMeta, TransferDriver, TransportError};

pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    fn build_headers(ctx: &DriverContext) -> Result<HeaderMap, TransportError> {
        let bad = |e: String| TransportError::Protocol(format!("invalid header: {e}"));
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_str(&ctx.user_agent).map_err(|e| bad(e.to_string()))?);
        for (k, v) in &ctx.headers {
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|e| bad(e.to_string()))?;
            let value = HeaderValue::from_str(v).map_err(|e| bad(e.to_string()))?;
            h.insert(name, value);
        }
        Ok(h)
    }

    fn map_err(ctx: &DriverContext, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(ctx.timeout())
        } else {
            TransportError::Connect(e.to_string())
        }
    }

    fn accept_ranges_hint(headers: &HeaderMap) -> bool {
        headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase().contains("bytes"))
            .unwrap_or(false)
    }

    /// `bytes 0-0/1234` -> 1234
    fn content_range_total(headers: &HeaderMap) -> Option<u64> {
        headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.rsplit_once('/'))
            .and_then(|(_, total)| total.trim().parse().ok())
    }

    fn range_value(start: u64, end: Option<u64>) -> String {
        match end {
            Some(e) => format!("bytes={}-{}", start, e),
            None => format!("bytes={}-", start),
        }
    }
}

#[async_trait]
impl TransferDriver for HttpDriver {
    fn name(&self) -> &'static str {
        "http-driver"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["http", "https"]
    }

    /// HEAD for size/last-modified plus a `bytes=0-0` trial. Ranges count as
    /// supported when either the Accept-Ranges header says so or the trial
    /// comes back 206 with a Content-Range.
    async fn probe(&self, url: &Url, ctx: &DriverContext) -> Result<ResourceMeta, TransportError> {
        let headers = Self::build_headers(ctx)?;

        let mut head_len = None;
        let mut last_modified = None;
        let mut hint = false;
        match self.client.head(url.clone()).headers(headers.clone()).timeout(ctx.timeout()).send().await {
            Ok(head) if head.status().is_success() => {
                head_len = head
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                last_modified = head
                    .headers()
                    .get(LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                hint = Self::accept_ranges_hint(head.headers());
            }
            Ok(head) => debug!(url = %url, status = %head.status(), "HEAD rejected, relying on trial range"),
            Err(e) => debug!(url = %url, error = %e, "HEAD failed, relying on trial range"),
        }

        let trial = self
            .client
            .get(url.clone())
            .headers(headers)
            .header(RANGE, "bytes=0-0")
            .timeout(ctx.timeout())
            .send()
            .await
            .map_err(|e| Self::map_err(ctx, e))?;

        let status = trial.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let ranged = status == StatusCode::PARTIAL_CONTENT && trial.headers().get(CONTENT_RANGE).is_some();
        let size = if ranged {
            Self::content_range_total(trial.headers()).or(head_len)
        } else {
            head_len.or_else(|| {
                trial
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
            })
        };
        if last_modified.is_none() {
            last_modified = trial
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }

        Ok(ResourceMeta { size, last_modified, accepts_ranges: hint || ranged })
    }

    async fn fetch_range(
        &self,
        url: &Url,
        ctx: &DriverContext,
        start: u64,
        end: Option<u64>,
        sink: &mut dyn RangeSink,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, TransportError> {
        let mut req = self.client.get(url.clone()).headers(Self::build_headers(ctx)?);
        let ranged = start > 0 || end.is_some();
        if ranged {
            req = req.header(RANGE, Self::range_value(start, end));
        }

        let timeout = ctx.timeout();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Ok(FetchOutcome::Aborted { bytes: 0 }),
            r = tokio::time::timeout(timeout, req.send()) => r
                .map_err(|_| TransportError::Timeout(timeout))?
                .map_err(|e| Self::map_err(ctx, e))?,
        };

        match resp.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // a full body starting at byte 0 is still usable; the sink stops at the range end
            StatusCode::OK if start == 0 => {}
            StatusCode::OK => return Err(TransportError::RangeIgnored(start)),
            StatusCode::RANGE_NOT_SATISFIABLE => return Err(TransportError::RangeNotSupported),
            s => return Err(TransportError::Status(s.as_u16())),
        }

        let expected = resp.content_length();
        let mut stream = resp.bytes_stream();
        let mut received = 0u64;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(FetchOutcome::Aborted { bytes: received }),
                n = tokio::time::timeout(timeout, stream.next()) => n,
            };
            let chunk = match next {
                Err(_) => return Err(TransportError::Timeout(timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(Self::map_err(ctx, e)),
                Ok(Some(Ok(c))) => c,
            };

            received += chunk.len() as u64;
            let keep_going = sink
                .on_data(&chunk)
                .await
                .map_err(|e| TransportError::Sink(format!("{:#}", e)))?;
            if !keep_going || !sink.on_progress(received, expected) {
                return Ok(FetchOutcome::Aborted { bytes: received });
            }
        }

        Ok(FetchOutcome::Completed { bytes: received })
    }
}
