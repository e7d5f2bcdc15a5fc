mod common;

use async_trait::async_trait;
use common::{body, RangeResponder};
use segdl::plugins::http::driver::HttpDriver;
use segdl::plugins::registry::{DriverContext, FetchOutcome, RangeSink, TransferDriver, TransportError};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Collect {
    data: Vec<u8>,
    stop_after: Option<usize>,
}

#[async_trait]
impl RangeSink for Collect {
    async fn on_data(&mut self, chunk: &[u8]) -> anyhow::Result<bool> {
        self.data.extend_from_slice(chunk);
        Ok(self.stop_after.map_or(true, |n| self.data.len() < n))
    }
}

fn ctx() -> DriverContext {
    DriverContext { timeout_secs: 5, ..DriverContext::default() }
}

async fn ranged_server(path_str: &str, content: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(RangeResponder { body: content })
        .mount(&server)
        .await;
    server
}

async fn plain_server(path_str: &str, content: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(&server)
        .await;
    server
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn probe_reads_size_from_trial_range() {
    let server = ranged_server("/file.bin", body(1000)).await;
    let driver = HttpDriver::new().unwrap();

    let meta = driver.probe(&url(&server, "/file.bin"), &ctx()).await.unwrap();
    assert_eq!(meta.size, Some(1000));
    assert!(meta.accepts_ranges);
}

#[tokio::test]
async fn probe_without_range_support() {
    let server = plain_server("/plain.bin", body(300)).await;
    let driver = HttpDriver::new().unwrap();

    let meta = driver.probe(&url(&server, "/plain.bin"), &ctx()).await.unwrap();
    assert_eq!(meta.size, Some(300));
    assert!(!meta.accepts_ranges);
}

#[tokio::test]
async fn probe_surfaces_bad_status() {
    let server = MockServer::start().await;
    let driver = HttpDriver::new().unwrap();

    let err = driver.probe(&url(&server, "/missing"), &ctx()).await.unwrap_err();
    assert!(matches!(err, TransportError::Status(404)), "{err}");
}

#[tokio::test]
async fn fetch_range_returns_only_the_requested_span() {
    let content = body(1000);
    let server = ranged_server("/file.bin", content.clone()).await;
    let driver = HttpDriver::new().unwrap();
    let mut sink = Collect::default();

    let out = driver
        .fetch_range(&url(&server, "/file.bin"), &ctx(), 100, Some(199), &mut sink, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, FetchOutcome::Completed { bytes: 100 });
    assert_eq!(sink.data, content[100..200]);
}

#[tokio::test]
async fn fetch_range_detects_ignored_range() {
    let server = plain_server("/plain.bin", body(300)).await;
    let driver = HttpDriver::new().unwrap();
    let mut sink = Collect::default();

    let err = driver
        .fetch_range(&url(&server, "/plain.bin"), &ctx(), 10, Some(99), &mut sink, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::RangeIgnored(10)));
    assert!(sink.data.is_empty());
}

#[tokio::test]
async fn sink_returning_false_aborts() {
    let server = plain_server("/big.bin", body(256 * 1024)).await;
    let driver = HttpDriver::new().unwrap();
    let mut sink = Collect { stop_after: Some(1), ..Collect::default() };

    let out = driver
        .fetch_range(&url(&server, "/big.bin"), &ctx(), 0, None, &mut sink, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(out, FetchOutcome::Aborted { .. }));
}

#[tokio::test]
async fn cancelled_token_aborts_before_any_data() {
    let server = ranged_server("/file.bin", body(1000)).await;
    let driver = HttpDriver::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut sink = Collect::default();

    let out = driver
        .fetch_range(&url(&server, "/file.bin"), &ctx(), 0, Some(999), &mut sink, &cancel)
        .await
        .unwrap();
    assert_eq!(out, FetchOutcome::Aborted { bytes: 0 });
}
