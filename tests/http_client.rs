//! Integration tests for single-attempt fetching and the retry loop's logging.

mod support;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archive_fetcher::download::{
    Fetch, FetchError, FetchOptions, FetchOutcome, HttpClient, RetryPolicy, RetryingFetcher,
    Transport,
};
use reqwest::header::HeaderMap;
use support::socket_guard::start_mock_server_or_skip;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn direct_client() -> HttpClient {
    HttpClient::new(Transport::Direct).unwrap()
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs an info-level subscriber for this crate on the current thread.
fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("archive_fetcher=info"))
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

#[tokio::test]
async fn test_fetch_200_returns_success_with_body() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html>hi</html>", "text/html; charset=utf-8"),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/page", mock_server.uri());
    let outcome = direct_client().fetch(&url, &FetchOptions::default()).await;

    match outcome {
        FetchOutcome::Success(result) => {
            assert_eq!(result.status, 200);
            assert_eq!(result.text(), "<html>hi</html>");
            assert_eq!(
                result.content_type.as_deref(),
                Some("text/html; charset=utf-8")
            );
        }
        other => panic!("Expected Success, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_429_uses_retry_after_header() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7200"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/busy", mock_server.uri());
    let outcome = direct_client().fetch(&url, &FetchOptions::default()).await;

    assert!(
        matches!(
            outcome,
            FetchOutcome::RateLimited { retry_after } if retry_after == Duration::from_secs(7200)
        ),
        "unexpected outcome: {outcome:?}"
    );
}

#[tokio::test]
async fn test_fetch_429_without_header_defaults_to_sixty_seconds() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbled"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "later"))
        .mount(&mock_server)
        .await;

    let client = direct_client();
    for endpoint in ["/busy", "/garbled"] {
        let url = format!("{}{endpoint}", mock_server.uri());
        let outcome = client.fetch(&url, &FetchOptions::default()).await;
        assert!(
            matches!(
                outcome,
                FetchOutcome::RateLimited { retry_after } if retry_after == Duration::from_secs(60)
            ),
            "unexpected outcome for {endpoint}: {outcome:?}"
        );
    }
}

#[tokio::test]
async fn test_fetch_non_200_statuses_fail_without_retry_hint() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = direct_client();
    for (endpoint, expected) in [("/missing", 404), ("/empty", 204)] {
        let url = format!("{}{endpoint}", mock_server.uri());
        match client.fetch(&url, &FetchOptions::default()).await {
            FetchOutcome::Failed(FetchError::UnexpectedStatus { status, .. }) => {
                assert_eq!(status, expected);
            }
            other => panic!("Expected UnexpectedStatus, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_fetch_page_options_send_browser_user_agent() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64)"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/page", mock_server.uri());
    let outcome = direct_client().fetch(&url, &FetchOptions::page()).await;
    assert!(matches!(outcome, FetchOutcome::Success(_)));
}

#[tokio::test]
async fn test_fetch_timeout_is_classified() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let options = FetchOptions {
        timeout: Some(Duration::from_millis(200)),
        headers: HeaderMap::new(),
    };
    let url = format!("{}/slow", mock_server.uri());
    let outcome = direct_client().fetch(&url, &options).await;
    assert!(
        matches!(outcome, FetchOutcome::Failed(FetchError::Timeout { .. })),
        "Expected Timeout, got: {outcome:?}"
    );
}

#[tokio::test]
async fn test_fetch_connection_refused_is_transport_failure() {
    // Port 9 (discard) is essentially never listening on loopback.
    let outcome = direct_client()
        .fetch("http://127.0.0.1:9/nothing", &FetchOptions::default())
        .await;
    assert!(
        matches!(outcome, FetchOutcome::Failed(FetchError::Transport { .. })),
        "Expected Transport failure, got: {outcome:?}"
    );
}

#[tokio::test]
async fn test_retrying_fetch_logs_one_line_per_attempt() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let (logs, _guard) = capture_logs();
    let fetcher = RetryingFetcher::new(Arc::new(direct_client()), RetryPolicy::with_max_retries(5));
    let url = format!("{}/busy", mock_server.uri());
    fetcher.fetch(&url, &FetchOptions::default()).await.unwrap();

    let lines = logs.lines();
    assert_eq!(lines.len(), 3, "three attempts, got: {lines:#?}");
    assert_eq!(
        lines.iter().filter(|l| l.contains("rate limited")).count(),
        2,
        "{lines:#?}"
    );
    assert!(lines[2].contains("fetch attempt succeeded"), "{lines:#?}");
}

#[tokio::test]
async fn test_exhausted_retry_logs_attempt_then_give_up() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .mount(&mock_server)
        .await;

    let (logs, _guard) = capture_logs();
    let fetcher = RetryingFetcher::new(Arc::new(direct_client()), RetryPolicy::with_max_retries(1));
    let url = format!("{}/busy", mock_server.uri());
    let result = fetcher.fetch(&url, &FetchOptions::default()).await;

    assert!(matches!(
        result,
        Err(FetchError::RateLimitExhausted { attempts: 1, .. })
    ));
    let lines = logs.lines();
    assert_eq!(lines.len(), 2, "{lines:#?}");
    assert!(lines[0].contains("rate limited, backing off"), "{lines:#?}");
    assert!(lines[1].contains("giving up"), "{lines:#?}");
}
