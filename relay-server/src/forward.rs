//! Downstream forwarding of acknowledged webhook payloads.
//!
//! The relay acknowledges inbound webhooks before any downstream call, so
//! forwarding runs on detached tokio tasks. The forwarder counts tasks that
//! are still running and lets the binary wait for them at shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::Config;

/// User agent sent on outbound forward requests.
const USER_AGENT: &str = "LineRelay/1.0";

/// Maximum number of downstream response bytes retained for logging.
const RESPONSE_LOG_LIMIT: usize = 1024;

/// Reasons an individual forward attempt can fail.
///
/// Failures are logged and dropped; they never reach the inbound caller,
/// whose response was already sent.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request could not be sent or the connection failed.
    #[error("network error: {message}")]
    Network { message: String },

    /// The downstream endpoint answered with a non-success status.
    #[error("downstream returned HTTP {status}")]
    Status { status: u16, body: String },
}

impl ForwardError {
    fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

/// Outcome of a successful forward, retained for logging only.
#[derive(Debug)]
struct ForwardOutcome {
    status: u16,
    body: String,
    elapsed: Duration,
}

/// Shared handle for forwarding payloads to the configured downstream URL.
///
/// Cheap to clone; all clones share one HTTP client and one in-flight
/// counter.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    url: Option<Url>,
    timeout_ms: u64,
    in_flight: Arc<AtomicUsize>,
}

impl Forwarder {
    /// Create a forwarder from the application configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.forward_timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: config.forward_url.clone(),
            timeout_ms: config.forward_timeout_ms,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Forward a payload on a detached background task.
    ///
    /// Returns immediately. The outcome is logged by the task; callers never
    /// observe it because the inbound response has already been sent.
    pub fn spawn(&self, payload: Value) {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => {
                error!("forward_url_missing");
                return;
            }
        };

        let client = self.client.clone();
        let timeout_ms = self.timeout_ms;
        let guard = InFlightGuard::acquire(&self.in_flight);

        tokio::spawn(async move {
            let _guard = guard;

            info!(url = %url, "forward_started");

            match send(&client, url.clone(), &payload, timeout_ms).await {
                Ok(outcome) => info!(
                    status = outcome.status,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    response = %outcome.body,
                    "forward_completed"
                ),
                Err(ForwardError::Status { status, body }) => error!(
                    status = status,
                    response = %body,
                    "forward_rejected"
                ),
                Err(e) => error!(url = %url, error = %e, "forward_failed"),
            }
        });
    }

    /// Number of forwards still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every spawned forward has finished, up to `timeout`.
    ///
    /// Called at shutdown so accepted payloads are not dropped mid-flight.
    pub async fn drain(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;

        loop {
            let pending = self.in_flight();
            if pending == 0 {
                info!("forward_drain_complete");
                return;
            }

            if Instant::now() >= deadline {
                warn!(pending = pending, "forward_drain_timed_out");
                return;
            }

            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// RAII guard that keeps the in-flight count accurate even if a forward
/// task panics.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// POST a payload to the downstream endpoint.
async fn send(
    client: &reqwest::Client,
    url: Url,
    payload: &Value,
    timeout_ms: u64,
) -> Result<ForwardOutcome, ForwardError> {
    let started = Instant::now();

    let response = match client.post(url).json(payload).send().await {
        Ok(response) => response,
        Err(e) => {
            if e.is_timeout() {
                return Err(ForwardError::Timeout { timeout_ms });
            }
            if e.is_connect() {
                return Err(ForwardError::network(format!("connection failed: {e}")));
            }
            return Err(ForwardError::network(e.to_string()));
        }
    };

    let status = response.status();
    let body = read_body_for_log(response).await;

    if !status.is_success() {
        return Err(ForwardError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(ForwardOutcome {
        status: status.as_u16(),
        body,
        elapsed: started.elapsed(),
    })
}

/// Read a downstream response body, truncated for logging.
async fn read_body_for_log(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(bytes) if bytes.len() > RESPONSE_LOG_LIMIT => {
            let truncated = String::from_utf8_lossy(&bytes[..RESPONSE_LOG_LIMIT]);
            format!("{truncated}... (truncated)")
        }
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(forward_url: Option<&str>, timeout_ms: u64) -> Config {
        Config {
            port: 8080,
            channel_secret: None,
            forward_url: forward_url.map(|u| Url::parse(u).unwrap()),
            forward_timeout_ms: timeout_ms,
            drain_timeout_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::body_json(json!({"events": []})))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&format!("{}/hook", mock_server.uri())), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        let outcome = send(
            &forwarder.client,
            forwarder.url.clone().unwrap(),
            &json!({"events": []}),
            2000,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, "accepted");
    }

    #[tokio::test]
    async fn test_send_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&mock_server.uri()), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        let err = send(
            &forwarder.client,
            forwarder.url.clone().unwrap(),
            &json!({}),
            2000,
        )
        .await
        .unwrap_err();

        match err {
            ForwardError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_connection_refused() {
        let config = test_config(Some("http://127.0.0.1:1/hook"), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        let err = send(
            &forwarder.client,
            forwarder.url.clone().unwrap(),
            &json!({}),
            2000,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ForwardError::Network { .. }));
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&mock_server.uri()), 200);
        let forwarder = Forwarder::new(&config).unwrap();

        let err = send(
            &forwarder.client,
            forwarder.url.clone().unwrap(),
            &json!({}),
            200,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ForwardError::Timeout { timeout_ms: 200 }));
    }

    #[tokio::test]
    async fn test_spawn_forwards_payload() {
        let mock_server = MockServer::start().await;

        let payload = json!({"events": [{"replyToken": "abc"}]});

        Mock::given(matchers::method("POST"))
            .and(matchers::body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&mock_server.uri()), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        forwarder.spawn(payload);
        forwarder.drain(Duration::from_secs(5)).await;

        assert_eq!(forwarder.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_spawn_server_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&mock_server.uri()), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        forwarder.spawn(json!({"events": []}));
        forwarder.drain(Duration::from_secs(5)).await;

        assert_eq!(forwarder.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_spawn_without_url_is_noop() {
        let config = test_config(None, 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        forwarder.spawn(json!({"events": []}));

        assert_eq!(forwarder.in_flight(), 0);
        forwarder.drain(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_spawn_unreachable_url_does_not_panic() {
        let config = test_config(Some("http://127.0.0.1:1/hook"), 2000);
        let forwarder = Forwarder::new(&config).unwrap();

        forwarder.spawn(json!({"events": []}));
        forwarder.drain(Duration::from_secs(5)).await;

        assert_eq!(forwarder.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_deadline_expires_with_pending_forward() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&mock_server)
            .await;

        let config = test_config(Some(&mock_server.uri()), 30000);
        let forwarder = Forwarder::new(&config).unwrap();

        forwarder.spawn(json!({}));
        forwarder.drain(Duration::from_millis(100)).await;

        assert_eq!(forwarder.in_flight(), 1);
    }
}
