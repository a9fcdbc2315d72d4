//! HTTP client abstraction for making requests.
//!
//! Defines the `HttpClient` trait to abstract the single batch POST the executor issues,
//! enabling testability with mock implementations.

use crate::config::ClientConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

/// Raw HTTP response: status, headers, and body bytes. Carries everything the executor needs
/// to classify a non-2xx response into a `RequestError` without the trait itself knowing about
/// that error type.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Trait for issuing the extraction service's batch POST.
///
/// This abstraction allows for different implementations (production vs. testing) and makes
/// the retry state machine testable without making real HTTP calls.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// POST `body` (the batch's pending queries) to `endpoint`, authenticating with HTTP Basic
    /// using `api_key` as the username and an empty password. Returns `Ok` for any response the
    /// transport completed, including non-2xx statuses — the caller classifies those. Returns
    /// `Err` only for failures before a well-formed response was available.
    async fn post_extract(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &[Value],
        timeout: Duration,
        extra_headers: &[(String, String)],
        user_agent: &str,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

// ============================================================================
// Production implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build from a caller-supplied `reqwest::Client`, e.g. one configured with a specific
    /// connection pool size.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the default transport per §4.7 point 5: a `reqwest::Client` whose connection pool
    /// is sized from `config.connection_pool_size` (default 100), for callers who don't supply
    /// their own `reqwest::Client` via [`Self::from_client`].
    pub fn from_config(config: &ClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.connection_pool_size)
            .build()
            .expect("reqwest::ClientBuilder::build should not fail with only a pool size set");
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, body, api_key), fields(endpoint = %endpoint, batch_size = body.len()))]
    async fn post_extract(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &[Value],
        timeout: Duration,
        extra_headers: &[(String, String)],
        user_agent: &str,
    ) -> std::result::Result<HttpResponse, TransportError> {
        tracing::debug!(timeout_ms = timeout.as_millis(), "dispatching batch POST");

        let mut req = self
            .client
            .post(endpoint)
            .basic_auth(api_key, Some(""))
            .timeout(timeout)
            .header("User-Agent", user_agent)
            .json(body);

        for (name, value) in extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(endpoint = %endpoint, error = %e, "batch POST failed before a response was available");
            TransportError::from(e)
        })?;

        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let body = response.bytes().await.map_err(TransportError::from)?;

        tracing::debug!(status, response_len = body.len(), "batch POST completed");

        Ok(HttpResponse {
            status,
            reason,
            headers,
            body,
        })
    }
}

// ============================================================================
// Test/mock implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type BodyMatcher = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// One queued canned response: an optional matcher restricting which request body it answers
/// (the first entry whose matcher accepts the body, or has no matcher at all, wins), an
/// artificial delay to simulate a slow batch, and the response itself.
struct QueuedResponse {
    matcher: Option<BodyMatcher>,
    delay: Duration,
    response: std::result::Result<HttpResponse, TransportError>,
}

/// Mock HTTP client for testing. Queues canned responses per endpoint and records every call
/// made, without issuing real HTTP requests.
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<QueuedResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Record of one call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub endpoint: String,
    pub api_key: String,
    pub body: Vec<Value>,
    pub timeout: Duration,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response (or transport failure) for `endpoint`, returned in FIFO order across
    /// calls to that same endpoint whose body doesn't match a more specific queued entry.
    pub fn queue_response(
        &self,
        endpoint: &str,
        response: std::result::Result<HttpResponse, TransportError>,
    ) {
        self.push(endpoint, None, Duration::ZERO, response);
    }

    /// Like [`Self::queue_response`], but `post_extract` sleeps `delay` before returning this
    /// entry — lets tests simulate one batch resolving slower than another so completion order
    /// can differ from submission order.
    pub fn queue_response_after(
        &self,
        endpoint: &str,
        delay: Duration,
        response: std::result::Result<HttpResponse, TransportError>,
    ) {
        self.push(endpoint, None, delay, response);
    }

    /// Queue a response that only answers calls whose body satisfies `matcher`, optionally after
    /// `delay`. Lets a test pin a specific response (and its timing) to a specific batch,
    /// independent of the order in which concurrent batches happen to call the mock.
    pub fn queue_response_matching(
        &self,
        endpoint: &str,
        matcher: impl Fn(&[Value]) -> bool + Send + Sync + 'static,
        delay: Duration,
        response: std::result::Result<HttpResponse, TransportError>,
    ) {
        self.push(endpoint, Some(Arc::new(matcher)), delay, response);
    }

    fn push(
        &self,
        endpoint: &str,
        matcher: Option<BodyMatcher>,
        delay: Duration,
        response: std::result::Result<HttpResponse, TransportError>,
    ) {
        self.responses
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push(QueuedResponse {
                matcher,
                delay,
                response,
            });
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post_extract(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &[Value],
        timeout: Duration,
        _extra_headers: &[(String, String)],
        _user_agent: &str,
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.calls.lock().push(MockCall {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            body: body.to_vec(),
            timeout,
        });

        let next = {
            let mut responses = self.responses.lock();
            responses.get_mut(endpoint).and_then(|queue| {
                let index = queue.iter().position(|entry| match &entry.matcher {
                    Some(matcher) => matcher(body),
                    None => true,
                })?;
                Some(queue.remove(index))
            })
        };

        match next {
            Some(QueuedResponse { delay, response, .. }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            None => Err(TransportError::new(
                format!("no mock response configured for {endpoint}"),
                false,
            )),
        }
    }
}

/// Build a [`HttpResponse`] with a JSON body, for tests.
pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        reason: String::new(),
        headers: vec![],
        body: Bytes::from(serde_json::to_vec(&body).expect("test fixture must serialize")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_config_builds_a_client_without_panicking() {
        let config = ClientConfig::default().with_n_conn(5);
        let _client = ReqwestHttpClient::from_config(&config);
    }

    #[tokio::test]
    async fn mock_client_returns_queued_responses_in_order() {
        let mock = MockHttpClient::new();
        mock.queue_response("https://api", Ok(json_response(200, json!([]))));
        mock.queue_response("https://api", Ok(json_response(429, json!({"error": "slow down"}))));

        let first = mock
            .post_extract("https://api", "key", &[], Duration::from_secs(1), &[], "ua")
            .await
            .unwrap();
        assert_eq!(first.status, 200);

        let second = mock
            .post_extract("https://api", "key", &[], Duration::from_secs(1), &[], "ua")
            .await
            .unwrap();
        assert_eq!(second.status, 429);

        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[0].api_key, "key");
    }

    #[tokio::test]
    async fn mock_client_errors_when_no_response_queued() {
        let mock = MockHttpClient::new();
        let result = mock
            .post_extract("https://api", "key", &[], Duration::from_secs(1), &[], "ua")
            .await;
        assert!(result.is_err());
    }

    /// Initialize a `tracing` subscriber for the wiremock-backed integration tests below, so a
    /// failing assertion comes with the request/response logging `post_extract` emits. Safe to
    /// call from multiple tests; only the first call wins.
    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("autoextract_core=debug")
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn reqwest_client_sends_basic_auth_and_parses_response() {
        init_test_logging();
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/extract"))
            .and(header("Authorization", "Basic dGVzdC1rZXk6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"query": {"userQuery": {"url": "https://example.com"}}, "result": "ok"}
            ])))
            .mount(&mock_server)
            .await;

        let client = ReqwestHttpClient::new();
        let endpoint = format!("{}/v1/extract", mock_server.uri());
        let body = vec![json!({"url": "https://example.com", "pageType": "article"})];

        let response = client
            .post_extract(
                &endpoint,
                "test-key",
                &body,
                Duration::from_secs(5),
                &[],
                "test-agent/1.0",
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let parsed: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed[0]["result"], "ok");
    }

    #[tokio::test]
    async fn reqwest_client_surfaces_non_2xx_as_ok_response_for_caller_to_classify() {
        init_test_logging();
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "slow down"})))
            .mount(&mock_server)
            .await;

        let client = ReqwestHttpClient::new();
        let response = client
            .post_extract(
                &mock_server.uri(),
                "test-key",
                &[],
                Duration::from_secs(5),
                &[],
                "test-agent/1.0",
            )
            .await
            .unwrap();

        assert_eq!(response.status, 429);
    }
}
