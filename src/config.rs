//! Layered configuration: connection/endpoint knobs separate from retry-policy knobs, so
//! advanced callers can override either without forking the crate.

use crate::constants::{
    API_ENDPOINT, API_TIMEOUT, DEFAULT_BATCH_SIZE, DEFAULT_CONNECTION_POOL_SIZE,
    DEFAULT_NETWORK_BACKOFF_CAP, DEFAULT_NETWORK_JITTER_HIGH, DEFAULT_NETWORK_JITTER_LOW,
    DEFAULT_N_CONN, DEFAULT_RETRY_STOP_AFTER_SECS, DEFAULT_THROTTLING_BACKOFF_BASE,
    DEFAULT_THROTTLING_BACKOFF_CAP, DEFAULT_THROTTLING_STAGE_WAIT_BASE,
    DEFAULT_THROTTLING_STAGE_WAIT_JITTER,
};
use std::time::Duration;

/// Operational knobs for talking to the extraction service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Extraction endpoint URL.
    pub endpoint: String,
    /// Explicit API key; falls back to `ZYTE_AUTOEXTRACT_KEY` if unset (see [`crate::apikey`]).
    pub api_key: Option<String>,
    /// Maximum number of batches in flight at once.
    pub n_conn: usize,
    /// Number of requests per batch.
    pub batch_size: usize,
    /// HTTP connection pool size for the default transport.
    pub connection_pool_size: usize,
    /// Total request timeout, covering connect + send + receive.
    pub timeout: Duration,
    /// Extra headers sent with every request, in addition to `User-Agent` and auth.
    pub extra_headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_n_conn(mut self, n_conn: usize) -> Self {
        self.n_conn = n_conn;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: API_ENDPOINT.to_string(),
            api_key: None,
            n_conn: DEFAULT_N_CONN,
            batch_size: DEFAULT_BATCH_SIZE,
            connection_pool_size: DEFAULT_CONNECTION_POOL_SIZE,
            // total ~= API_TIMEOUT + 60s, matching the server's own processing budget plus slack.
            timeout: Duration::from_secs(API_TIMEOUT + 60),
            extra_headers: Vec::new(),
        }
    }
}

/// Wait sampler parameters for the throttling (HTTP 429) retry class: the first two stages wait
/// `stage_wait_base + rand(0, stage_wait_jitter)`; from the third stage on, wait
/// `backoff_base + full-jitter-exponential(capped at backoff_cap)`.
#[derive(Debug, Clone, Copy)]
pub struct ThrottlingWaitParams {
    pub stage_wait_base: f64,
    pub stage_wait_jitter: f64,
    pub backoff_base: f64,
    pub backoff_cap: f64,
}

impl Default for ThrottlingWaitParams {
    fn default() -> Self {
        Self {
            stage_wait_base: DEFAULT_THROTTLING_STAGE_WAIT_BASE,
            stage_wait_jitter: DEFAULT_THROTTLING_STAGE_WAIT_JITTER,
            backoff_base: DEFAULT_THROTTLING_BACKOFF_BASE,
            backoff_cap: DEFAULT_THROTTLING_BACKOFF_CAP,
        }
    }
}

/// Wait sampler parameters shared by the transport, server, and retriable-query-error retry
/// classes: `rand(jitter_low, jitter_high) + full-jitter-exponential(capped at backoff_cap)`.
#[derive(Debug, Clone, Copy)]
pub struct NetworkWaitParams {
    pub jitter_low: f64,
    pub jitter_high: f64,
    pub backoff_cap: f64,
}

impl Default for NetworkWaitParams {
    fn default() -> Self {
        Self {
            jitter_low: DEFAULT_NETWORK_JITTER_LOW,
            jitter_high: DEFAULT_NETWORK_JITTER_HIGH,
            backoff_cap: DEFAULT_NETWORK_BACKOFF_CAP,
        }
    }
}

/// Retry-policy knobs: the per-query retry budget plus the four per-class wait/stop parameter
/// sets from §4.3, exposed so advanced callers can override the defaults without forking the
/// crate. Throttling never stops of its own accord, so it carries only a wait policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Per-query retry budget: 0 disables per-query retries entirely.
    pub max_query_error_retries: u32,
    /// Wait policy for HTTP 429 responses (retried forever).
    pub throttling_wait: ThrottlingWaitParams,
    /// Wait policy for transport-level failures.
    pub transport_wait: NetworkWaitParams,
    /// Deadline after which transport-level retries give up.
    pub transport_stop_after: Duration,
    /// Wait policy for HTTP >= 500 responses.
    pub server_wait: NetworkWaitParams,
    /// Deadline after which server-error retries give up.
    pub server_stop_after: Duration,
    /// Wait policy for retriable per-query errors, combined with the server-prescribed
    /// `retrySeconds` via `max()`.
    pub query_wait: NetworkWaitParams,
    /// Deadline after which retriable-query-error retries give up, independent of the
    /// `max_query_error_retries` attempt budget (whichever is reached first wins).
    pub query_stop_after: Duration,
}

impl RetryConfig {
    pub fn new(max_query_error_retries: u32) -> Self {
        Self {
            max_query_error_retries,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let stop_after = Duration::from_secs(DEFAULT_RETRY_STOP_AFTER_SECS);
        Self {
            max_query_error_retries: 0,
            throttling_wait: ThrottlingWaitParams::default(),
            transport_wait: NetworkWaitParams::default(),
            transport_stop_after: stop_after,
            server_wait: NetworkWaitParams::default(),
            server_stop_after: stop_after,
            query_wait: NetworkWaitParams::default(),
            query_stop_after: stop_after,
        }
    }
}
