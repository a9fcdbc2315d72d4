//! Error taxonomy: a non-2xx HTTP response, a per-item error inside a 2xx envelope, a
//! transport-level failure, and the crate-wide error enum that wraps all three.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// The crate's public error type.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No API key was supplied and none was found in the environment.
    #[error("no API key: pass one explicitly or set ZYTE_AUTOEXTRACT_KEY")]
    NoApiKey,

    /// Non-2xx HTTP response from the extraction service.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Per-item error inside a 2xx envelope.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Network, TLS, timeout, or protocol-level failure before a response was available.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body was not valid JSON, or not shaped as the batch envelope requires.
    #[error("failed to decode response body: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant violation internal to the crate (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-2xx HTTP response from the extraction service.
#[derive(Debug)]
pub struct RequestError {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: bytes::Bytes,
}

impl RequestError {
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        headers: Vec<(String, String)>,
        body: bytes::Bytes,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
            body,
        }
    }

    /// Attempt to parse the response body as a JSON object. Returns an empty map (and logs a
    /// warning) on decode failure or non-object shape, rather than failing the caller.
    pub fn error_data(&self) -> serde_json::Map<String, Value> {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::warn!(shape = ?other, "error response body was not a JSON object");
                serde_json::Map::new()
            }
            Err(err) => {
                tracing::warn!(error = %err, "error response body was not valid JSON");
                serde_json::Map::new()
            }
        }
    }

    /// `true` iff this is a throttling response (HTTP 429).
    pub fn is_throttling(&self) -> bool {
        self.status == 429
    }

    /// `true` iff this is a server-side error (HTTP status >= 500).
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "request failed with status {} ({})",
            self.status, self.reason
        )
    }
}

impl std::error::Error for RequestError {}

/// Network, TLS, timeout, or protocol-level failure raised by the transport before a
/// well-formed HTTP response was available. Distinct from [`RequestError`] even when the
/// underlying transport library models a non-2xx response with the same error type.
#[derive(Debug, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>, timed_out: bool) -> Self {
        Self {
            message: message.into(),
            timed_out,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let timed_out = err.is_timeout();
        TransportError::new(err.to_string(), timed_out)
    }
}

/// A per-item error inside a 2xx batch envelope.
#[derive(Debug, Clone)]
pub struct QueryError {
    /// Full server record for the failing query, including the echoed `userQuery`.
    pub query: Value,
    /// The server-provided error message.
    pub message: String,
    /// `maxRetries` in effect when this error was observed (0 disables per-query retries).
    pub max_retries: u32,
}

impl QueryError {
    pub fn new(query: Value, message: impl Into<String>, max_retries: u32) -> Self {
        Self {
            query,
            message: message.into(),
            max_retries,
        }
    }

    /// If `message` matches `"domain <D> is occupied, please retry in <S> seconds"`
    /// (case-insensitive), returns `(D, seconds)`. `seconds` defaults to 300 if the numeric
    /// portion fails to parse — a deliberate guardrail against an ambiguous server string.
    pub fn domain_occupied(&self) -> Option<(String, f64)> {
        let caps = DOMAIN_OCCUPIED_REGEX.captures(&self.message)?;
        let domain = caps.get(1)?.as_str().to_string();
        let seconds = caps
            .get(2)
            .and_then(|m| m.as_str().trim().parse::<f64>().ok())
            .unwrap_or(300.0);
        Some((domain, seconds))
    }

    /// `true` iff this error should be retried: either a domain-occupied directive, or the
    /// message contains one of a fixed set of known-transient substrings.
    pub fn retriable(&self) -> bool {
        self.domain_occupied().is_some() || is_retriable_message(&self.message)
    }

    /// Seconds the server told us to wait, or 0 if no explicit directive was present.
    pub fn retry_seconds(&self) -> f64 {
        self.domain_occupied().map(|(_, secs)| secs).unwrap_or(0.0)
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query error: {}", self.message)
    }
}

impl std::error::Error for QueryError {}

static DOMAIN_OCCUPIED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i).*domain (.+) is occupied, please retry in (.+) seconds.*")
        .expect("invalid domain-occupied regex")
});

/// Substrings (case-insensitive) that mark a per-item error message as transient, independent
/// of any domain-occupied directive.
const RETRIABLE_QUERY_ERROR_MESSAGES: &[&str] = &[
    "query timed out",
    "Downloader error: No response",
    "Downloader error: http50",
    "Downloader error: 50",
    "Downloader error: GlobalTimeoutError",
    "Downloader error: ConnectionResetByPeer",
    "Proxy error: banned",
    "Proxy error: internal_error",
    "Proxy error: nxdomain",
    "Proxy error: timeout",
    "Proxy error: ssl_tunnel_error",
    "Proxy error: msgtimeout",
    "Proxy error: econnrefused",
    "Proxy error: connect_timeout",
];

fn is_retriable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRIABLE_QUERY_ERROR_MESSAGES
        .iter()
        .any(|needle| lower.contains(&needle.to_lowercase()))
}

/// Substrings (case-insensitive) that mark a per-item error as not billable by the server.
/// Every other outcome (success, or any other error) is billable.
const NON_BILLABLE_ERROR_MESSAGES: &[&str] = &[
    "malformed url",
    "URL cannot be longer than",
    "non-HTTP schemas are not allowed",
    "Extraction not permitted for this URL",
];

/// `true` iff a per-item error message is billable: billing excludes malformed/oversized/
/// disallowed URLs and domain-occupied directives; everything else (including all other
/// errors) is billed.
pub fn is_billable_error_msg(message: &str) -> bool {
    if DOMAIN_OCCUPIED_REGEX.is_match(message) {
        return false;
    }
    let lower = message.to_lowercase();
    !NON_BILLABLE_ERROR_MESSAGES
        .iter()
        .any(|needle| lower.contains(&needle.to_lowercase()))
}
