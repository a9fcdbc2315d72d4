//! Fixed protocol constants shared across the crate.

/// Environment variable holding the default API key.
pub const ENV_VARIABLE: &str = "ZYTE_AUTOEXTRACT_KEY";

/// Default extraction endpoint.
pub const API_ENDPOINT: &str = "https://autoextract.scrapinghub.com/v1/extract";

/// Server-side processing budget, in seconds, used to derive transport timeouts.
pub const API_TIMEOUT: u64 = 600;

/// Hard upper bound on the number of requests in a single batch.
pub const API_MAX_BATCH: usize = 100;

/// Default connection pool size when the caller doesn't build their own transport.
pub const DEFAULT_CONNECTION_POOL_SIZE: usize = 100;

/// Default number of concurrently in-flight batches.
pub const DEFAULT_N_CONN: usize = 20;

/// Default batch size.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Base wait (seconds) of the throttling chain's first two stages: `20 + rand(0, 20)`.
pub const DEFAULT_THROTTLING_STAGE_WAIT_BASE: f64 = 20.0;
/// Jitter ceiling (seconds) of the throttling chain's first two stages.
pub const DEFAULT_THROTTLING_STAGE_WAIT_JITTER: f64 = 20.0;
/// Base wait (seconds) of the throttling chain's third-and-later stage: `30 + exp-jitter`.
pub const DEFAULT_THROTTLING_BACKOFF_BASE: f64 = 30.0;
/// Cap (seconds) on the throttling chain's exponential-jitter stage.
pub const DEFAULT_THROTTLING_BACKOFF_CAP: f64 = 600.0;

/// Lower bound (seconds) of the transport/server network wait's uniform jitter.
pub const DEFAULT_NETWORK_JITTER_LOW: f64 = 3.0;
/// Upper bound (seconds) of the transport/server network wait's uniform jitter.
pub const DEFAULT_NETWORK_JITTER_HIGH: f64 = 7.0;
/// Cap (seconds) on the transport/server network wait's exponential-jitter term.
pub const DEFAULT_NETWORK_BACKOFF_CAP: f64 = 55.0;

/// Deadline, in seconds, after which transport/server/retriable-query-error retries give up.
pub const DEFAULT_RETRY_STOP_AFTER_SECS: u64 = 15 * 60;
