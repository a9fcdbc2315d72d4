//! Retry policy engine: classify a failure into one of four retry modes, each with its own
//! wait sampler and stop predicate. [`crate::executor::execute_batch`] loops an attempt under
//! these primitives directly, since the per-attempt future must borrow that function's own
//! locals (see the comment there for why that rules out a generic `FnMut`-based adapter here).
//!
//! The wait/stop *shape* for each class is fixed; the numeric parameters of that shape come
//! from [`crate::config::RetryConfig`] so advanced callers can override the §4.3 defaults
//! without forking the crate.

use crate::config::{NetworkWaitParams, RetryConfig, ThrottlingWaitParams};
use crate::error::ExtractError;
use rand::Rng;
use std::time::Duration;

/// Which of the four retry modes a failure falls into. Carries just enough data (the
/// retriable query's `retrySeconds`) to compute its wait.
#[derive(Debug, Clone)]
pub enum RetryClass {
    /// HTTP 429. Retried forever, backing off along a three-stage chain.
    Throttling,
    /// Network/TLS/timeout failure before a response was available. 15-minute deadline.
    Transport,
    /// HTTP >= 500. Same wait/stop shape as `Transport`.
    Server,
    /// A retriable per-item error. `retry_seconds` is the server-prescribed minimum wait
    /// (0 if the error carried no domain-occupied directive).
    Query { retry_seconds: f64 },
}

/// Classify a failure into a retry mode, or `None` if it should never be retried.
pub fn classify(err: &ExtractError) -> Option<RetryClass> {
    match err {
        ExtractError::Request(req_err) if req_err.is_throttling() => Some(RetryClass::Throttling),
        ExtractError::Request(req_err) if req_err.is_server_error() => Some(RetryClass::Server),
        ExtractError::Request(_) => None,
        ExtractError::Transport(_) => Some(RetryClass::Transport),
        ExtractError::Query(query_err) if query_err.retriable() => Some(RetryClass::Query {
            retry_seconds: query_err.retry_seconds(),
        }),
        ExtractError::Query(_) => None,
        ExtractError::NoApiKey | ExtractError::Json(_) | ExtractError::Internal(_) => None,
    }
}

/// Full-jitter exponential backoff: `uniform(0, min(multiplier * 2^attempt, cap))`, in seconds.
fn full_jitter_exponential(multiplier: f64, cap_secs: f64, attempt: u32) -> Duration {
    let upper = (multiplier * 2f64.powi(attempt as i32)).min(cap_secs);
    let sampled = rand::thread_rng().gen_range(0.0..=upper.max(0.0));
    Duration::from_secs_f64(sampled)
}

fn rand_range_secs(low: f64, high: f64) -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
}

/// Three-stage throttling chain: the first two attempts wait `stage_wait_base +
/// rand(0, stage_wait_jitter)` each; from the third attempt on, wait `backoff_base +
/// full-jitter-exponential(capped at backoff_cap)`.
fn throttling_wait(params: &ThrottlingWaitParams, attempt: u32) -> Duration {
    match attempt {
        0 | 1 => {
            Duration::from_secs_f64(params.stage_wait_base)
                + rand_range_secs(0.0, params.stage_wait_jitter)
        }
        _ => {
            Duration::from_secs_f64(params.backoff_base)
                + full_jitter_exponential(1.0, params.backoff_cap, attempt - 2)
        }
    }
}

/// `rand(jitter_low, jitter_high)s + full-jitter-exponential(capped at backoff_cap)`, the shape
/// shared by transport, server, and retriable-query-error faults.
fn network_wait(params: &NetworkWaitParams, attempt: u32) -> Duration {
    rand_range_secs(params.jitter_low, params.jitter_high)
        + full_jitter_exponential(1.0, params.backoff_cap, attempt)
}

/// Compute the wait before the next attempt for a given retry class, under the parameters in
/// `config`.
pub fn wait_for(class: &RetryClass, attempt: u32, config: &RetryConfig) -> Duration {
    match class {
        RetryClass::Throttling => throttling_wait(&config.throttling_wait, attempt),
        RetryClass::Transport => network_wait(&config.transport_wait, attempt),
        RetryClass::Server => network_wait(&config.server_wait, attempt),
        RetryClass::Query { retry_seconds } => {
            network_wait(&config.query_wait, attempt).max(Duration::from_secs_f64(*retry_seconds))
        }
    }
}

/// `true` iff the retry loop should stop (propagate the underlying error) given the class,
/// elapsed time since the first attempt, the next attempt index (0-based), and `config`.
pub fn should_stop(
    class: &RetryClass,
    elapsed: Duration,
    next_attempt: u32,
    config: &RetryConfig,
) -> bool {
    match class {
        RetryClass::Throttling => false,
        RetryClass::Transport => elapsed >= config.transport_stop_after,
        RetryClass::Server => elapsed >= config.server_stop_after,
        RetryClass::Query { .. } => {
            elapsed >= config.query_stop_after
                || next_attempt >= config.max_query_error_retries + 1
        }
    }
}
