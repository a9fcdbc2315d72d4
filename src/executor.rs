//! Single-batch executor: one logical batch's worth of POST attempts, retried per policy,
//! producing a merged result list plus the attempt log and updated aggregate counters.

use crate::config::{ClientConfig, RetryConfig};
use crate::error::{ExtractError, RequestError, Result};
use crate::http::HttpClient;
use crate::processor::{ProcessOutcome, RequestProcessor};
use crate::retry::{classify, should_stop, wait_for};
use crate::stats::{AggStats, ResponseStats};
use serde_json::Value;
use std::time::Instant;

/// Outcome of running one batch to completion (or to recoverable partial exhaustion).
#[derive(Debug)]
pub struct BatchResult {
    /// Merged per-query results: every input query exactly once.
    pub results: Vec<Value>,
    /// One entry per HTTP attempt made for this batch.
    pub response_stats: Vec<ResponseStats>,
}

/// Run one batch to completion: POST, classify, retry per policy, and fold counters into
/// `agg_stats`. On `QueryError` exhaustion, recovers the best-available partial view instead of
/// failing; any other exhaustion propagates.
#[tracing::instrument(skip(http, config, retry_config, query, agg_stats), fields(batch_size = query.len()))]
pub async fn execute_batch<H: HttpClient>(
    http: &H,
    config: &ClientConfig,
    retry_config: &RetryConfig,
    api_key: &str,
    query: Vec<Value>,
    agg_stats: &AggStats,
) -> Result<BatchResult> {
    let start_global = Instant::now();
    let n_input = query.len() as u64;
    let user_agent = crate::apikey::user_agent();

    let mut processor = RequestProcessor::new(query, retry_config.max_query_error_retries);
    let mut response_log: Vec<ResponseStats> = Vec::new();

    // Inlined retry loop (rather than a generic `FnMut(u32) -> Fut` adapter): each attempt's
    // future needs a fresh `&mut` borrow of `processor`/`response_log`, which a `FnMut` closure
    // cannot hand out across calls while also returning a future that outlives the call that
    // produced it. Borrowing directly from this `async fn`'s own locals sidesteps that.
    let retry_start = Instant::now();
    let mut attempt: u32 = 0;
    let outcome: std::result::Result<Vec<Value>, ExtractError> = loop {
        agg_stats.inc_attempts();
        let mut stats = ResponseStats::create(start_global);
        let body = processor.pending_queries().to_vec();

        let send_result = http
            .post_extract(
                &config.endpoint,
                api_key,
                &body,
                config.timeout,
                &config.extra_headers,
                &user_agent,
            )
            .await;

        let attempt_result: std::result::Result<Vec<Value>, ExtractError> = match send_result {
            Ok(http_response) => {
                stats.record_connected();
                stats.record_read(http_response.status);
                if let Some(connect) = stats.time_connect {
                    agg_stats.record_connect_time(connect);
                }

                if http_response.status >= 400 {
                    if http_response.status == 429 {
                        agg_stats.inc_429();
                    } else {
                        agg_stats.inc_errors();
                    }
                    tracing::warn!(status = http_response.status, "non-2xx response");
                    response_log.push(stats);
                    Err(ExtractError::from(RequestError::new(
                        http_response.status,
                        http_response.reason,
                        http_response.headers,
                        http_response.body,
                    )))
                } else {
                    if let Some(total) = stats.time_total {
                        agg_stats.record_total_time(total);
                    }
                    let decoded: std::result::Result<Vec<Value>, serde_json::Error> =
                        serde_json::from_slice(&http_response.body);
                    response_log.push(stats);
                    match decoded {
                        Err(decode_err) => {
                            agg_stats.inc_errors();
                            Err(ExtractError::from(decode_err))
                        }
                        Ok(parsed) => match processor.process_results(parsed) {
                            ProcessOutcome::Complete(all) => Ok(all),
                            ProcessOutcome::Retry(longest_wait) => {
                                tracing::debug!(
                                    retry_seconds = longest_wait.retry_seconds(),
                                    "batch has retriable per-query errors"
                                );
                                Err(ExtractError::from(longest_wait))
                            }
                        },
                    }
                }
            }
            Err(transport_err) => {
                stats.record_error(transport_err.to_string());
                response_log.push(stats);
                agg_stats.inc_errors();
                tracing::warn!(error = %transport_err, "batch POST failed before a response was available");
                Err(ExtractError::from(transport_err))
            }
        };

        match attempt_result {
            Ok(value) => break Ok(value),
            Err(err) => {
                let Some(class) = classify(&err) else {
                    break Err(err);
                };
                let next_attempt = attempt + 1;
                if should_stop(&class, retry_start.elapsed(), next_attempt, retry_config) {
                    tracing::warn!(attempt, "retry budget exhausted, propagating error");
                    break Err(err);
                }
                let wait = wait_for(&class, attempt, retry_config);
                tracing::debug!(attempt, ?wait, "retrying after wait");
                tokio::time::sleep(wait).await;
                attempt = next_attempt;
            }
        }
    };

    let result = match outcome {
        Ok(results) => {
            agg_stats.inc_results();
            Ok(results)
        }
        Err(ExtractError::Query(_)) => {
            tracing::info!("recovering partial results after retry exhaustion");
            agg_stats.inc_results();
            Ok(processor.get_latest_results())
        }
        Err(other) => {
            agg_stats.inc_fatal_errors();
            Err(other)
        }
    };

    agg_stats.add_input_queries(n_input);
    agg_stats.add_extracted_queries(processor.extracted_queries_count());
    agg_stats.add_billable_query_responses(processor.billable_query_responses_count());
    agg_stats.add_query_responses(processor.query_responses_count());

    result.map(|results| BatchResult {
        results,
        response_stats: response_log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{json_response, MockHttpClient};
    use serde_json::json;

    fn config() -> ClientConfig {
        ClientConfig::default()
    }

    #[tokio::test]
    async fn successful_batch_returns_all_results() {
        let http = MockHttpClient::new();
        let cfg = config();
        http.queue_response(
            &cfg.endpoint,
            Ok(json_response(
                200,
                json!([{"query": {"userQuery": {"url": "a"}}, "result": "ok"}]),
            )),
        );
        let agg = AggStats::new();
        let query = vec![json!({"url": "a", "pageType": "article"})];

        let result = execute_batch(&http, &cfg, &RetryConfig::default(), "key", query, &agg)
            .await
            .unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.response_stats.len(), 1);
        assert_eq!(agg.n_results(), 1);
        assert_eq!(agg.n_attempts(), 1);
    }

    #[tokio::test]
    async fn non_2xx_without_retry_budget_propagates() {
        let http = MockHttpClient::new();
        let cfg = config();
        http.queue_response(&cfg.endpoint, Ok(json_response(400, json!({"error": "bad"}))));
        let agg = AggStats::new();
        let query = vec![json!({"url": "a", "pageType": "article"})];

        let result = execute_batch(&http, &cfg, &RetryConfig::default(), "key", query, &agg).await;
        assert!(matches!(result, Err(ExtractError::Request(_))));
        assert_eq!(agg.n_fatal_errors(), 1);
        assert_eq!(agg.n_results(), 0);
    }

    #[tokio::test]
    async fn retriable_query_error_exhaustion_recovers_partial_results() {
        let http = MockHttpClient::new();
        let cfg = config();
        let retry_cfg = RetryConfig::new(1);
        // Two attempts allowed (max_query_error_retries=1 -> attempts 0 and 1), both fail the
        // same way so the second attempt exhausts the budget and the executor recovers.
        for _ in 0..2 {
            http.queue_response(
                &cfg.endpoint,
                Ok(json_response(
                    200,
                    json!([{"query": {"userQuery": {"url": "a"}}, "error": "query timed out"}]),
                )),
            );
        }
        let agg = AggStats::new();
        let query = vec![json!({"url": "a", "pageType": "article"})];

        let result = execute_batch(&http, &cfg, &retry_cfg, "key", query, &agg)
            .await
            .unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(agg.n_results(), 1);
        assert_eq!(agg.n_fatal_errors(), 0);
        assert_eq!(http.call_count(), 2);
    }

    /// Scenario S6: a 429 followed by a success. Throttling's wait is overridden to ~0 so the
    /// test doesn't actually sleep 20+ real seconds; the policy itself (retried, never counted
    /// as fatal) is what's under test.
    #[tokio::test]
    async fn throttling_429_then_success() {
        let http = MockHttpClient::new();
        let cfg = config();
        let mut retry_cfg = RetryConfig::default();
        retry_cfg.throttling_wait.stage_wait_base = 0.0;
        retry_cfg.throttling_wait.stage_wait_jitter = 0.0;

        http.queue_response(&cfg.endpoint, Ok(json_response(429, json!({"error": "slow down"}))));
        http.queue_response(
            &cfg.endpoint,
            Ok(json_response(
                200,
                json!([{"query": {"userQuery": {"url": "a"}}, "result": "ok"}]),
            )),
        );
        let agg = AggStats::new();
        let query = vec![json!({"url": "a", "pageType": "article"})];

        let result = execute_batch(&http, &cfg, &retry_cfg, "key", query, &agg)
            .await
            .unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(agg.n_429(), 1);
        assert_eq!(agg.n_attempts(), 2);
        assert_eq!(agg.n_fatal_errors(), 0);
        assert_eq!(agg.n_results(), 1);
    }
}
