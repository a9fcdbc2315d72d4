//! Parallel driver: chunk a query into batches and run them under a concurrency cap,
//! yielding results in completion order rather than submission order.

use crate::batch::batches;
use crate::config::{ClientConfig, RetryConfig};
use crate::error::{ExtractError, Result};
use crate::executor::{execute_batch, BatchResult};
use crate::http::HttpClient;
use crate::request::{query_to_wire_values, QueryItem};
use crate::stats::AggStats;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Submit a query, fanning it out into batches run under a semaphore of capacity `n_conn`.
/// Returns a channel that yields one `Result<BatchResult>` per batch in completion order — the
/// order the caller observes batches finishing in, not the order they were submitted in.
///
/// Dropping the returned receiver cancels any batches still in flight and releases the
/// semaphore.
pub fn request_parallel_as_completed<H>(
    http: H,
    config: Arc<ClientConfig>,
    retry_config: Arc<RetryConfig>,
    api_key: Arc<str>,
    query: Vec<QueryItem>,
    agg_stats: Arc<AggStats>,
) -> mpsc::Receiver<Result<BatchResult>>
where
    H: HttpClient + 'static,
{
    let (tx, rx) = mpsc::channel(config.n_conn.max(1));
    let semaphore = Arc::new(Semaphore::new(config.n_conn.max(1)));

    let chunks: Vec<Vec<serde_json::Value>> = match batches(&query, config.batch_size) {
        Ok(chunks) => chunks
            .into_iter()
            .map(query_to_wire_values)
            .collect(),
        Err(err) => {
            tokio::spawn(async move {
                let _ = tx.send(Err(err)).await;
            });
            return rx;
        }
    };

    tokio::spawn(async move {
        let mut join_set: JoinSet<Result<BatchResult>> = JoinSet::new();

        for chunk in chunks {
            let http = http.clone();
            let config = Arc::clone(&config);
            let retry_config = Arc::clone(&retry_config);
            let api_key = Arc::clone(&api_key);
            let agg_stats = Arc::clone(&agg_stats);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ExtractError::Internal("semaphore closed".to_string()))?;
                execute_batch(&http, &config, &retry_config, &api_key, chunk, &agg_stats).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => Err(ExtractError::Internal(format!(
                    "batch task panicked or was canceled: {join_err}"
                ))),
            };
            if tx.send(result).await.is_err() {
                // Receiver dropped: cancel any batches still running.
                join_set.abort_all();
                break;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{json_response, MockHttpClient};
    use crate::request::Request;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn drains_all_batches_in_some_completion_order() {
        let http = MockHttpClient::new();
        let config = Arc::new(ClientConfig::default().with_n_conn(2).with_batch_size(1));
        for i in 0..3 {
            http.queue_response(
                &config.endpoint,
                Ok(json_response(
                    200,
                    json!([{"query": {"userQuery": {"url": format!("https://example.com/{i}")}}, "result": "ok"}]),
                )),
            );
        }

        let query: Vec<QueryItem> = (0..3)
            .map(|i| QueryItem::Typed(Request::article(format!("https://example.com/{i}"))))
            .collect();

        let mut rx = request_parallel_as_completed(
            http,
            config,
            Arc::new(RetryConfig::default()),
            Arc::from("key"),
            query,
            Arc::new(AggStats::new()),
        );

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    /// Scenario S5: two single-URL batches, the first submitted resolving slower than the
    /// second. The driver must yield the faster (second-submitted) batch first — completion
    /// order, not submission order.
    #[tokio::test]
    async fn completion_order_can_differ_from_submission_order() {
        let http = MockHttpClient::new();
        let config = Arc::new(ClientConfig::default().with_n_conn(2).with_batch_size(1));

        http.queue_response_matching(
            &config.endpoint,
            |body| body.iter().any(|v| v["url"] == "https://example.com/slow"),
            Duration::from_millis(150),
            Ok(json_response(
                200,
                json!([{"query": {"userQuery": {"url": "https://example.com/slow"}}, "result": "ok"}]),
            )),
        );
        http.queue_response_matching(
            &config.endpoint,
            |body| body.iter().any(|v| v["url"] == "https://example.com/fast"),
            Duration::ZERO,
            Ok(json_response(
                200,
                json!([{"query": {"userQuery": {"url": "https://example.com/fast"}}, "result": "ok"}]),
            )),
        );

        // Submission order: the slow URL first, the fast URL second.
        let query: Vec<QueryItem> = vec![
            QueryItem::Typed(Request::article("https://example.com/slow")),
            QueryItem::Typed(Request::article("https://example.com/fast")),
        ];

        let mut rx = request_parallel_as_completed(
            http,
            config,
            Arc::new(RetryConfig::default()),
            Arc::from("key"),
            query,
            Arc::new(AggStats::new()),
        );

        let url_of = |batch: &BatchResult| {
            batch.results[0]["query"]["userQuery"]["url"]
                .as_str()
                .unwrap()
                .to_string()
        };

        let first = rx.recv().await.unwrap().unwrap();
        let second = rx.recv().await.unwrap().unwrap();

        assert_eq!(url_of(&first), "https://example.com/fast");
        assert_eq!(url_of(&second), "https://example.com/slow");
    }

    #[tokio::test]
    async fn oversized_batch_size_surfaces_as_error_without_panicking() {
        let http = MockHttpClient::new();
        let config = Arc::new(
            ClientConfig::default()
                .with_n_conn(1)
                .with_batch_size(crate::constants::API_MAX_BATCH + 1),
        );
        let query = vec![QueryItem::Typed(Request::article("https://example.com"))];

        let mut rx = request_parallel_as_completed(
            http,
            config,
            Arc::new(RetryConfig::default()),
            Arc::from("key"),
            query,
            Arc::new(AggStats::new()),
        );

        let first = rx.recv().await.unwrap();
        assert!(first.is_err());
    }
}
