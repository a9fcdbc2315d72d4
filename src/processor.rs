//! Request processor: the state machine that tracks one batch across retry attempts,
//! separating results that are done from queries that must be resent.

use crate::error::{is_billable_error_msg, QueryError};
use serde_json::Value;

/// Outcome of folding one attempt's results into the processor.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Every query in this attempt is done (succeeded or failed non-retriably).
    Complete(Vec<Value>),
    /// At least one query is retriable; the processor's `pending_queries` has been updated to
    /// the shrunken set to resend. Carries the query error with the greatest `retry_seconds`,
    /// since the caller must wait at least that long before retrying the whole batch.
    Retry(QueryError),
}

/// Mutable, single-batch state: what to send next, what's done, and the running counters the
/// executor folds into [`crate::stats::AggStats`] once the batch reaches a terminal state.
pub struct RequestProcessor {
    pending_queries: Vec<Value>,
    complete_queries: Vec<Value>,
    retriable_queries: Vec<Value>,
    max_retries: u32,
    n_extracted: u64,
    n_query_responses: u64,
    n_billable_query_responses: u64,
}

impl RequestProcessor {
    pub fn new(initial_queries: Vec<Value>, max_retries: u32) -> Self {
        Self {
            pending_queries: initial_queries,
            complete_queries: Vec::new(),
            retriable_queries: Vec::new(),
            max_retries,
            n_extracted: 0,
            n_query_responses: 0,
            n_billable_query_responses: 0,
        }
    }

    /// Wire payload for the next attempt.
    pub fn pending_queries(&self) -> &[Value] {
        &self.pending_queries
    }

    pub fn extracted_queries_count(&self) -> u64 {
        self.n_extracted
    }

    pub fn query_responses_count(&self) -> u64 {
        self.n_query_responses
    }

    pub fn billable_query_responses_count(&self) -> u64 {
        self.n_billable_query_responses
    }

    /// Best-available partial view on retry exhaustion: everything done, plus everything still
    /// pending (with whatever error it last carried) — no query is ever lost.
    pub fn get_latest_results(&self) -> Vec<Value> {
        self.complete_queries
            .iter()
            .chain(self.retriable_queries.iter())
            .cloned()
            .collect()
    }

    /// Fold one attempt's per-query results into the processor. Mirrors the original
    /// algorithm: each result is classified as extracted/billable, and — if per-query retries
    /// are enabled and the result carries a retriable error — moved into the pending set for
    /// the next attempt with its `userAgent` key stripped (a documented server-side workaround).
    pub fn process_results(&mut self, results: Vec<Value>) -> ProcessOutcome {
        let mut retriable_queries = Vec::new();
        let mut retriable_exceptions: Vec<QueryError> = Vec::new();
        let mut pending_queries = Vec::new();

        for result in results {
            self.n_query_responses += 1;
            let error = result.get("error").and_then(Value::as_str);

            match error {
                None => {
                    self.n_extracted += 1;
                    self.n_billable_query_responses += 1;
                }
                Some(message) => {
                    if is_billable_error_msg(message) {
                        self.n_billable_query_responses += 1;
                    }
                }
            }

            if self.max_retries > 0 {
                if let Some(message) = error {
                    let query_error =
                        QueryError::new(result.clone(), message, self.max_retries);
                    if query_error.retriable() {
                        pending_queries.push(strip_user_agent(&result));
                        retriable_queries.push(result);
                        retriable_exceptions.push(query_error);
                        continue;
                    }
                }
            }

            self.complete_queries.push(result);
        }

        self.pending_queries = pending_queries;
        self.retriable_queries = retriable_queries;

        match retriable_exceptions
            .into_iter()
            .max_by(|a, b| a.retry_seconds().total_cmp(&b.retry_seconds()))
        {
            Some(longest_wait) => ProcessOutcome::Retry(longest_wait),
            None => ProcessOutcome::Complete(self.get_latest_results()),
        }
    }
}

/// Strip any `userAgent` key from `query.userQuery` before resubmitting it, per the server's
/// documented requirement that a retried query not echo back its own prior user agent.
fn strip_user_agent(result: &Value) -> Value {
    let mut user_query = result
        .pointer("/query/userQuery")
        .cloned()
        .unwrap_or(Value::Null);
    if let Some(map) = user_query.as_object_mut() {
        map.remove("userAgent");
    }
    user_query
}
