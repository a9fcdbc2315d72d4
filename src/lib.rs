//! Concurrent request engine for a hosted web-content extraction service.
//!
//! Callers submit a [`Query`] — a sequence of [`Request`]s, each naming a URL and a page type —
//! and the engine batches it, runs batches under a bounded-concurrency semaphore, and retries
//! failures according to a per-error-class policy: throttling is honored indefinitely, transport
//! and server faults get a bounded deadline, and per-item "domain occupied" directives are
//! retried no earlier than the server prescribes. Successful sub-results are never resent or
//! double-billed across retries.
//!
//! # Example
//! ```no_run
//! use autoextract_core::{
//!     apikey, ClientConfig, QueryItem, Request, RetryConfig, ReqwestHttpClient, AggStats,
//!     request_parallel_as_completed,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key: Arc<str> = Arc::from(apikey::get_api_key(None)?.as_str());
//!     let config = Arc::new(ClientConfig::default());
//!     let http = ReqwestHttpClient::from_config(&config);
//!     let retry_config = Arc::new(RetryConfig::default());
//!     let agg_stats = Arc::new(AggStats::new());
//!
//!     let query: Vec<QueryItem> = vec![
//!         Request::article("https://example.com/a").into(),
//!         Request::article("https://example.com/b").into(),
//!     ];
//!
//!     let mut results = request_parallel_as_completed(
//!         http, config, retry_config, api_key, query, Arc::clone(&agg_stats),
//!     );
//!     while let Some(batch) = results.recv().await {
//!         match batch {
//!             Ok(batch) => println!("batch of {} results", batch.results.len()),
//!             Err(err) => eprintln!("batch failed: {err}"),
//!         }
//!     }
//!     println!("{}", agg_stats);
//!     Ok(())
//! }
//! ```

pub mod apikey;
pub mod batch;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod executor;
pub mod http;
pub mod processor;
pub mod request;
pub mod retry;
pub mod stats;

pub use batch::{batches, record_order, restore_order};
pub use config::{ClientConfig, NetworkWaitParams, RetryConfig, ThrottlingWaitParams};
pub use driver::request_parallel_as_completed;
pub use error::{ExtractError, QueryError, RequestError, Result, TransportError};
pub use executor::{execute_batch, BatchResult};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use processor::{ProcessOutcome, RequestProcessor};
pub use request::{Query, QueryItem, Request};
pub use retry::{classify, RetryClass};
pub use stats::{AggStats, ResponseStats, Statistics};
