//! Per-attempt latency buckets and aggregate counters.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A running-moments accumulator (Welford's online algorithm) for mean and variance.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one more observation into the running mean/variance.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, or 0 if no observations have been pushed.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance, or 0 if fewer than two observations have been pushed.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

/// Per-HTTP-attempt timing and outcome, recorded once per attempt regardless of success.
#[derive(Debug, Clone)]
pub struct ResponseStats {
    start: Instant,
    pub time_delayed: Duration,
    pub time_connect: Option<Duration>,
    pub time_read: Option<Duration>,
    pub time_total: Option<Duration>,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl ResponseStats {
    /// Begin tracking a new attempt, measuring delay since a global start instant (e.g. the
    /// moment the batch was handed to the driver).
    pub fn create(start_global: Instant) -> Self {
        Self {
            start: Instant::now(),
            time_delayed: start_global.elapsed(),
            time_connect: None,
            time_read: None,
            time_total: None,
            status: None,
            error: None,
        }
    }

    pub fn record_connected(&mut self) {
        self.time_connect = Some(self.start.elapsed());
    }

    pub fn record_read(&mut self, status: u16) {
        let now = self.start.elapsed();
        self.time_read = Some(now - self.time_connect.unwrap_or(Duration::ZERO));
        self.time_total = Some(now);
        self.status = Some(status);
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.time_total = Some(self.start.elapsed());
        self.error = Some(error.into());
    }
}

/// Process-wide (or per-run) aggregate counters, shared across concurrently executing batches.
/// Integer counters are atomics; the two running-moments accumulators are behind a lock, since
/// the crate's runtime is multi-threaded by default and a single mutable `Statistics` cannot be
/// shared without one.
#[derive(Default)]
pub struct AggStats {
    time_connect_stats: Mutex<Statistics>,
    time_total_stats: Mutex<Statistics>,
    n_results: AtomicU64,
    n_fatal_errors: AtomicU64,
    n_attempts: AtomicU64,
    n_429: AtomicU64,
    n_errors: AtomicU64,
    n_input_queries: AtomicU64,
    n_extracted_queries: AtomicU64,
    n_query_responses: AtomicU64,
    n_billable_query_responses: AtomicU64,
}

impl AggStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect_time(&self, duration: Duration) {
        self.time_connect_stats.lock().push(duration.as_secs_f64());
    }

    pub fn record_total_time(&self, duration: Duration) {
        self.time_total_stats.lock().push(duration.as_secs_f64());
    }

    pub fn inc_results(&self) {
        self.n_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fatal_errors(&self) {
        self.n_fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attempts(&self) {
        self.n_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_429(&self) {
        self.n_429.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.n_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_input_queries(&self, n: u64) {
        self.n_input_queries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_extracted_queries(&self, n: u64) {
        self.n_extracted_queries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_query_responses(&self, n: u64) {
        self.n_query_responses.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_billable_query_responses(&self, n: u64) {
        self.n_billable_query_responses.fetch_add(n, Ordering::Relaxed);
    }

    pub fn n_results(&self) -> u64 {
        self.n_results.load(Ordering::Relaxed)
    }

    pub fn n_fatal_errors(&self) -> u64 {
        self.n_fatal_errors.load(Ordering::Relaxed)
    }

    pub fn n_attempts(&self) -> u64 {
        self.n_attempts.load(Ordering::Relaxed)
    }

    pub fn n_429(&self) -> u64 {
        self.n_429.load(Ordering::Relaxed)
    }

    pub fn n_errors(&self) -> u64 {
        self.n_errors.load(Ordering::Relaxed)
    }

    pub fn n_input_queries(&self) -> u64 {
        self.n_input_queries.load(Ordering::Relaxed)
    }

    pub fn n_extracted_queries(&self) -> u64 {
        self.n_extracted_queries.load(Ordering::Relaxed)
    }

    pub fn n_query_responses(&self) -> u64 {
        self.n_query_responses.load(Ordering::Relaxed)
    }

    pub fn n_billable_query_responses(&self) -> u64 {
        self.n_billable_query_responses.load(Ordering::Relaxed)
    }

    fn ratio(numerator: u64, denominator: u64) -> f64 {
        if denominator == 0 {
            0.0
        } else {
            numerator as f64 / denominator as f64
        }
    }

    /// A multi-line block suitable for a process-end summary.
    pub fn summary(&self) -> String {
        format!(
            "Summary:\n\
             - attempts: {attempts}\n\
             - 429 responses: {n429}\n\
             - errors: {errors} ({fatal} fatal)\n\
             - input queries: {input}\n\
             - extracted queries: {extracted}\n\
             - query responses: {responses}\n\
             - billable query responses: {billable}\n\
             - mean connect time: {connect:.2}s\n\
             - mean response time: {total:.2}s",
            attempts = self.n_attempts(),
            n429 = self.n_429(),
            errors = self.n_errors(),
            fatal = self.n_fatal_errors(),
            input = self.n_input_queries(),
            extracted = self.n_extracted_queries(),
            responses = self.n_query_responses(),
            billable = self.n_billable_query_responses(),
            connect = self.time_connect_stats.lock().mean(),
            total = self.time_total_stats.lock().mean(),
        )
    }
}

impl std::fmt::Display for AggStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n_attempts = self.n_attempts();
        let n_errors = self.n_errors();
        let n_fatal = self.n_fatal_errors();
        let n_input = self.n_input_queries();
        let n_extracted = self.n_extracted_queries();
        write!(
            f,
            "conn:{:0.2}s, resp:{:0.2}s, throttle:{:.1}%, err:{}+{}({:.1}%) | success:{}/{}({:.1}%)",
            self.time_connect_stats.lock().mean(),
            self.time_total_stats.lock().mean(),
            Self::ratio(self.n_429(), n_attempts) * 100.0,
            n_errors.saturating_sub(n_fatal),
            n_fatal,
            Self::ratio(n_errors, n_attempts) * 100.0,
            n_extracted,
            n_input,
            Self::ratio(n_extracted, n_input) * 100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_mean_and_variance() {
        let mut stats = Statistics::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }
        assert!((stats.mean() - 5.0).abs() < 1e-9);
        assert!((stats.variance() - 4.5714285714).abs() < 1e-6);
    }

    #[test]
    fn statistics_empty_is_zero_not_nan() {
        let stats = Statistics::new();
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn ratios_are_zero_on_empty_denominator() {
        let stats = AggStats::new();
        let rendered = stats.to_string();
        assert!(rendered.contains("throttle:0.0%"));
        assert!(rendered.contains("success:0/0"));
    }

    #[test]
    fn display_reflects_recorded_counters() {
        let stats = AggStats::new();
        stats.inc_attempts();
        stats.inc_attempts();
        stats.inc_429();
        stats.add_input_queries(10);
        stats.add_extracted_queries(8);
        let rendered = stats.to_string();
        assert!(rendered.contains("throttle:50.0%"));
        assert!(rendered.contains("success:8/10"));
    }
}
