//! Observability metrics: query latency, result sizes, training throughput.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of most recent query latencies kept for averages and percentiles.
pub const DEFAULT_LATENCY_WINDOW: usize = 10_000;

/// Collects runtime metrics for a served index.
///
/// Counters cover the whole lifetime of the collector. Latency statistics
/// cover only the most recent queries inside the latency window.
#[derive(Debug)]
pub struct MetricsCollector {
    query_latencies_us: VecDeque<f64>,
    latency_window: usize,
    total_queries: u64,
    total_results: u64,
    failed_queries: u64,
    total_trains: u64,
    failed_trains: u64,
    records_trained: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_latency_window(DEFAULT_LATENCY_WINDOW)
    }

    /// Keep at most `window` latency samples (at least one).
    pub fn with_latency_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            query_latencies_us: VecDeque::with_capacity(window.min(1024)),
            latency_window: window,
            total_queries: 0,
            total_results: 0,
            failed_queries: 0,
            total_trains: 0,
            failed_trains: 0,
            records_trained: 0,
        }
    }

    /// Record a query with its duration and the number of records it returned.
    pub fn record_query(&mut self, duration: Duration, results: usize) {
        self.total_queries += 1;
        self.total_results += results as u64;
        if self.query_latencies_us.len() == self.latency_window {
            self.query_latencies_us.pop_front();
        }
        self.query_latencies_us.push_back(duration.as_micros() as f64);
    }

    pub fn record_failed_query(&mut self) {
        self.failed_queries += 1;
    }

    /// Record a train call over `records` records.
    pub fn record_train(&mut self, records: usize, succeeded: bool) {
        self.total_trains += 1;
        if succeeded {
            self.records_trained += records as u64;
        } else {
            self.failed_trains += 1;
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries
    }

    pub fn failed_queries(&self) -> u64 {
        self.failed_queries
    }

    pub fn total_trains(&self) -> u64 {
        self.total_trains
    }

    pub fn failed_trains(&self) -> u64 {
        self.failed_trains
    }

    pub fn records_trained(&self) -> u64 {
        self.records_trained
    }

    /// Mean number of records returned per successful query.
    pub fn avg_results_per_query(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.total_results as f64 / self.total_queries as f64
    }

    /// Average query latency in microseconds.
    pub fn avg_query_latency_us(&self) -> f64 {
        if self.query_latencies_us.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.query_latencies_us.iter().sum();
        sum / self.query_latencies_us.len() as f64
    }

    /// Get a percentile of query latency (e.g., 50.0, 95.0, 99.0).
    pub fn percentile_query_latency_us(&self, percentile: f64) -> f64 {
        if self.query_latencies_us.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.query_latencies_us.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let index = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
