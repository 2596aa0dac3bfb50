//! Metrics collection for observability
//!
//! Lightweight rolling counters for the routing core: envelopes received,
//! errors, drops, and handler latency. Read-only from the outside; exported
//! in snapshots and as Prometheus text.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A thread-safe counter metric
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a new counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram bucket
#[derive(Debug, Clone)]
pub struct HistogramBucket {
    /// Inclusive upper bound
    pub bound: f64,
    /// Observations at or below the bound
    pub count: Arc<AtomicU64>,
}

/// A histogram for tracking distributions
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    // microseconds, so sub-millisecond handlers still register
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    /// Create a histogram with buckets suited to handler latency (in ms)
    #[must_use]
    pub fn new() -> Self {
        Self::with_buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0])
    }

    /// Create a histogram with custom buckets
    #[must_use]
    pub fn with_buckets(bucket_bounds: Vec<f64>) -> Self {
        let buckets = bucket_bounds
            .into_iter()
            .map(|b| HistogramBucket {
                bound: b,
                count: Arc::new(AtomicU64::new(0)),
            })
            .collect();

        Self {
            buckets,
            sum_micros: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Observe a value in milliseconds
    pub fn observe(&self, value_ms: f64) {
        let micros = (value_ms.max(0.0) * 1000.0) as u64;
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if value_ms <= bucket.bound {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the count of observations
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of all observations in milliseconds
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Mean observation in milliseconds (0 when empty)
    #[must_use]
    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() / n as f64,
        }
    }

    /// Get bucket counts
    #[must_use]
    pub fn bucket_counts(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .map(|b| (b.bound, b.count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stop the timer and observe the duration in a histogram
    pub fn observe_duration(self, histogram: &Histogram) {
        histogram.observe(self.elapsed_ms());
    }
}

/// Counters kept by the routing core.
///
/// Clones share the same underlying values.
#[derive(Debug, Clone, Default)]
pub struct StatusMetrics {
    /// Envelopes and raw frames received
    pub messages: Counter,
    /// Handler failures, chat errors, server error events
    pub errors: Counter,
    /// Envelopes with no route
    pub unroutable: Counter,
    /// Frames that could not be decoded
    pub malformed: Counter,
    /// Envelopes dropped for belonging to another project
    pub scope_dropped: Counter,
    /// Decisions taken by the workflow-id namespace fallback
    pub legacy_scope_matches: Counter,
    /// Handler execution time
    pub handler_latency: Histogram,
}

impl StatusMetrics {
    /// Create a fresh set of counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all counters
    #[must_use]
    pub fn report(&self) -> StatusReport {
        StatusReport {
            messages_received: self.messages.get(),
            errors: self.errors.get(),
            unroutable: self.unroutable.get(),
            malformed: self.malformed.get(),
            scope_dropped: self.scope_dropped.get(),
            legacy_scope_matches: self.legacy_scope_matches.get(),
            avg_handler_latency_ms: self.handler_latency.mean(),
        }
    }

    /// Export metrics in Prometheus format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("flowlens_messages_total", &self.messages),
            ("flowlens_errors_total", &self.errors),
            ("flowlens_unroutable_total", &self.unroutable),
            ("flowlens_malformed_total", &self.malformed),
            ("flowlens_scope_dropped_total", &self.scope_dropped),
            ("flowlens_legacy_scope_matches_total", &self.legacy_scope_matches),
        ];
        for (name, counter) in counters {
            output.push_str(&format!(
                "# TYPE {} counter\n{} {}\n",
                name,
                name,
                counter.get()
            ));
        }

        let name = "flowlens_handler_latency_ms";
        let histogram = &self.handler_latency;
        output.push_str(&format!("# TYPE {} histogram\n", name));
        for (bound, count) in histogram.bucket_counts() {
            output.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", name, bound, count));
        }
        output.push_str(&format!(
            "{}_bucket{{le=\"+Inf\"}} {}\n",
            name,
            histogram.count()
        ));
        output.push_str(&format!("{}_sum {}\n", name, histogram.sum()));
        output.push_str(&format!("{}_count {}\n", name, histogram.count()));

        output
    }
}

/// Serializable copy of [`StatusMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusReport {
    /// Envelopes and raw frames received
    pub messages_received: u64,
    /// Errors counted
    pub errors: u64,
    /// Unroutable envelopes
    pub unroutable: u64,
    /// Malformed frames
    pub malformed: u64,
    /// Out-of-scope drops
    pub scope_dropped: u64,
    /// Fallback scope decisions
    pub legacy_scope_matches: u64,
    /// Mean handler latency
    pub avg_handler_latency_ms: f64,
}

#[cfg(test)]
mod tests;
