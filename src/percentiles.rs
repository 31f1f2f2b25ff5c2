//! Percentile latency tracking using HDR Histogram.
//!
//! HdrHistogram gives accurate quantiles without keeping every sample.
//! The tracker is a plain value; the stats aggregator guards it together
//! with the run counters under one lock so a snapshot always pairs
//! matching counts and percentiles.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Histogram range: 1 microsecond to 60 seconds.
const MIN_LATENCY_US: u64 = 1;
const MAX_LATENCY_US: u64 = 60_000_000;

/// Latency summary over the recorded samples, in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct PercentileStats {
    /// Number of samples
    pub count: u64,

    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,

    /// 50th percentile - median
    pub p50_ms: f64,

    /// 95th percentile
    pub p95_ms: f64,

    /// 99th percentile
    pub p99_ms: f64,
}

impl PercentileStats {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}ms, max={:.2}ms, mean={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms",
            self.count, self.min_ms, self.max_ms, self.mean_ms, self.p50_ms, self.p95_ms, self.p99_ms,
        )
    }
}

/// Latency percentile estimator backed by HdrHistogram.
///
/// Tracks latencies from 1μs to 60 seconds with 3 significant digits of
/// precision; samples outside the range are clamped to it.
pub struct PercentileTracker {
    histogram: Histogram<u64>,
}

impl PercentileTracker {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(MIN_LATENCY_US, MAX_LATENCY_US, 3)
            .expect("Failed to create histogram");

        Self { histogram }
    }

    /// Record a latency sample.
    pub fn record(&mut self, latency: Duration) {
        let latency_us = latency.as_micros().min(MAX_LATENCY_US as u128) as u64;
        let clamped = latency_us.max(MIN_LATENCY_US);

        if let Err(e) = self.histogram.record(clamped) {
            warn!(
                latency_us = latency_us,
                error = %e,
                "Failed to record latency in histogram"
            );
        }
    }

    /// Current percentile statistics, or None when no samples exist.
    pub fn stats(&self) -> Option<PercentileStats> {
        if self.histogram.is_empty() {
            return None;
        }

        Some(PercentileStats {
            count: self.histogram.len(),
            min_ms: self.histogram.min() as f64 / 1000.0,
            max_ms: self.histogram.max() as f64 / 1000.0,
            mean_ms: self.histogram.mean() / 1000.0,
            p50_ms: self.histogram.value_at_quantile(0.50) as f64 / 1000.0,
            p95_ms: self.histogram.value_at_quantile(0.95) as f64 / 1000.0,
            p99_ms: self.histogram.value_at_quantile(0.99) as f64 / 1000.0,
        })
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new()
    }
}
