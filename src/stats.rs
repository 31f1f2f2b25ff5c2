//! Run statistics aggregation.
//!
//! Many request tasks produce `RequestResult`s; this is their single sink.
//! All aggregate state lives behind one mutex so a snapshot always shows a
//! consistent picture: `success_count + Σ failure_by_kind == completed ≤
//! issued` holds at every read. Readers get immutable copies and never
//! touch the live state.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::errors::ErrorKind;
use crate::executor::{RequestOutcome, RequestResult};
use crate::percentiles::{PercentileStats, PercentileTracker};

/// The run's mutable aggregate. Exclusively owned by the aggregator;
/// every mutation happens under its lock.
struct RunStatistics {
    started_at: Instant,
    issued: u64,
    completed: u64,
    success_count: u64,
    failure_by_kind: HashMap<ErrorKind, u64>,
    status_codes: HashMap<u16, u64>,
    missing_variable_warnings: u64,
    latency: PercentileTracker,
}

impl RunStatistics {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            issued: 0,
            completed: 0,
            success_count: 0,
            failure_by_kind: HashMap::new(),
            status_codes: HashMap::new(),
            missing_variable_warnings: 0,
            latency: PercentileTracker::new(),
        }
    }
}

/// Immutable point-in-time copy of the run statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Attempts dispatched so far.
    pub issued: u64,

    /// Attempts with a recorded outcome. Always ≤ `issued`.
    pub completed: u64,

    /// Completed attempts that received an HTTP response, whatever the
    /// status; 4xx/5xx detail is in `status_codes`.
    pub success_count: u64,

    /// `success_count` as a percentage of `completed`.
    pub success_rate: f64,

    /// Non-response outcomes by kind label.
    pub failure_by_kind: BTreeMap<&'static str, u64>,

    /// Response count per HTTP status code.
    pub status_codes: BTreeMap<u16, u64>,

    /// Placeholders left literal under the lenient policy.
    pub missing_variable_warnings: u64,

    /// Latency percentiles, or None before the first measured attempt.
    pub latency: Option<PercentileStats>,

    pub elapsed_seconds: f64,

    /// Completed attempts per elapsed second.
    pub effective_rps: f64,
}

/// Thread-safe sink for request results, shared by cloning.
#[derive(Clone)]
pub struct StatsAggregator {
    inner: Arc<Mutex<RunStatistics>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunStatistics::new())),
        }
    }

    /// Reset the elapsed clock. Called once when the run loop begins so
    /// elapsed time and effective RPS measure the run, not setup.
    pub fn mark_started(&self) {
        let mut stats = self.inner.lock().unwrap();
        stats.started_at = Instant::now();
    }

    /// Count one dispatched attempt.
    pub fn record_issued(&self) {
        let mut stats = self.inner.lock().unwrap();
        stats.issued += 1;
    }

    /// Count placeholders the lenient policy left literal.
    pub fn record_missing_variables(&self, count: u64) {
        let mut stats = self.inner.lock().unwrap();
        stats.missing_variable_warnings += count;
    }

    /// Ingest one completed attempt.
    ///
    /// Latency goes into the percentile estimator for attempts that ran to
    /// their own completion (responses and timeout/connection/protocol
    /// failures). Cancelled and never-sent attempts contribute counts only;
    /// their timings describe the shutdown, not the system under test.
    pub fn record(&self, result: &RequestResult) {
        let mut stats = self.inner.lock().unwrap();
        stats.completed += 1;

        match result.outcome {
            RequestOutcome::Status(code) => {
                stats.success_count += 1;
                *stats.status_codes.entry(code).or_insert(0) += 1;
                stats.latency.record(result.latency);
            }
            RequestOutcome::Failure(kind) => {
                *stats.failure_by_kind.entry(kind).or_insert(0) += 1;
                if !matches!(kind, ErrorKind::Cancelled | ErrorKind::MissingVariable) {
                    stats.latency.record(result.latency);
                }
            }
        }
    }

    /// An immutable copy of the current statistics. Safe to call at any
    /// time, including mid-run; holds the lock only long enough to copy.
    pub fn snapshot(&self) -> StatsSnapshot {
        let stats = self.inner.lock().unwrap();

        let elapsed_seconds = stats.started_at.elapsed().as_secs_f64();
        let success_rate = if stats.completed > 0 {
            stats.success_count as f64 / stats.completed as f64 * 100.0
        } else {
            0.0
        };
        let effective_rps = if elapsed_seconds > 0.0 {
            stats.completed as f64 / elapsed_seconds
        } else {
            0.0
        };

        StatsSnapshot {
            issued: stats.issued,
            completed: stats.completed,
            success_count: stats.success_count,
            success_rate,
            failure_by_kind: stats
                .failure_by_kind
                .iter()
                .map(|(kind, count)| (kind.label(), *count))
                .collect(),
            status_codes: stats.status_codes.iter().map(|(k, v)| (*k, *v)).collect(),
            missing_variable_warnings: stats.missing_variable_warnings,
            latency: stats.latency.stats(),
            elapsed_seconds,
            effective_rps,
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Sum of all non-response outcomes.
    pub fn failure_count(&self) -> u64 {
        self.failure_by_kind.values().sum()
    }
}
