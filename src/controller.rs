//! Run orchestration: owns the issue loop, fans results into the stats
//! aggregator, and manages the lifecycle from `Idle` through `Completed`.

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Duration, Instant};
use tracing::{info, warn};

use crate::client::build_client;
use crate::config::{ConfigError, TestConfig};
use crate::data_source::RowSource;
use crate::errors::ErrorKind;
use crate::executor::{RequestExecutor, RequestResult};
use crate::pacing::{ConcurrencyLimiter, RateScheduler};
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::substitute::VariableSubstitutor;
use crate::template::RequestTemplate;

/// Lifecycle of a single load test run.
///
/// A run moves strictly forward: `Idle` until `run` is called, `Running`
/// while the issue loop is live, `Stopping` while in-flight requests
/// drain, then `Completed`. `Failed` is terminal and only reachable
/// before any request has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Completed,
    Failed,
}

/// Errors that prevent a run from starting.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Remote control for an in-progress run.
///
/// Handles are cheap to clone and remain valid after the run finishes;
/// `stop` becomes a no-op once the issue loop has exited.
#[derive(Clone)]
pub struct RunHandle {
    stop_tx: broadcast::Sender<()>,
    state_rx: watch::Receiver<RunState>,
    stats: StatsAggregator,
}

impl RunHandle {
    /// Requests a graceful stop: no new requests are issued and the run
    /// moves to `Stopping` to drain whatever is in flight.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    /// Point-in-time view of the statistics gathered so far.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Drives a complete load test run from a parsed template and data source.
pub struct LoadTestController {
    config: TestConfig,
    template: RequestTemplate,
    rows: RowSource,
    stats: StatsAggregator,
    state_tx: watch::Sender<RunState>,
    state_rx: watch::Receiver<RunState>,
    stop_tx: broadcast::Sender<()>,
    stop_rx: broadcast::Receiver<()>,
}

impl LoadTestController {
    /// Creates a controller for one run.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated here; rejected configurations never reach
    ///   the issue loop
    /// * `template` - The request shape fired on every attempt
    /// * `rows` - Variable rows consumed cyclically, one per attempt
    pub fn new(
        config: TestConfig,
        template: RequestTemplate,
        rows: RowSource,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let (stop_tx, stop_rx) = broadcast::channel(4);

        Ok(LoadTestController {
            config,
            template,
            rows,
            stats: StatsAggregator::default(),
            state_tx,
            state_rx,
            stop_tx,
            stop_rx,
        })
    }

    /// Returns a handle for observing and stopping this run.
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            stop_tx: self.stop_tx.clone(),
            state_rx: self.state_rx.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Runs the load test to completion and returns the final summary.
    ///
    /// The issue loop exits when the configured duration elapses or a
    /// handle requests a stop, whichever comes first. In-flight requests
    /// then get `shutdown_grace` to finish before being cancelled.
    pub async fn run(mut self) -> Result<StatsSnapshot, RunError> {
        let client = match build_client(&self.config) {
            Ok(client) => client,
            Err(error) => {
                self.state_tx.send_replace(RunState::Failed);
                return Err(RunError::ClientBuild(error));
            }
        };

        let executor = RequestExecutor::new(client, self.config.per_request_timeout);
        let substitutor = VariableSubstitutor::new(self.config.substitution);
        let scheduler = RateScheduler::new(self.config.target_rps, self.config.max_concurrency);
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency);

        // Fired once if the grace period expires; every in-flight task
        // listens on its own subscription.
        let (cancel_tx, _) = broadcast::channel::<()>(1);

        self.state_tx.send_replace(RunState::Running);
        self.stats.mark_started();
        let started = Instant::now();
        let deadline = started + self.config.duration;

        info!(
            method = %self.template.method,
            url = %self.template.url,
            target_rps = self.config.target_rps,
            duration_secs = self.config.duration.as_secs_f64(),
            max_concurrency = self.config.max_concurrency,
            data_rows = self.rows.row_count(),
            "Load test starting"
        );

        let mut tasks: JoinSet<RequestResult> = JoinSet::new();
        let mut attempt_id: u64 = 0;
        let mut stopped_early = false;

        loop {
            // Wait for the pacing slot, then for a concurrency slot. Both
            // waits are interruptible so a stop request or the deadline
            // never has to wait out a pacing gap.
            tokio::select! {
                biased;
                _ = self.stop_rx.recv() => {
                    stopped_early = true;
                    break;
                }
                _ = time::sleep_until(deadline) => break,
                _ = scheduler.acquire() => {}
            }

            let permit = tokio::select! {
                biased;
                _ = self.stop_rx.recv() => {
                    stopped_early = true;
                    break;
                }
                _ = time::sleep_until(deadline) => break,
                permit = limiter.acquire() => permit,
            };

            // Reap already-finished tasks so stats stay live mid-run.
            while let Some(joined) = tasks.try_join_next() {
                record_joined(&self.stats, joined);
            }

            attempt_id += 1;
            let issued_at = started.elapsed();
            let row = self.rows.next_row();
            self.stats.record_issued();

            let resolved = match substitutor.resolve(&self.template, &row) {
                Ok(resolved) => resolved,
                Err(error) => {
                    warn!(attempt_id, error = %error, "Request dropped before dispatch");
                    self.stats.record(&RequestResult::failure(
                        attempt_id,
                        issued_at,
                        Duration::ZERO,
                        ErrorKind::MissingVariable,
                    ));
                    continue;
                }
            };
            if !resolved.unresolved.is_empty() {
                warn!(
                    attempt_id,
                    placeholders = ?resolved.unresolved,
                    "Placeholders left unresolved, sending literal text"
                );
                self.stats
                    .record_missing_variables(resolved.unresolved.len() as u64);
            }

            let executor = executor.clone();
            let mut cancel_rx = cancel_tx.subscribe();
            tasks.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    biased;
                    _ = cancel_rx.recv() => RequestResult::failure(
                        attempt_id,
                        issued_at,
                        Duration::ZERO,
                        ErrorKind::Cancelled,
                    ),
                    result = executor.execute(resolved, attempt_id, issued_at) => result,
                }
            });
        }

        self.state_tx.send_replace(RunState::Stopping);
        info!(
            in_flight = tasks.len(),
            stopped_early, "Issue loop finished, draining in-flight requests"
        );

        let drained = time::timeout(self.config.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                record_joined(&self.stats, joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                in_flight = tasks.len(),
                grace_secs = self.config.shutdown_grace.as_secs_f64(),
                "Grace period expired, cancelling remaining requests"
            );
            let _ = cancel_tx.send(());
            while let Some(joined) = tasks.join_next().await {
                record_joined(&self.stats, joined);
            }
        }

        self.state_tx.send_replace(RunState::Completed);

        let summary = self.stats.snapshot();
        info!(
            issued = summary.issued,
            completed = summary.completed,
            success_rate = format!("{:.2}%", summary.success_rate),
            effective_rps = format!("{:.1}", summary.effective_rps),
            "Load test complete"
        );
        Ok(summary)
    }
}

fn record_joined(
    stats: &StatsAggregator,
    joined: Result<RequestResult, tokio::task::JoinError>,
) {
    match joined {
        Ok(result) => stats.record(&result),
        Err(error) => warn!(error = %error, "Request task aborted"),
    }
}
