//! Metrics for bootstrap runs.
//!
//! Recorded through the `metrics` crate facade; the host installs whichever
//! exporter it likes. Without a recorder every call is a no-op.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `ignite_steps_total` | Counter | `operation`, `outcome` | Step outcomes |
//! | `ignite_step_duration_seconds` | Histogram | `operation`, `outcome` | Wall time per step, retries included |
//! | `ignite_remote_requests_total` | Counter | `kind`, `result` | Slot reads and side-effecting calls |
//! | `ignite_retries_total` | Counter | `operation` | Transient failures that were retried |
//! | `ignite_runs_total` | Counter | `outcome` | Run outcomes |
//! | `ignite_pending_steps` | Gauge | - | Steps of the current run not yet executed |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: step outcomes.
    pub const STEPS_TOTAL: &str = "ignite_steps_total";
    /// Histogram: step duration in seconds.
    pub const STEP_DURATION_SECONDS: &str = "ignite_step_duration_seconds";
    /// Counter: remote requests by kind.
    pub const REMOTE_REQUESTS_TOTAL: &str = "ignite_remote_requests_total";
    /// Counter: retried transient failures.
    pub const RETRIES_TOTAL: &str = "ignite_retries_total";
    /// Counter: run outcomes.
    pub const RUNS_TOTAL: &str = "ignite_runs_total";
    /// Gauge: steps left in the current run.
    pub const PENDING_STEPS: &str = "ignite_pending_steps";
}

/// Label keys used across metrics.
pub mod labels {
    /// Operation name.
    pub const OPERATION: &str = "operation";
    /// Step or run outcome.
    pub const OUTCOME: &str = "outcome";
    /// Remote request kind (`query` or `call`).
    pub const KIND: &str = "kind";
    /// Request result (`ok` or the error kind).
    pub const RESULT: &str = "result";
}

/// Kind of remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Side-effect free slot read.
    Query,
    /// Side-effecting call.
    Call,
}

impl RequestKind {
    const fn as_label(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Call => "call",
        }
    }
}

/// Recorder for orchestration metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapMetrics;

impl BootstrapMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a step outcome and its duration.
    pub fn record_step(&self, operation: &str, outcome: &str, duration: Duration) {
        counter!(
            names::STEPS_TOTAL,
            labels::OPERATION => operation.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
        histogram!(
            names::STEP_DURATION_SECONDS,
            labels::OPERATION => operation.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records remote requests issued for one step.
    pub fn record_requests(&self, kind: RequestKind, result: &str, count: u32) {
        counter!(
            names::REMOTE_REQUESTS_TOTAL,
            labels::KIND => kind.as_label(),
            labels::RESULT => result.to_string(),
        )
        .increment(u64::from(count));
    }

    /// Records retries of a transient failure.
    pub fn record_retries(&self, operation: &str, retries: u32) {
        if retries == 0 {
            return;
        }
        counter!(
            names::RETRIES_TOTAL,
            labels::OPERATION => operation.to_string(),
        )
        .increment(u64::from(retries));
    }

    /// Records the outcome of a whole run.
    pub fn record_run(&self, outcome: &str) {
        counter!(names::RUNS_TOTAL, labels::OUTCOME => outcome.to_string()).increment(1);
    }

    /// Sets the number of steps not yet executed.
    #[allow(clippy::cast_precision_loss)] // step counts are small
    pub fn set_pending_steps(&self, pending: usize) {
        gauge!(names::PENDING_STEPS).set(pending as f64);
    }
}

/// Measures the wall time of one step.
#[derive(Debug)]
pub struct StepTimer {
    start: Instant,
}

impl StepTimer {
    /// Starts the timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
