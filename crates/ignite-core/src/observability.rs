//! Observability infrastructure for ignite.
//!
//! Structured logging with consistent spans. Every bootstrap run carries its
//! `run_id`; every step span carries the step id and target module so a
//! halted run can be traced back through the logs as well as the checkpoint
//! log.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for CI and log shipping).
    Json,
    /// Pretty-printed logs (for operators at a terminal).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `ignite_flow=debug`)
///
/// # Example
///
/// ```rust
/// use ignite_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .try_init(),
        };
        // A global subscriber installed by the host application wins.
        let _ = result;
    });
}

/// Creates a span for one orchestration run.
///
/// # Example
///
/// ```rust
/// use ignite_core::observability::run_span;
///
/// let span = run_span("run", "01HZX3", "sha256:abcd");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn run_span(operation: &str, run_id: &str, plan_fingerprint: &str) -> Span {
    tracing::info_span!(
        "bootstrap",
        op = operation,
        run_id = run_id,
        plan = plan_fingerprint,
    )
}

/// Creates a span for a single step execution.
#[must_use]
pub fn step_span(step_id: &str, module: &str, operation: &str) -> Span {
    tracing::info_span!("step", step_id = step_id, module = module, operation = operation)
}
