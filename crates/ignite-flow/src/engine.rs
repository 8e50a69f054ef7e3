//! Run orchestration.
//!
//! The [`OrchestrationEngine`] compiles a plan, then executes its steps one
//! at a time in the compiled order, appending a checkpoint record after each
//! step. The first failing step halts the run.
//!
//! Runs are re-entrant: executing the same plan again re-checks every step
//! against remote state, so steps whose effects are already visible are
//! skipped and execution effectively resumes at the first unobserved step.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use ignite_core::observability::run_span;
use ignite_core::{Identity, RunId};

use crate::checkpoint::{CheckpointRecord, CheckpointSink, ErrorDetail, Outcome, applied_keys};
use crate::client::ModuleClient;
use crate::error::Result;
use crate::executor::{StepContext, StepExecutor};
use crate::metrics::BootstrapMetrics;
use crate::module::{ModuleRegistry, ModuleState};
use crate::plan::{BootstrapPlan, CompiledPlan};
use crate::retry::RetryPolicy;
use crate::roles::RoleRegistry;
use crate::step::StepId;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Replaces the plan's operator when set.
    pub operator: Option<Identity>,
    /// Retry policy for remote requests.
    pub retry: RetryPolicy,
    /// Skip the remote read when the snapshot already shows the effect.
    pub trust_snapshot: bool,
}

/// Requests cancellation of a running plan.
///
/// Cancellation takes effect between steps; the step in flight completes.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    /// Every step was applied or skipped.
    Completed,
    /// A step failed.
    #[serde(rename_all = "camelCase")]
    Halted {
        /// The failing step.
        step_id: StepId,
        /// Why it failed.
        error: ErrorDetail,
    },
    /// Cancellation was requested.
    #[serde(rename_all = "camelCase")]
    Cancelled {
        /// First step that did not run.
        next_step: StepId,
    },
}

impl RunOutcome {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Halted { .. } => "halted",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Fingerprint of the executed plan.
    pub plan_fingerprint: String,
    /// Records appended by this run, in execution order.
    pub records: Vec<CheckpointRecord>,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Returns true if every step was applied or skipped.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Returns the failing step of a halted run.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepId> {
        match &self.outcome {
            RunOutcome::Halted { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Counts records with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Returns the outcome recorded for a step.
    #[must_use]
    pub fn outcome_of(&self, step: &str) -> Option<Outcome> {
        self.records
            .iter()
            .find(|r| r.step_id.as_str() == step)
            .map(|r| r.outcome)
    }
}

/// Executes bootstrap plans against remote modules.
pub struct OrchestrationEngine {
    client: Arc<dyn ModuleClient>,
    sink: Box<dyn CheckpointSink>,
    config: EngineConfig,
    modules: ModuleRegistry,
    metrics: BootstrapMetrics,
    cancel: CancelHandle,
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

impl OrchestrationEngine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new(client: Arc<dyn ModuleClient>, sink: Box<dyn CheckpointSink>) -> Self {
        Self {
            client,
            sink,
            config: EngineConfig::default(),
            modules: ModuleRegistry::new(),
            metrics: BootstrapMetrics::new(),
            cancel: CancelHandle::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a handle that cancels the current run between steps.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the module registry, including lifecycle states and
    /// snapshots from previous runs.
    #[must_use]
    pub const fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Returns every record in the checkpoint sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    pub fn history(&self) -> Result<Vec<CheckpointRecord>> {
        self.sink.records()
    }

    /// Compiles and executes a plan.
    ///
    /// Step failures do not surface as `Err`; they end the run with
    /// [`RunOutcome::Halted`].
    ///
    /// # Errors
    ///
    /// Returns plan errors from compilation (before any remote request) and
    /// storage errors from the checkpoint sink.
    pub async fn run(&mut self, plan: &BootstrapPlan) -> Result<RunReport> {
        let plan = match &self.config.operator {
            Some(operator) if operator != &plan.operator => {
                let mut plan = plan.clone();
                plan.operator = operator.clone();
                Cow::Owned(plan)
            }
            _ => Cow::Borrowed(plan),
        };
        let compiled = plan.compile()?;
        let run_id = RunId::generate();
        let span = run_span("run", &run_id.to_string(), &compiled.fingerprint);
        self.execute(compiled, run_id).instrument(span).await
    }

    async fn execute(&mut self, compiled: CompiledPlan, run_id: RunId) -> Result<RunReport> {
        self.cancel.reset();
        for module in &compiled.modules {
            self.modules.register_or_refresh(module.clone())?;
        }
        let mut roles = RoleRegistry::seeded(&compiled.roles);
        let applied = applied_keys(&self.sink.records()?);
        let executor = StepExecutor::new(Arc::clone(&self.client), self.config.retry.clone())
            .with_trusted_snapshot(self.config.trust_snapshot);

        tracing::info!(steps = compiled.steps.len(), "run started");

        let total = compiled.steps.len();
        let mut records = Vec::with_capacity(total);
        let mut outcome = RunOutcome::Completed;
        for (position, step) in compiled.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(next_step = %step.id(), "run cancelled");
                outcome = RunOutcome::Cancelled {
                    next_step: step.id().clone(),
                };
                break;
            }
            self.metrics.set_pending_steps(total - position);
            self.modules
                .transition(step.module(), ModuleState::Configuring)?;

            let ctx = StepContext {
                run_id,
                parameters: &compiled.parameters,
                applied: &applied,
            };
            let execution = executor
                .execute(step, &mut self.modules, &mut roles, ctx)
                .await;
            self.sink.append(&execution.record)?;
            records.push(execution.record);

            if let Some(error) = execution.error {
                self.modules.transition(step.module(), ModuleState::Failed)?;
                outcome = RunOutcome::Halted {
                    step_id: step.id().clone(),
                    error: ErrorDetail::from(&error),
                };
                break;
            }
        }

        if outcome == RunOutcome::Completed {
            for module in &compiled.modules {
                if matches!(
                    self.modules.state(&module.name),
                    ModuleState::Deployed | ModuleState::Configuring
                ) {
                    self.modules.transition(&module.name, ModuleState::Ready)?;
                }
            }
            tracing::info!(
                applied = records.iter().filter(|r| r.outcome == Outcome::Applied).count(),
                skipped = records
                    .iter()
                    .filter(|r| r.outcome == Outcome::SkippedAlreadyApplied)
                    .count(),
                "run completed"
            );
        } else if let RunOutcome::Halted { step_id, error } = &outcome {
            tracing::warn!(%step_id, kind = %error.kind, "run halted");
        }

        self.metrics.set_pending_steps(0);
        self.metrics.record_run(outcome.as_label());
        Ok(RunReport {
            run_id,
            plan_fingerprint: compiled.fingerprint,
            records,
            outcome,
        })
    }
}
