//! Single-step execution.
//!
//! For every step the executor, in order:
//!
//! 1. resolves the target module in the registry
//! 2. authorizes the caller against the role registry (local, no remote call)
//! 3. resolves and validates arguments against the parameter bundle
//! 4. reads the effect slot from the remote module and skips the step if the
//!    effect, or the value a later step overwrites it with, is already
//!    visible
//! 5. issues the call, retrying transient failures with backoff; before each
//!    retry the slot is read again so a call that landed but timed out is
//!    not issued twice
//! 6. records the observed effect in the module snapshot and role registry
//!
//! Validation precedes the remote read so an out-of-contract parameter
//! halts the run without touching any module.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use tracing::Instrument;

use ignite_core::observability::step_span;
use ignite_core::{Identity, ModuleName, RoleName, RunId};

use crate::checkpoint::{CheckpointRecord, ErrorDetail, Outcome};
use crate::client::{ModuleClient, ResolvedCall};
use crate::error::{Error, Result};
use crate::metrics::{BootstrapMetrics, RequestKind, StepTimer};
use crate::module::ModuleRegistry;
use crate::operation::{Effect, Operation};
use crate::params::{ParamValue, ParameterBundle};
use crate::plan::PlannedStep;
use crate::retry::RetryPolicy;
use crate::roles::RoleRegistry;
use crate::step::{Arg, EffectSpec};

/// Per-run inputs shared by every step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Run the step belongs to.
    pub run_id: RunId,
    /// Parameters of the plan.
    pub parameters: &'a ParameterBundle,
    /// `(target, key)` pairs recorded as applied by earlier runs.
    pub applied: &'a HashSet<(Identity, String)>,
}

/// Result of executing one step.
#[derive(Debug)]
pub struct StepExecution {
    /// Record to append to the checkpoint log.
    pub record: CheckpointRecord,
    /// The failure, for `Failed` records.
    pub error: Option<Error>,
}

impl StepExecution {
    /// Returns true if the run may continue.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.record.outcome.is_success()
    }
}

/// Executes steps against remote modules.
#[derive(Clone)]
pub struct StepExecutor {
    client: Arc<dyn ModuleClient>,
    retry: RetryPolicy,
    trust_snapshot: bool,
    metrics: BootstrapMetrics,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("retry", &self.retry)
            .field("trust_snapshot", &self.trust_snapshot)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    /// Creates an executor issuing requests through `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ModuleClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            trust_snapshot: false,
            metrics: BootstrapMetrics::new(),
        }
    }

    /// Lets a matching snapshot entry short-circuit the remote read.
    #[must_use]
    pub const fn with_trusted_snapshot(mut self, trust: bool) -> Self {
        self.trust_snapshot = trust;
        self
    }

    /// Executes one step and returns its checkpoint record.
    ///
    /// Never fails as a whole: any error is captured in the returned
    /// [`StepExecution`] with a `Failed` record.
    pub async fn execute(
        &self,
        step: &PlannedStep,
        modules: &mut ModuleRegistry,
        roles: &mut RoleRegistry,
        ctx: StepContext<'_>,
    ) -> StepExecution {
        let span = step_span(step.id().as_str(), step.module().as_str(), &step.step.operation);
        let timer = StepTimer::start();
        let target = modules
            .identity_of(step.module())
            .unwrap_or_else(|_| Identity::new("unresolved"));

        let mut attempts = 0;
        let result = self
            .try_execute(step, modules, roles, ctx, &mut attempts)
            .instrument(span)
            .await;

        let (outcome, error) = match result {
            Ok(outcome) => (outcome, None),
            Err(error) => (Outcome::Failed, Some(error)),
        };
        self.metrics
            .record_step(&step.step.operation, outcome.as_label(), timer.elapsed());

        if let Some(error) = &error {
            tracing::error!(
                step_id = %step.id(),
                module = %step.module(),
                kind = %error.kind(),
                attempts,
                %error,
                "step failed"
            );
        }

        StepExecution {
            record: CheckpointRecord {
                run_id: ctx.run_id,
                step_id: step.id().clone(),
                module: step.module().clone(),
                target,
                idempotency_key: step.idempotency_key.clone(),
                outcome,
                attempts,
                timestamp: Utc::now(),
                error: error.as_ref().map(ErrorDetail::from),
            },
            error,
        }
    }

    async fn try_execute(
        &self,
        step: &PlannedStep,
        modules: &mut ModuleRegistry,
        roles: &mut RoleRegistry,
        ctx: StepContext<'_>,
        attempts: &mut u32,
    ) -> Result<Outcome> {
        let name = step.module();
        let handle = modules.resolve(name)?;
        let target = handle.identity().clone();
        if !handle.supports(&step.step.operation) {
            return Err(Error::UnknownOperation {
                module: name.clone(),
                operation: step.step.operation.clone(),
                reason: "not among the module's capabilities".into(),
            });
        }

        if let Some(role) = &step.step.required_role {
            if !roles.authorize(name, role, &step.caller) {
                return Err(Error::Unauthorized {
                    module: name.clone(),
                    role: role.clone(),
                    caller: step.caller.clone(),
                    detail: None,
                });
            }
        }

        let lookup = |module: &ModuleName| modules.identity_of(module);
        let args = step
            .step
            .args
            .iter()
            .map(|arg| arg.resolve(ctx.parameters, lookup))
            .collect::<Result<Vec<_>>>()?;

        match &step.operation {
            Operation::GrantRole => {
                if let Some(role) = args.first().and_then(ParamValue::as_text) {
                    roles.check_grant(name, &RoleName::new(role), &step.caller)?;
                }
            }
            Operation::TransferOwnership => roles.check_transfer(name, &step.caller)?,
            _ => {}
        }

        Self::validate(step, &args, ctx.parameters)?;

        let effect = match &step.step.effect {
            Some(EffectSpec::Slot { slot, value }) => Effect {
                slot: slot.clone(),
                value: value.resolve(ctx.parameters, lookup)?,
            },
            Some(EffectSpec::Receipt) => Effect::receipt(&step.idempotency_key),
            None => step
                .operation
                .effect(&args, &step.caller, &step.idempotency_key)
                .ok_or_else(|| Error::UnknownOperation {
                    module: name.clone(),
                    operation: step.step.operation.clone(),
                    reason: "no effect declared".into(),
                })?,
        };

        let call = ResolvedCall {
            module: name.clone(),
            target: target.clone(),
            operation: step.step.operation.clone(),
            args,
            caller: step.caller.clone(),
            required_role: step.step.required_role.clone(),
            idempotency_key: step.idempotency_key.clone(),
            effect,
        };

        let observed = self.observe(&call, modules).await?;
        if observed.as_ref() == Some(&call.effect.value) {
            Self::absorb(&call, modules, roles)?;
            tracing::info!(key = %call.idempotency_key, "effect already visible, skipping");
            return Ok(Outcome::SkippedAlreadyApplied);
        }
        match observed {
            Some(value) if step.superseded_by.contains(&value) => {
                modules.observe(name, &call.effect.slot, value)?;
                if let Some((role, holder)) = call.effect.role_assignment() {
                    roles.record(name, &role, holder.clone());
                }
                tracing::info!(key = %call.idempotency_key, "effect overwritten by a later step, skipping");
                return Ok(Outcome::SkippedAlreadyApplied);
            }
            Some(value) => modules.observe(name, &call.effect.slot, value)?,
            None => modules.forget(name, &call.effect.slot)?,
        }

        if ctx.applied.contains(&(target, call.idempotency_key.clone())) {
            return Err(Error::StateDrift {
                step: step.id().clone(),
                module: name.clone(),
                key: call.idempotency_key.clone(),
            });
        }

        let client = &self.client;
        let request = &call;
        let issued = AtomicU32::new(0);
        let issued = &issued;
        let (result, used) = self
            .retry
            .run(&call.operation, move || async move {
                if issued.fetch_add(1, Ordering::Relaxed) > 0 {
                    let current = client
                        .read_slot(&request.target, &request.effect.slot)
                        .await
                        .map_err(|e| e.into_error(request))?;
                    if current.as_ref() == Some(&request.effect.value) {
                        tracing::info!(key = %request.idempotency_key, "earlier attempt landed");
                        return Ok(());
                    }
                }
                client
                    .call(request)
                    .await
                    .map_err(|e| e.into_error(request))
            })
            .await;
        *attempts = used;
        self.metrics
            .record_requests(RequestKind::Call, result_label(&result), used);
        self.metrics
            .record_retries(&call.operation, used.saturating_sub(1));
        result?;

        Self::absorb(&call, modules, roles)?;
        tracing::info!(key = %call.idempotency_key, attempts = used, "step applied");
        Ok(Outcome::Applied)
    }

    /// Runs the local argument checks.
    fn validate(step: &PlannedStep, args: &[ParamValue], parameters: &ParameterBundle) -> Result<()> {
        let subject = step.id().as_str();
        step.operation.check_shape(subject, args)?;
        for (arg, value) in step.step.args.iter().zip(args) {
            if let Arg::Param(key) = arg {
                parameters.validate(key)?;
                value.check_intrinsic(key, parameters.genesis)?;
            } else {
                value.check_intrinsic(subject, parameters.genesis)?;
            }
        }
        step.operation.check_values(subject, args)
    }

    /// Reads the effect slot, unless a trusted snapshot already shows it.
    async fn observe(&self, call: &ResolvedCall, modules: &ModuleRegistry) -> Result<Option<ParamValue>> {
        if self.trust_snapshot {
            let cached = modules.snapshot(&call.module)?.get(&call.effect.slot);
            if cached == Some(&call.effect.value) {
                return Ok(cached.cloned());
            }
        }

        let client = &self.client;
        let (result, used) = self
            .retry
            .run("read_slot", move || async move {
                client
                    .read_slot(&call.target, &call.effect.slot)
                    .await
                    .map_err(|e| e.into_error(call))
            })
            .await;
        self.metrics
            .record_requests(RequestKind::Query, result_label(&result), used);
        result
    }

    /// Records a visible effect locally.
    fn absorb(call: &ResolvedCall, modules: &mut ModuleRegistry, roles: &mut RoleRegistry) -> Result<()> {
        modules.observe(&call.module, &call.effect.slot, call.effect.value.clone())?;
        if let Some((role, holder)) = call.effect.role_assignment() {
            roles.record(&call.module, &role, holder.clone());
        }
        Ok(())
    }
}

fn result_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(error) => error.kind().as_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::client::CallError;
    use crate::client::memory::MemoryLedger;
    use crate::error::ErrorKind;
    use crate::module::ModuleSpec;
    use crate::plan::BootstrapPlan;
    use crate::step::Step;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        executor: StepExecutor,
        modules: ModuleRegistry,
        roles: RoleRegistry,
        plan: BootstrapPlan,
        applied: HashSet<(Identity, String)>,
    }

    fn fixture(steps: Vec<Step>, parameters: ParameterBundle) -> Fixture {
        let mut builder = BootstrapPlan::builder("exec", "0xOP")
            .module(ModuleSpec::new("Staking", "0xS").capabilities([
                "grantRole",
                "setDistributor",
                "setParameter",
                "advanceRebase",
            ]))
            .role("Staking", RoleName::owner(), "0xOP")
            .parameters(parameters);
        for step in steps {
            builder = builder.step(step);
        }
        let plan = builder.build();

        let ledger = Arc::new(MemoryLedger::new());
        ledger.deploy_plan(&plan).unwrap();
        let mut modules = ModuleRegistry::new();
        for module in &plan.modules {
            modules.register(module.clone()).unwrap();
        }
        let executor = StepExecutor::new(
            ledger.clone(),
            RetryPolicy::default().with_initial_backoff(std::time::Duration::from_millis(1)),
        );
        Fixture {
            ledger,
            executor,
            modules,
            roles: RoleRegistry::seeded(&plan.roles),
            plan,
            applied: HashSet::new(),
        }
    }

    impl Fixture {
        async fn run(&mut self, index: usize) -> StepExecution {
            let compiled = self.plan.compile().unwrap();
            let step = compiled.steps[index].clone();
            let ctx = StepContext {
                run_id: RunId::generate(),
                parameters: &self.plan.parameters,
                applied: &self.applied,
            };
            self.executor
                .execute(&step, &mut self.modules, &mut self.roles, ctx)
                .await
        }
    }

    /// Applies every call but reports the first `timeouts` of them as timed out.
    struct LateAck {
        ledger: Arc<MemoryLedger>,
        timeouts: AtomicU32,
    }

    #[async_trait]
    impl ModuleClient for LateAck {
        async fn read_slot(
            &self,
            target: &Identity,
            slot: &str,
        ) -> std::result::Result<Option<ParamValue>, CallError> {
            self.ledger.read_slot(target, slot).await
        }

        async fn call(&self, call: &ResolvedCall) -> std::result::Result<(), CallError> {
            self.ledger.call(call).await?;
            if self
                .timeouts
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CallError::Timeout {
                    message: "no receipt within 30s".into(),
                });
            }
            Ok(())
        }
    }

    fn set_distributor() -> Step {
        Step::new("distributor", "Staking", "setDistributor")
            .arg(Arg::identity("0xD"))
            .role(RoleName::owner())
    }

    #[tokio::test]
    async fn applies_then_skips() {
        let mut fx = fixture(vec![set_distributor()], ParameterBundle::new());

        let first = fx.run(0).await;
        assert_eq!(first.record.outcome, Outcome::Applied);
        assert_eq!(first.record.attempts, 1);
        assert_eq!(
            fx.modules.snapshot(&"Staking".into()).unwrap().get("distributor"),
            Some(&ParamValue::Identity(Identity::new("0xD")))
        );

        let second = fx.run(0).await;
        assert_eq!(second.record.outcome, Outcome::SkippedAlreadyApplied);
        assert_eq!(second.record.attempts, 0);
        assert_eq!(fx.ledger.side_effect_calls().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_role_fails_without_remote_request() {
        let mut fx = fixture(vec![set_distributor()], ParameterBundle::new());
        fx.roles = RoleRegistry::new();

        let result = fx.run(0).await;
        assert_eq!(result.record.outcome, Outcome::Failed);
        assert!(matches!(result.error, Some(Error::Unauthorized { .. })));
        assert_eq!(fx.ledger.query_count(), 0);
        assert_eq!(fx.ledger.side_effect_calls().unwrap(), 0);
    }

    #[tokio::test]
    async fn out_of_range_parameter_fails_before_query() {
        let params = ParameterBundle::new().with("rebaseRate", ParamValue::BasisPoints(15_000));
        let step = Step::new("rate", "Staking", "setParameter")
            .arg(Arg::text("rebaseRate"))
            .arg(Arg::param("rebaseRate"))
            .role(RoleName::owner());
        let mut fx = fixture(vec![step], params);

        let result = fx.run(0).await;
        assert_eq!(
            result.record.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Validation)
        );
        assert_eq!(fx.ledger.query_count(), 0);
    }

    #[tokio::test]
    async fn revert_is_terminal_and_keeps_reason() {
        let mut fx = fixture(vec![set_distributor()], ParameterBundle::new());
        fx.ledger
            .fail_next(
                &Identity::new("0xS"),
                "setDistributor",
                CallError::Revert {
                    reason: "Ownable: caller is not the owner".into(),
                },
                5,
            )
            .unwrap();

        let result = fx.run(0).await;
        assert_eq!(result.record.attempts, 1);
        match result.error {
            Some(Error::RemoteRevert { reason, .. }) => {
                assert_eq!(reason, "Ownable: caller is not the owner");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn previously_applied_effect_missing_is_drift() {
        let mut fx = fixture(vec![set_distributor()], ParameterBundle::new());
        let key = fx.plan.compile().unwrap().steps[0].idempotency_key.clone();
        fx.applied.insert((Identity::new("0xS"), key));

        let result = fx.run(0).await;
        assert!(matches!(result.error, Some(Error::StateDrift { .. })));
        assert_eq!(fx.ledger.side_effect_calls().unwrap(), 0);
    }

    #[tokio::test]
    async fn grant_updates_role_registry() {
        let grant = Step::new("grant", "Staking", "grantRole")
            .arg(Arg::text("worker"))
            .arg(Arg::identity("0xW"))
            .role(RoleName::owner());
        let mut fx = fixture(vec![grant], ParameterBundle::new());

        let result = fx.run(0).await;
        assert!(result.is_success());
        assert!(fx.roles.authorize(&"Staking".into(), &RoleName::worker(), &"0xW".into()));
    }

    #[tokio::test]
    async fn receipt_operations_are_skipped_once_recorded() {
        let step = Step::new("rebase", "Staking", "advanceRebase").role(RoleName::owner());
        let mut fx = fixture(vec![step], ParameterBundle::new());

        assert_eq!(fx.run(0).await.record.outcome, Outcome::Applied);
        assert_eq!(fx.run(0).await.record.outcome, Outcome::SkippedAlreadyApplied);
        assert_eq!(fx.ledger.calls_to("advanceRebase").unwrap(), 1);
    }

    #[tokio::test]
    async fn landed_call_that_timed_out_is_not_reissued() {
        let step = Step::new("rebase", "Staking", "advanceRebase").role(RoleName::owner());
        let mut fx = fixture(vec![step], ParameterBundle::new());
        fx.executor = StepExecutor::new(
            Arc::new(LateAck {
                ledger: fx.ledger.clone(),
                timeouts: AtomicU32::new(1),
            }),
            RetryPolicy::default().with_initial_backoff(std::time::Duration::from_millis(1)),
        );

        let result = fx.run(0).await;
        assert_eq!(result.record.outcome, Outcome::Applied);
        assert_eq!(result.record.attempts, 2);
        assert_eq!(fx.ledger.calls_to("advanceRebase").unwrap(), 1);
        let key = fx.plan.compile().unwrap().steps[0].idempotency_key.clone();
        assert_eq!(
            fx.ledger
                .slot(&Identity::new("0xS"), &Effect::receipt(&key).slot)
                .unwrap(),
            Some(ParamValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn overwritten_grant_is_skipped_not_drift() {
        let grant = |id: &str, holder: &str| {
            Step::new(id, "Staking", "grantRole")
                .arg(Arg::text("vault"))
                .arg(Arg::identity(holder))
                .role(RoleName::owner())
        };
        let mut fx = fixture(
            vec![grant("vault-a", "0xA"), grant("vault-b", "0xB")],
            ParameterBundle::new(),
        );
        assert!(fx.run(0).await.is_success());
        assert!(fx.run(1).await.is_success());
        let key = fx.plan.compile().unwrap().steps[0].idempotency_key.clone();
        fx.applied.insert((Identity::new("0xS"), key));
        fx.ledger.reset_counters().unwrap();

        let rerun = fx.run(0).await;
        assert_eq!(rerun.record.outcome, Outcome::SkippedAlreadyApplied);
        assert!(rerun.error.is_none());
        assert_eq!(fx.ledger.side_effect_calls().unwrap(), 0);
        assert_eq!(
            fx.modules.snapshot(&"Staking".into()).unwrap().get("role:vault"),
            Some(&ParamValue::Identity(Identity::new("0xB")))
        );
    }
}
