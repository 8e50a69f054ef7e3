//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create plans and engines with sensible
//! defaults.

use std::sync::Arc;
use std::time::Duration;

use ignite_core::{Identity, RoleName};
use ignite_flow::checkpoint::{CheckpointLog, CheckpointSink};
use ignite_flow::client::ModuleClient;
use ignite_flow::client::memory::MemoryLedger;
use ignite_flow::engine::{EngineConfig, OrchestrationEngine};
use ignite_flow::module::ModuleSpec;
use ignite_flow::params::{ParamValue, ParameterBundle, Rule};
use ignite_flow::plan::BootstrapPlan;
use ignite_flow::retry::RetryPolicy;
use ignite_flow::step::{Arg, Step};

/// Operator used by every fixture plan.
pub const OPERATOR: &str = "0xOPERATOR";

/// Identity of the fixture treasury.
pub const TREASURY: &str = "0xTREASURY";

/// Identity of the fixture staking module.
pub const STAKING: &str = "0xSTAKING";

/// Genesis timestamp of fixture parameter bundles.
pub const GENESIS: i64 = 1_700_000_000;

/// Test context with a shared in-memory ledger.
pub struct TestContext {
    /// Remote modules.
    pub ledger: Arc<MemoryLedger>,
}

impl TestContext {
    /// Creates a context with an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
        }
    }

    /// Creates a context with every module of `plan` deployed.
    #[must_use]
    pub fn deployed(plan: &BootstrapPlan) -> Self {
        let ctx = Self::new();
        ctx.ledger.deploy_plan(plan).expect("deploy plan");
        ctx
    }

    /// Returns the ledger as a module client.
    #[must_use]
    pub fn client(&self) -> Arc<dyn ModuleClient> {
        self.ledger.clone()
    }

    /// Creates an engine with an in-memory checkpoint log and fast retries.
    #[must_use]
    pub fn engine(&self) -> OrchestrationEngine {
        self.engine_with(Box::new(CheckpointLog::new()))
    }

    /// Creates an engine writing to `sink`, with fast retries.
    #[must_use]
    pub fn engine_with(&self, sink: Box<dyn CheckpointSink>) -> OrchestrationEngine {
        OrchestrationEngine::new(self.client(), sink).with_config(EngineConfig {
            retry: fast_retry(),
            ..EngineConfig::default()
        })
    }

    /// Returns the identity for a fixture identity string.
    #[must_use]
    pub fn id(value: &str) -> Identity {
        Identity::new(value)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Default retry budget with millisecond backoff.
#[must_use]
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_initial_backoff(Duration::from_millis(1))
}

/// Factory for fixture plans.
pub struct PlanFactory;

impl PlanFactory {
    /// Two-step treasury plan: grant `vault` to `0xA`, then enable asset
    /// class 8 for `0xX`.
    #[must_use]
    pub fn treasury() -> BootstrapPlan {
        BootstrapPlan::builder("treasury", OPERATOR)
            .module(treasury_module())
            .role("Treasury", RoleName::owner(), OPERATOR)
            .step(
                Step::new("grant-vault", "Treasury", "grantRole")
                    .arg(Arg::text("vault"))
                    .arg(Arg::identity("0xA"))
                    .role(RoleName::owner()),
            )
            .step(
                Step::new("enable-asset", "Treasury", "enableAssetClass")
                    .arg(Arg::integer(8))
                    .arg(Arg::identity("0xX"))
                    .role(RoleName::owner())
                    .after("grant-vault"),
            )
            .build()
    }

    /// Linear plan of `n` staking parameter updates, `s1` through `s{n}`,
    /// each depending on the previous one.
    #[must_use]
    pub fn linear(n: usize) -> BootstrapPlan {
        let mut params = ParameterBundle::new().with_genesis(GENESIS);
        let mut builder = BootstrapPlan::builder("linear", OPERATOR)
            .module(staking_module())
            .role("Staking", RoleName::owner(), OPERATOR);
        for i in 1..=n {
            let key = format!("p{i}");
            params = params.with(key.clone(), ParamValue::Integer(i64::try_from(i).unwrap()));
            let mut step = Step::new(format!("s{i}"), "Staking", "setParameter")
                .arg(Arg::text(key.clone()))
                .arg(Arg::param(key))
                .role(RoleName::owner());
            if i > 1 {
                step = step.after(format!("s{}", i - 1));
            }
            builder = builder.step(step);
        }
        builder.parameters(params).build()
    }

    /// Staking plan consuming `rebaseRate` (valid range [0, 10000]) after
    /// setting the distributor.
    #[must_use]
    pub fn rebase_rate(rate: u32) -> BootstrapPlan {
        BootstrapPlan::builder("rebase-rate", OPERATOR)
            .module(staking_module())
            .role("Staking", RoleName::owner(), OPERATOR)
            .parameters(ParameterBundle::new().with_genesis(GENESIS).with_rules(
                "rebaseRate",
                ParamValue::BasisPoints(rate),
                vec![Rule::Range { min: 0, max: 10_000 }],
            ))
            .step(
                Step::new("set-distributor", "Staking", "setDistributor")
                    .arg(Arg::identity("0xDISTRIBUTOR"))
                    .role(RoleName::owner()),
            )
            .step(
                Step::new("set-rebase-rate", "Staking", "setParameter")
                    .arg(Arg::text("rebaseRate"))
                    .arg(Arg::param("rebaseRate"))
                    .role(RoleName::owner())
                    .after("set-distributor"),
            )
            .step(
                Step::new("enable-rebase", "Staking", "enableRebaseSchedule")
                    .arg(Arg::Literal(ParamValue::Timestamp(GENESIS)))
                    .role(RoleName::owner())
                    .after("set-rebase-rate"),
            )
            .build()
    }
}

/// Treasury module exposing role and asset-class operations.
#[must_use]
pub fn treasury_module() -> ModuleSpec {
    ModuleSpec::new("Treasury", TREASURY).capabilities([
        "grantRole",
        "transferOwnership",
        "enableAssetClass",
    ])
}

/// Staking module exposing its configuration operations.
#[must_use]
pub fn staking_module() -> ModuleSpec {
    ModuleSpec::new("Staking", STAKING).capabilities([
        "grantRole",
        "setDistributor",
        "setBondSource",
        "setParameter",
        "enableRebaseSchedule",
        "advanceRebase",
    ])
}
