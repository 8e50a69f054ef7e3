//! The standard protocol bring-up.
//!
//! [`standard_plan`] describes the complete configuration of a freshly
//! deployed protocol: asset tokens, the swap router, the genesis sale, the
//! authority, treasury, staking, distributor, bond depository, price oracle,
//! rebalancer and the staked token. Declaration order follows the order the
//! modules were historically configured in; explicit edges capture the data
//! dependencies that order relied on.
//!
//! Time-derived values (sale window, rebase start) are computed once from
//! [`ProtocolConfig::genesis`] and stored in the parameter bundle, so the
//! plan, and its fingerprint, are stable across re-runs.

use std::collections::BTreeMap;

use ignite_core::{Identity, ModuleName, RoleName};

use crate::module::ModuleSpec;
use crate::params::{ParamValue, ParameterBundle, Rule};
use crate::plan::{BootstrapPlan, PlanBuilder};
use crate::step::{Arg, EffectSpec, Step};

/// Asset tokens minted and routed during the bring-up.
pub const TOKENS: [&str; 5] = ["USDT", "USDC", "WBTC", "WETH", "BTCH"];

const WAD: u128 = 1_000_000_000_000_000_000;

/// Allowance granted to the genesis sale for the deposit tokens.
///
/// Amounts are `u128`, so this is 2^128-1 rather than the 2^256-1 a token
/// treats as unlimited. It still exceeds any supply the plan mints by many
/// orders of magnitude; the allowance slot records this exact value.
pub const UNLIMITED_ALLOWANCE: u128 = u128::MAX;
const YEAR_SECS: i64 = 365 * 24 * 3600;

/// Inputs of the standard plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Identity issuing every administrative step.
    pub operator: Identity,
    /// Identity receiving router and sale ownership at the end.
    pub governance: Identity,
    /// Identity running oracle updates and rebalancing.
    pub worker: Identity,
    /// Protocol genesis, in Unix seconds.
    pub genesis: i64,
    /// Deployed module identities; unlisted modules get a sandbox identity.
    pub identities: BTreeMap<ModuleName, Identity>,
}

impl ProtocolConfig {
    /// Configuration for a local sandbox where one operator does everything
    /// but hold governance.
    #[must_use]
    pub fn sandbox(operator: impl Into<String>, genesis: i64) -> Self {
        Self {
            operator: Identity::new(operator),
            governance: Identity::new("sandbox:governance"),
            worker: Identity::new("sandbox:worker"),
            genesis,
            identities: BTreeMap::new(),
        }
    }

    /// Returns the identity of a module.
    #[must_use]
    pub fn identity(&self, module: &str) -> Identity {
        self.identities
            .get(&ModuleName::new(module))
            .cloned()
            .unwrap_or_else(|| Identity::new(format!("sandbox:{}", module.to_lowercase())))
    }
}

/// Builds the parameter bundle of the standard plan.
#[must_use]
pub fn standard_parameters(genesis: i64) -> ParameterBundle {
    let bps = |max: i64| vec![Rule::Range { min: 0, max }];
    ParameterBundle::new()
        .with_genesis(genesis)
        .with("saleStart", ParamValue::Timestamp(genesis))
        .with_rules(
            "saleEnd",
            ParamValue::Timestamp(genesis + YEAR_SECS),
            vec![Rule::MonotonicAfter {
                key: "saleStart".into(),
            }],
        )
        .with("rebaseStart", ParamValue::Timestamp(genesis))
        .with_rules("rebaseRate", ParamValue::BasisPoints(100), bps(10_000))
        .with_rules("preBondRate", ParamValue::Integer(20), bps(100))
        .with_rules("mintAmount", ParamValue::Amount(100_000_000 * WAD), vec![Rule::NonZero])
        .with("usdtDeposit", ParamValue::Amount(2_000 * WAD))
        .with("usdtMinAccepted", ParamValue::Amount(10 * WAD))
        .with("usdcDeposit", ParamValue::Amount(200_000 * WAD))
        .with("usdcMinAccepted", ParamValue::Amount(200_000 * WAD))
        .with("stakedIndex", ParamValue::Integer(100_000_000))
        .with_rules("bondControlVariable", ParamValue::BasisPoints(8_000), bps(10_000))
        .with_rules("bondBaseVariable", ParamValue::BasisPoints(5_000), bps(10_000))
        .with_rules("bondVestingSecs", ParamValue::Integer(7 * 24 * 3600), vec![Rule::NonZero])
        .with("btcUsdc365", ParamValue::Integer(40_000_000_000))
        .with("btcUsdc24", ParamValue::Integer(45_000_000_000))
        .with("btchBtc24", ParamValue::Integer(10_000))
        .with("btcUsdcTarget", ParamValue::Integer(40_000_000_000))
        .with_rules("usdcWbtcPriceAllowed", ParamValue::BasisPoints(8_000), bps(10_000))
        .with_rules("btchWbtcPriceRange", ParamValue::BasisPoints(2_000), bps(10_000))
        .with("priceGapAdjustLatest", ParamValue::Timestamp(genesis))
        .with_rules("priceGapAdjustPeriod", ParamValue::Integer(8 * 3600), vec![Rule::NonZero])
}

fn owner(id: &str, module: &str, operation: &str) -> Step {
    Step::new(id, module, operation).role(RoleName::owner())
}

fn slot(name: impl Into<String>, value: Arg) -> EffectSpec {
    EffectSpec::Slot {
        slot: name.into(),
        value,
    }
}

fn flag(value: bool) -> Arg {
    Arg::Literal(ParamValue::Bool(value))
}

fn modules(cfg: &ProtocolConfig) -> Vec<ModuleSpec> {
    let spec = |name: &str, capabilities: &[&str]| {
        ModuleSpec::new(name, cfg.identity(name).to_string())
            .capabilities(capabilities.iter().copied())
    };

    let mut modules: Vec<ModuleSpec> = TOKENS
        .iter()
        .map(|token| spec(token, &["mint", "approve"]))
        .collect();
    modules.extend([
        spec("SwapRouter", &["setActiveWorker", "registerRoute", "transferOwnership"]),
        spec(
            "Genesis",
            &[
                "setParameterAddress",
                "setParameter",
                "setPreGenesis",
                "enableTokenInfo",
                "depositAsset",
                "finalizeSale",
                "transferOwnership",
            ],
        ),
        spec("Authority", &["grantRole"]),
        spec("StakedToken", &["setIndex", "initialize"]),
        spec("Treasury", &["enableAssetClass"]),
        spec(
            "Staking",
            &[
                "setDistributor",
                "setBondSource",
                "setParameter",
                "enableRebaseSchedule",
                "advanceRebase",
                "handleGenesis",
            ],
        ),
        spec("Distributor", &[]),
        spec("RebalancerHelper", &[]),
        spec("PriceOracle", &["grantRole", "setSwapInfo", "pushSample"]),
        spec("BondDepository", &["createBondMarket", "updateParameters", "deposit"]),
        spec("GenesisReward", &[]),
        spec(
            "Rebalancer",
            &[
                "setTreasuryInfo",
                "setActiveWorker",
                "setRebalancerParameters",
                "enableLiquidityAction",
                "treasuryToLiquidity",
            ],
        ),
        spec("PreGenesis", &[]),
    ]);
    modules
}

/// Builds the standard bring-up plan.
#[must_use]
pub fn standard_plan(cfg: &ProtocolConfig) -> BootstrapPlan {
    let op = cfg.operator.as_str();
    let mut plan = PlanBuilder::new("protocol-bootstrap", op).parameters(standard_parameters(cfg.genesis));

    for module in modules(cfg) {
        let name = module.name.to_string();
        plan = plan.module(module).role(name, RoleName::owner(), op);
    }
    plan = plan
        .role("Authority", RoleName::governor(), op)
        .role("Authority", RoleName::policy(), op)
        .role("Rebalancer", RoleName::governor(), op);

    for step in steps(cfg) {
        plan = plan.step(step);
    }
    plan.build()
}

fn route(id: &str, cfg: &ProtocolConfig, from: &str, to: &str) -> Step {
    owner(id, "SwapRouter", "registerRoute")
        .arg(Arg::module(from))
        .arg(Arg::module(to))
        .arg(Arg::Literal(ParamValue::IdentityList(vec![
            cfg.identity(from),
            cfg.identity(to),
        ])))
}

fn enable(id: &str, class: i64, asset: &str) -> Step {
    owner(id, "Treasury", "enableAssetClass")
        .arg(Arg::integer(class))
        .arg(Arg::module(asset))
}

#[allow(clippy::too_many_lines)]
fn steps(cfg: &ProtocolConfig) -> Vec<Step> {
    let op = cfg.operator.as_str();
    let mut steps: Vec<Step> = ["USDT", "USDC", "WBTC"]
        .iter()
        .map(|token| {
            Step::new(format!("mint-{}", token.to_lowercase()), *token, "mint")
                .arg(Arg::identity(op))
                .arg(Arg::param("mintAmount"))
        })
        .collect();

    // Sale setup.
    steps.extend([
        owner("router-worker-genesis", "SwapRouter", "setActiveWorker")
            .arg(Arg::module("Genesis"))
            .arg(Arg::integer(1)),
        route("route-usdt-usdc", cfg, "USDT", "USDC"),
        route("route-wbtc-usdc", cfg, "WBTC", "USDC"),
        route("route-weth-usdc", cfg, "WETH", "USDC"),
        owner("genesis-router", "Genesis", "setParameterAddress")
            .arg(Arg::text("swapRouter"))
            .arg(Arg::module("SwapRouter")),
        owner("genesis-sale-start", "Genesis", "setParameter")
            .arg(Arg::text("saleStart"))
            .arg(Arg::param("saleStart")),
        owner("genesis-sale-end", "Genesis", "setParameter")
            .arg(Arg::text("saleEnd"))
            .arg(Arg::param("saleEnd")),
        owner("genesis-pregenesis", "Genesis", "setPreGenesis")
            .arg(Arg::module("PreGenesis"))
            .arg(Arg::integer(1))
            .effect(slot("preGenesis", Arg::module("PreGenesis"))),
    ]);
    for (token, wrapped) in [("USDC", false), ("USDT", false), ("WBTC", false), ("WETH", true)] {
        steps.push(
            owner(&format!("genesis-token-{}", token.to_lowercase()), "Genesis", "enableTokenInfo")
                .arg(Arg::module(token))
                .arg(flag(wrapped))
                .effect(slot(format!("tokenInfo:{}", cfg.identity(token)), flag(wrapped))),
        );
    }
    steps.extend([
        owner("router-handover", "SwapRouter", "transferOwnership")
            .arg(Arg::identity(cfg.governance.as_str())),
        owner("genesis-handover", "Genesis", "transferOwnership")
            .arg(Arg::identity(cfg.governance.as_str())),
        Step::new("approve-usdt-genesis", "USDT", "approve")
            .arg(Arg::module("Genesis"))
            .arg(Arg::Literal(ParamValue::Amount(UNLIMITED_ALLOWANCE))),
        Step::new("approve-usdc-genesis", "USDC", "approve")
            .arg(Arg::module("Genesis"))
            .arg(Arg::Literal(ParamValue::Amount(UNLIMITED_ALLOWANCE))),
        Step::new("deposit-usdt", "Genesis", "depositAsset")
            .arg(Arg::module("USDT"))
            .arg(Arg::param("usdtDeposit"))
            .arg(Arg::param("usdtMinAccepted"))
            .after("mint-usdt")
            .after("approve-usdt-genesis"),
        Step::new("deposit-usdc", "Genesis", "depositAsset")
            .arg(Arg::module("USDC"))
            .arg(Arg::param("usdcDeposit"))
            .arg(Arg::param("usdcMinAccepted"))
            .after("mint-usdc")
            .after("approve-usdc-genesis"),
        owner("genesis-prebond-rate", "Genesis", "setParameter")
            .arg(Arg::text("preBondRate"))
            .arg(Arg::param("preBondRate")),
    ]);

    // Core protocol.
    steps.extend([
        Step::new("authority-vault", "Authority", "grantRole")
            .arg(Arg::text("vault"))
            .arg(Arg::module("Treasury"))
            .role(RoleName::governor()),
        owner("staking-distributor", "Staking", "setDistributor").arg(Arg::module("Distributor")),
        owner("staking-rebase-rate", "Staking", "setParameter")
            .arg(Arg::text("rebaseRate"))
            .arg(Arg::param("rebaseRate")),
        owner("staked-index", "StakedToken", "setIndex")
            .arg(Arg::param("stakedIndex"))
            .effect(slot("index", Arg::param("stakedIndex"))),
        owner("staked-init", "StakedToken", "initialize")
            .arg(Arg::module("Staking"))
            .arg(Arg::module("Treasury"))
            .effect(slot("stakingContract", Arg::module("Staking"))),
        route("route-usdc-wbtc", cfg, "USDC", "WBTC"),
        route("route-btch-wbtc", cfg, "BTCH", "WBTC"),
        route("route-wbtc-btch", cfg, "WBTC", "BTCH"),
        owner("oracle-swap-info", "PriceOracle", "setSwapInfo")
            .arg(Arg::module("RebalancerHelper"))
            .arg(Arg::module("SwapRouter"))
            .effect(slot("swapInfo", Arg::module("SwapRouter"))),
        owner("bond-market-usdc", "BondDepository", "createBondMarket")
            .arg(Arg::module("USDC"))
            .arg(Arg::param("bondControlVariable"))
            .arg(Arg::param("bondBaseVariable"))
            .arg(Arg::param("bondVestingSecs"))
            .arg(flag(false))
            .effect(EffectSpec::Receipt),
        owner("genesis-oracle", "Genesis", "setParameterAddress")
            .arg(Arg::text("priceOracle"))
            .arg(Arg::module("PriceOracle")),
        owner("genesis-reward", "Genesis", "setParameterAddress")
            .arg(Arg::text("rewardPool"))
            .arg(Arg::module("GenesisReward")),
        enable("treasury-enable-btch", 8, "BTCH"),
        enable("treasury-enable-usdc", 2, "USDC"),
        enable("treasury-enable-wbtc", 2, "WBTC"),
        enable("treasury-enable-bond", 7, "BondDepository").after("bond-market-usdc"),
        owner("bond-parameters", "BondDepository", "updateParameters")
            .arg(Arg::module("Authority"))
            .arg(Arg::module("USDC"))
            .arg(Arg::module("BTCH"))
            .arg(Arg::module("WBTC"))
            .effect(slot("authority", Arg::module("Authority"))),
        owner("rebalancer-treasury-info", "Rebalancer", "setTreasuryInfo")
            .arg(Arg::module("Treasury"))
            .arg(Arg::module("BondDepository"))
            .arg(Arg::module("PriceOracle"))
            .arg(Arg::module("RebalancerHelper"))
            .effect(slot("treasury", Arg::module("Treasury"))),
        owner("router-worker-rebalancer", "SwapRouter", "setActiveWorker")
            .arg(Arg::module("Rebalancer"))
            .arg(Arg::integer(1)),
    ]);
    for class in [9, 1, 6, 7] {
        steps.push(
            enable(&format!("treasury-enable-rebalancer-{class}"), class, "Rebalancer")
                .after("rebalancer-treasury-info"),
        );
    }

    // Settlement and go-live.
    steps.extend([
        owner("staking-bond-source", "Staking", "setBondSource").arg(Arg::module("BondDepository")),
        owner("oracle-worker", "PriceOracle", "grantRole")
            .arg(Arg::text("worker"))
            .arg(Arg::identity(cfg.worker.as_str())),
        Step::new("oracle-sample", "PriceOracle", "pushSample")
            .arg(Arg::integer(1))
            .arg(Arg::param("btcUsdc365"))
            .arg(Arg::param("btcUsdc24"))
            .arg(Arg::param("btchBtc24"))
            .arg(Arg::param("btcUsdcTarget"))
            .role(RoleName::worker())
            .caller(cfg.worker.as_str())
            .after("oracle-worker")
            .after("oracle-swap-info"),
        owner("genesis-settle", "Genesis", "finalizeSale")
            .after("deposit-usdt")
            .after("deposit-usdc")
            .after("oracle-sample"),
        owner("rebalancer-worker", "Rebalancer", "setActiveWorker")
            .arg(Arg::identity(cfg.worker.as_str()))
            .arg(Arg::integer(1)),
        Step::new("rebalancer-parameters", "Rebalancer", "setRebalancerParameters")
            .arg(Arg::param("usdcWbtcPriceAllowed"))
            .arg(Arg::param("btchWbtcPriceRange"))
            .arg(Arg::param("priceGapAdjustLatest"))
            .arg(Arg::param("priceGapAdjustPeriod"))
            .role(RoleName::governor())
            .effect(EffectSpec::Receipt),
        owner("rebalancer-liquidity", "Rebalancer", "enableLiquidityAction")
            .effect(slot("liquidityActionEnabled", flag(true)))
            .after("rebalancer-parameters"),
        owner("staking-rebase-schedule", "Staking", "enableRebaseSchedule")
            .arg(Arg::param("rebaseStart")),
        owner("staking-rebase", "Staking", "advanceRebase").after("staking-rebase-schedule"),
        owner("staking-genesis", "Staking", "handleGenesis")
            .effect(EffectSpec::Receipt)
            .after("genesis-settle")
            .after("staking-rebase"),
        // Kept for operators who run liquidity moves by hand.
        Step::new("rebalancer-treasury-liquidity", "Rebalancer", "treasuryToLiquidity")
            .arg(Arg::param("btchWbtcPriceRange"))
            .caller(cfg.worker.as_str())
            .effect(EffectSpec::Receipt)
            .inactive(),
    ]);
    steps
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::checkpoint::{CheckpointLog, Outcome};
    use crate::client::memory::MemoryLedger;
    use crate::engine::OrchestrationEngine;

    const GENESIS: i64 = 1_700_000_000;

    #[test]
    fn standard_plan_compiles() {
        let plan = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS));
        let compiled = plan.compile().unwrap();
        assert_eq!(compiled.steps.len(), plan.steps.iter().filter(|s| s.active).count());
        assert!(plan.parameters.validate_all().is_empty());
    }

    #[test]
    fn handovers_follow_privileged_steps() {
        let plan = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS));
        let compiled = plan.compile().unwrap();
        let position = |id: &str| {
            compiled
                .order()
                .iter()
                .position(|s| s.as_str() == id)
                .unwrap()
        };
        assert!(position("genesis-settle") < position("genesis-handover"));
        assert!(position("genesis-reward") < position("genesis-handover"));
        assert!(position("router-worker-rebalancer") < position("router-handover"));
        assert!(position("staking-rebase") < position("staking-genesis"));
    }

    #[test]
    fn fingerprint_is_fixed_by_genesis() {
        let a = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS));
        let b = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS));
        let c = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS + 1));
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[tokio::test]
    async fn standard_plan_runs_and_reruns_idempotently() {
        let plan = standard_plan(&ProtocolConfig::sandbox("0xOP", GENESIS));
        let ledger = Arc::new(MemoryLedger::new());
        ledger.deploy_plan(&plan).unwrap();
        let mut engine = OrchestrationEngine::new(ledger.clone(), Box::new(CheckpointLog::new()));

        let first = engine.run(&plan).await.unwrap();
        assert!(first.is_completed(), "{:?}", first.outcome);
        assert_eq!(first.count(Outcome::Applied), first.records.len());

        ledger.reset_counters().unwrap();
        let second = engine.run(&plan).await.unwrap();
        assert!(second.is_completed());
        assert_eq!(second.count(Outcome::SkippedAlreadyApplied), second.records.len());
        assert_eq!(ledger.side_effect_calls().unwrap(), 0);
        assert_eq!(
            ledger
                .slot(&Identity::new("sandbox:genesis"), "role:owner")
                .unwrap(),
            Some(ParamValue::Identity(Identity::new("sandbox:governance")))
        );
        assert_eq!(
            ledger
                .slot(
                    &Identity::new("sandbox:usdt"),
                    "allowance:0xOP:sandbox:genesis"
                )
                .unwrap(),
            Some(ParamValue::Amount(UNLIMITED_ALLOWANCE))
        );
    }
}
