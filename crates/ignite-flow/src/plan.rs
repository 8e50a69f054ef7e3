//! Bootstrap plans.
//!
//! A [`BootstrapPlan`] is the persistable artifact: modules, initial role
//! holders, parameters and steps, stored as camelCase JSON. Compiling a plan
//! checks it end to end without touching any remote module:
//!
//! - module and step names are well-formed and unique
//! - every step targets a declared module exposing the operation
//! - arguments resolve and match the operation's shape
//! - idempotency keys are unique per module
//! - the dependency graph is acyclic (explicit edges, module dependencies,
//!   and the implicit "privileged steps before ownership transfer" edges)
//! - replaying grants and transfers along the total order, every step's
//!   caller holds the role it needs when the step comes up
//!
//! Parameter values are *not* checked here; each consuming step validates
//! them right before it runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ignite_core::canonical_json;
use ignite_core::{Identity, ModuleName, RoleName};

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::module::ModuleSpec;
use crate::operation::{Effect, Operation};
use crate::params::{ParamValue, ParameterBundle};
use crate::roles::{RoleAssignment, RoleRegistry};
use crate::step::{EffectSpec, Step, StepId};

/// Maximum number of active steps in a plan.
pub const MAX_STEPS_PER_PLAN: usize = 10_000;

/// Version of the plan fingerprint preimage format.
///
/// Increment when intentionally changing fingerprint semantics.
const PLAN_FINGERPRINT_VERSION: u32 = 1;

/// A complete, persistable bootstrap plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPlan {
    /// Human-readable plan name.
    pub name: String,
    /// Default caller for steps that do not name one.
    pub operator: Identity,
    /// Modules taking part in the bring-up.
    pub modules: Vec<ModuleSpec>,
    /// Role holders before the first step runs.
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    /// Parameters consumed by steps.
    #[serde(default)]
    pub parameters: ParameterBundle,
    /// Steps, in declaration order.
    pub steps: Vec<Step>,
}

/// Builder for [`BootstrapPlan`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: BootstrapPlan,
}

impl PlanBuilder {
    /// Creates a builder for an empty plan.
    #[must_use]
    pub fn new(name: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            plan: BootstrapPlan {
                name: name.into(),
                operator: Identity::new(operator),
                modules: Vec::new(),
                roles: Vec::new(),
                parameters: ParameterBundle::new(),
                steps: Vec::new(),
            },
        }
    }

    /// Declares a module.
    #[must_use]
    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.plan.modules.push(module);
        self
    }

    /// Declares an initial role holder.
    #[must_use]
    pub fn role(mut self, module: impl Into<String>, role: RoleName, holder: impl Into<String>) -> Self {
        self.plan.roles.push(RoleAssignment::new(module, role, holder));
        self
    }

    /// Sets the parameter bundle.
    #[must_use]
    pub fn parameters(mut self, parameters: ParameterBundle) -> Self {
        self.plan.parameters = parameters;
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.plan.steps.push(step);
        self
    }

    /// Returns the plan. Validation happens in [`BootstrapPlan::compile`].
    #[must_use]
    pub fn build(self) -> BootstrapPlan {
        self.plan
    }
}

/// A step ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// The step as declared.
    pub step: Step,
    /// Parsed operation.
    pub operation: Operation,
    /// Effective caller.
    pub caller: Identity,
    /// Effective idempotency key.
    pub idempotency_key: String,
    /// Values that later steps write to this step's effect slot, in
    /// execution order. Seeing one of them means this step already ran and
    /// was overwritten.
    pub superseded_by: Vec<ParamValue>,
}

impl PlannedStep {
    /// Returns the step id.
    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.step.id
    }

    /// Returns the target module.
    #[must_use]
    pub fn module(&self) -> &ModuleName {
        &self.step.module
    }
}

/// A validated plan with its execution order.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    /// Plan fingerprint.
    pub fingerprint: String,
    /// Default caller.
    pub operator: Identity,
    /// Declared modules.
    pub modules: Vec<ModuleSpec>,
    /// Initial role holders.
    pub roles: Vec<RoleAssignment>,
    /// Parameters.
    pub parameters: ParameterBundle,
    /// Active steps in execution order.
    pub steps: Vec<PlannedStep>,
    graph: DependencyGraph,
}

impl CompiledPlan {
    /// Returns the step ids in execution order.
    #[must_use]
    pub fn order(&self) -> Vec<&StepId> {
        self.steps.iter().map(PlannedStep::id).collect()
    }

    /// Returns the dependency graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.id() == id)
    }
}

/// Step-level differences between two plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDiff {
    /// Steps only in the new plan.
    pub added: Vec<StepId>,
    /// Steps only in the old plan.
    pub removed: Vec<StepId>,
    /// Steps present in both with different content.
    pub changed: Vec<StepId>,
    /// Parameters added, removed or changed.
    pub parameters: Vec<String>,
    /// Whether module declarations or initial roles differ.
    pub modules_changed: bool,
}

impl PlanDiff {
    /// Returns true if the plans are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.parameters.is_empty()
            && !self.modules_changed
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintSpec<'a> {
    version: u32,
    operator: &'a Identity,
    modules: Vec<&'a ModuleSpec>,
    roles: Vec<&'a RoleAssignment>,
    parameters: &'a ParameterBundle,
    steps: Vec<&'a Step>,
}

/// Compile-time view of one step with its arguments resolved.
struct Draft<'a> {
    step: &'a Step,
    operation: Operation,
    caller: Identity,
    key: String,
    args: Vec<ParamValue>,
    effect: Option<Effect>,
}

impl Draft<'_> {
    /// Role assignment performed by this step, if any.
    fn assigns(&self) -> Option<(RoleName, &Identity)> {
        match self.operation {
            Operation::GrantRole => Some((
                RoleName::new(self.args.first()?.as_text()?),
                self.args.get(1)?.as_identity()?,
            )),
            Operation::TransferOwnership => {
                Some((RoleName::owner(), self.args.first()?.as_identity()?))
            }
            _ => None,
        }
    }
}

impl BootstrapPlan {
    /// Starts building a plan.
    #[must_use]
    pub fn builder(name: impl Into<String>, operator: impl Into<String>) -> PlanBuilder {
        PlanBuilder::new(name, operator)
    }

    /// Returns the declared identity of a module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the module is not declared.
    pub fn module_identity(&self, name: &ModuleName) -> Result<Identity> {
        self.modules
            .iter()
            .find(|m| &m.name == name)
            .map(|m| m.identity.clone())
            .ok_or_else(|| Error::UnknownModule { name: name.clone() })
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Validates the plan and computes its execution order.
    ///
    /// # Errors
    ///
    /// Returns the first plan-level error found; see the module docs for
    /// the checks performed.
    #[tracing::instrument(skip(self), fields(plan = %self.name, steps = self.steps.len()))]
    pub fn compile(&self) -> Result<CompiledPlan> {
        self.operator.validate()?;
        let table = self.module_table()?;
        let drafts = self.drafts(&table)?;

        let graph = build_graph(&drafts, &table)?;
        let order = graph.order();
        let position: HashMap<&StepId, usize> =
            drafts.iter().enumerate().map(|(i, d)| (&d.step.id, i)).collect();
        let ordered: Vec<&Draft<'_>> = order
            .iter()
            .filter_map(|id| position.get(id).and_then(|&i| drafts.get(i)))
            .collect();

        simulate_roles(&ordered, &self.roles)?;

        let superseded = superseded_values(&ordered);
        let steps = ordered
            .iter()
            .zip(superseded)
            .map(|(d, superseded_by)| PlannedStep {
                step: d.step.clone(),
                operation: d.operation.clone(),
                caller: d.caller.clone(),
                idempotency_key: d.key.clone(),
                superseded_by,
            })
            .collect();

        Ok(CompiledPlan {
            fingerprint: self.fingerprint()?,
            operator: self.operator.clone(),
            modules: self.modules.clone(),
            roles: self.roles.clone(),
            parameters: self.parameters.clone(),
            steps,
            graph,
        })
    }

    /// Computes the SHA-256 fingerprint of the plan's semantic content.
    ///
    /// Covers the operator, modules and initial roles (order-independent),
    /// parameters, and active steps in declaration order. The plan name and
    /// inactive steps do not contribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the plan cannot be encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let mut modules: Vec<&ModuleSpec> = self.modules.iter().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        let mut roles: Vec<&RoleAssignment> = self.roles.iter().collect();
        roles.sort_by(|a, b| (&a.module, &a.role).cmp(&(&b.module, &b.role)));

        let spec = FingerprintSpec {
            version: PLAN_FINGERPRINT_VERSION,
            operator: &self.operator,
            modules,
            roles,
            parameters: &self.parameters,
            steps: self.steps.iter().filter(|s| s.active).collect(),
        };

        let canonical =
            canonical_json::to_canonical_bytes(&spec).map_err(|e| Error::Serialization {
                message: format!("failed to serialize fingerprint preimage to canonical JSON: {e}"),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(format!("ignite-plan:v{PLAN_FINGERPRINT_VERSION}:").as_bytes());
        hasher.update(&canonical);
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// Lists the differences from `self` (old) to `other` (new).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if a step cannot be encoded.
    pub fn diff(&self, other: &Self) -> Result<PlanDiff> {
        let encode = |step: &Step| {
            canonical_json::to_canonical_string(step).map_err(|e| Error::Serialization {
                message: format!("failed to encode step {}: {e}", step.id),
            })
        };

        let old: HashMap<&StepId, &Step> = self.steps.iter().map(|s| (&s.id, s)).collect();
        let new: HashMap<&StepId, &Step> = other.steps.iter().map(|s| (&s.id, s)).collect();

        let mut diff = PlanDiff::default();
        for step in &other.steps {
            match old.get(&step.id) {
                None => diff.added.push(step.id.clone()),
                Some(&previous) if encode(previous)? != encode(step)? => {
                    diff.changed.push(step.id.clone());
                }
                Some(_) => {}
            }
        }
        diff.removed = self
            .steps
            .iter()
            .filter(|s| !new.contains_key(&s.id))
            .map(|s| s.id.clone())
            .collect();

        let keys: BTreeSet<&str> = self.parameters.keys().chain(other.parameters.keys()).collect();
        diff.parameters = keys
            .into_iter()
            .filter(|k| self.parameters.get(k) != other.parameters.get(k))
            .map(ToString::to_string)
            .collect();

        let sorted_modules = |plan: &Self| {
            let mut modules = plan.modules.clone();
            modules.sort_by(|a, b| a.name.cmp(&b.name));
            let mut roles = plan.roles.clone();
            roles.sort_by(|a, b| (&a.module, &a.role).cmp(&(&b.module, &b.role)));
            (modules, roles)
        };
        diff.modules_changed = sorted_modules(self) != sorted_modules(other)
            || self.operator != other.operator;
        Ok(diff)
    }

    /// Parses a plan from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization {
            message: format!("invalid plan: {e}"),
        })
    }

    /// Serializes the plan as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization {
            message: format!("failed to serialize plan: {e}"),
        })
    }

    /// Loads a plan file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read, or
    /// [`Error::Serialization`] if it is not a valid plan.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::storage_with_source(format!("failed to read plan {}", path.display()), e)
        })?;
        Self::from_json(&raw)
    }

    /// Writes the plan to a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            Error::storage_with_source(format!("failed to write plan {}", path.display()), e)
        })
    }

    fn module_table(&self) -> Result<BTreeMap<&ModuleName, &ModuleSpec>> {
        let mut table = BTreeMap::new();
        for module in &self.modules {
            module.name.validate()?;
            module.identity.validate()?;
            if table.insert(&module.name, module).is_some() {
                return Err(Error::DuplicateModule {
                    name: module.name.clone(),
                });
            }
        }
        for module in &self.modules {
            if let Some(dep) = module.depends_on.iter().find(|d| !table.contains_key(d)) {
                return Err(Error::UnknownModule { name: dep.clone() });
            }
        }
        for assignment in &self.roles {
            if !table.contains_key(&assignment.module) {
                return Err(Error::UnknownModule {
                    name: assignment.module.clone(),
                });
            }
            assignment.role.validate()?;
            assignment.holder.validate()?;
        }
        Ok(table)
    }

    fn drafts<'a>(&'a self, table: &BTreeMap<&ModuleName, &ModuleSpec>) -> Result<Vec<Draft<'a>>> {
        let mut ids = HashSet::new();
        for step in &self.steps {
            if step.id.as_str().is_empty() {
                return Err(Error::validation("step", "step id cannot be empty"));
            }
            if !ids.insert(&step.id) {
                return Err(Error::DuplicateStep {
                    step: step.id.clone(),
                });
            }
        }

        let active = self.steps.iter().filter(|s| s.active).count();
        if active > MAX_STEPS_PER_PLAN {
            return Err(Error::validation(
                "plan",
                format!("{active} active steps exceed the limit of {MAX_STEPS_PER_PLAN}"),
            ));
        }

        let lookup = |name: &ModuleName| -> Result<Identity> {
            table
                .get(name)
                .map(|m| m.identity.clone())
                .ok_or_else(|| Error::UnknownModule { name: name.clone() })
        };

        let mut keys: HashMap<(&ModuleName, String), &StepId> = HashMap::new();
        let mut drafts = Vec::with_capacity(active);
        for step in self.steps.iter().filter(|s| s.active) {
            let module = table.get(&step.module).ok_or_else(|| Error::UnknownModule {
                name: step.module.clone(),
            })?;
            let operation = Operation::parse(&step.operation);
            if !module.capabilities.contains(operation.as_str()) {
                return Err(Error::UnknownOperation {
                    module: step.module.clone(),
                    operation: step.operation.clone(),
                    reason: "not among the module's capabilities".into(),
                });
            }
            if operation.is_custom() && step.effect.is_none() {
                return Err(Error::UnknownOperation {
                    module: step.module.clone(),
                    operation: step.operation.clone(),
                    reason: "operations outside the catalogue must declare an effect".into(),
                });
            }

            let args = step
                .args
                .iter()
                .map(|arg| arg.resolve(&self.parameters, lookup))
                .collect::<Result<Vec<_>>>()?;
            operation.check_shape(step.id.as_str(), &args)?;

            let caller = step.caller.clone().unwrap_or_else(|| self.operator.clone());
            caller.validate()?;
            if let Some(role) = &step.required_role {
                role.validate()?;
            }

            let key = step.effective_key()?;
            if let Some(first) = keys.insert((&step.module, key.clone()), &step.id) {
                return Err(Error::DuplicateIdempotencyKey {
                    module: step.module.clone(),
                    key,
                    first: first.clone(),
                    second: step.id.clone(),
                });
            }

            let effect = match &step.effect {
                Some(EffectSpec::Slot { slot, value }) => Some(Effect {
                    slot: slot.clone(),
                    value: value.resolve(&self.parameters, lookup)?,
                }),
                Some(EffectSpec::Receipt) => Some(Effect::receipt(&key)),
                None => operation.effect(&args, &caller, &key),
            };

            drafts.push(Draft {
                step,
                operation,
                caller,
                key,
                args,
                effect,
            });
        }
        Ok(drafts)
    }
}

fn build_graph(drafts: &[Draft<'_>], table: &BTreeMap<&ModuleName, &ModuleSpec>) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for draft in drafts {
        graph.add_step(draft.step.id.clone())?;
    }

    for draft in drafts {
        for dep in &draft.step.depends_on {
            if !graph.contains(dep) {
                return Err(Error::MissingDependency {
                    step: draft.step.id.clone(),
                    dependency: dep.to_string(),
                });
            }
            graph.add_edge(dep, &draft.step.id)?;
        }
    }

    // Every step on a module runs after every step on the modules it depends on.
    for draft in drafts {
        let Some(module) = table.get(&draft.step.module) else {
            continue;
        };
        for upstream in drafts.iter().filter(|d| module.depends_on.contains(&d.step.module)) {
            graph.add_edge(&upstream.step.id, &draft.step.id)?;
        }
    }

    // Privileged steps issued by the outgoing owner run before the module's
    // final ownership transfer.
    let mut final_transfer: BTreeMap<&ModuleName, &Draft<'_>> = BTreeMap::new();
    for draft in drafts.iter().filter(|d| d.operation == Operation::TransferOwnership) {
        final_transfer.insert(&draft.step.module, draft);
    }
    for (module, transfer) in final_transfer {
        let new_owner = transfer.assigns().map(|(_, holder)| holder.clone());
        for draft in drafts.iter().filter(|d| {
            &d.step.module == module
                && d.step.id != transfer.step.id
                && d.step.required_role.is_some()
                && Some(&d.caller) != new_owner.as_ref()
        }) {
            if !graph.depends_on(&draft.step.id, &transfer.step.id) {
                graph.add_edge(&draft.step.id, &transfer.step.id)?;
            }
        }
    }

    Ok(graph)
}

/// For each step, collects the effect values written to the same module
/// slot by steps ordered after it.
fn superseded_values(ordered: &[&Draft<'_>]) -> Vec<Vec<ParamValue>> {
    let mut writers: HashMap<(&ModuleName, &str), Vec<usize>> = HashMap::new();
    for (i, draft) in ordered.iter().enumerate() {
        if let Some(effect) = &draft.effect {
            writers
                .entry((&draft.step.module, effect.slot.as_str()))
                .or_default()
                .push(i);
        }
    }

    let mut superseded = vec![Vec::new(); ordered.len()];
    for indices in writers.values().filter(|w| w.len() > 1) {
        for (n, &i) in indices.iter().enumerate() {
            let later = indices
                .iter()
                .skip(n + 1)
                .filter_map(|&j| ordered.get(j)?.effect.as_ref())
                .map(|effect| effect.value.clone())
                .collect();
            if let Some(entry) = superseded.get_mut(i) {
                *entry = later;
            }
        }
    }
    superseded
}

fn simulate_roles(ordered: &[&Draft<'_>], initial: &[RoleAssignment]) -> Result<()> {
    let mut roles = RoleRegistry::seeded(initial);
    for (pos, draft) in ordered.iter().enumerate() {
        let module = &draft.step.module;
        if let Some(role) = &draft.step.required_role {
            if !roles.authorize(module, role, &draft.caller) {
                let later_grant = ordered.iter().skip(pos + 1).find(|later| {
                    &later.step.module == module
                        && later
                            .assigns()
                            .is_some_and(|(r, holder)| &r == role && holder == &draft.caller)
                });
                return Err(match later_grant {
                    Some(grant) => Error::MissingDependency {
                        step: draft.step.id.clone(),
                        dependency: grant.step.id.to_string(),
                    },
                    None => Error::Unauthorized {
                        module: module.clone(),
                        role: role.clone(),
                        caller: draft.caller.clone(),
                        detail: None,
                    },
                });
            }
        }

        match (&draft.operation, draft.assigns()) {
            (Operation::GrantRole, Some((role, holder))) => {
                roles.grant(module, &role, holder.clone(), &draft.caller)?;
            }
            (Operation::TransferOwnership, Some((_, holder))) => {
                roles.transfer_ownership(module, &draft.caller, holder.clone())?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Arg;

    fn treasury() -> ModuleSpec {
        ModuleSpec::new("Treasury", "0xT").capabilities([
            "grantRole",
            "enableAssetClass",
            "transferOwnership",
        ])
    }

    fn base() -> PlanBuilder {
        PlanBuilder::new("test", "0xOP")
            .module(treasury())
            .role("Treasury", RoleName::owner(), "0xOP")
    }

    fn grant(id: &str, role: &str, holder: &str) -> Step {
        Step::new(id, "Treasury", "grantRole")
            .arg(Arg::text(role))
            .arg(Arg::identity(holder))
            .role(RoleName::owner())
    }

    fn enable(id: &str, class: i64) -> Step {
        Step::new(id, "Treasury", "enableAssetClass")
            .arg(Arg::integer(class))
            .arg(Arg::identity("0xX"))
            .role(RoleName::owner())
    }

    #[test]
    fn compile_orders_by_declaration_when_unconstrained() -> Result<()> {
        let plan = base()
            .step(grant("grant", "vault", "0xA"))
            .step(enable("enable", 8))
            .build();
        let compiled = plan.compile()?;
        let order: Vec<&str> = compiled.order().iter().map(|s| s.as_str()).collect();
        assert_eq!(order, vec!["grant", "enable"]);
        assert!(compiled.fingerprint.starts_with("sha256:"));
        Ok(())
    }

    #[test]
    fn unknown_dependency_is_missing() {
        let plan = base().step(enable("enable", 8).after("ghost")).build();
        assert!(matches!(
            plan.compile(),
            Err(Error::MissingDependency { ref dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn dependency_on_inactive_step_is_missing() {
        let plan = base()
            .step(enable("old", 2).inactive())
            .step(enable("new", 8).after("old"))
            .build();
        assert!(matches!(plan.compile(), Err(Error::MissingDependency { .. })));
    }

    #[test]
    fn explicit_cycle_is_rejected() {
        let plan = base()
            .step(enable("a", 1).after("b"))
            .step(enable("b", 2).after("a"))
            .build();
        assert!(matches!(plan.compile(), Err(Error::Cycle { .. })));
    }

    #[test]
    fn operation_outside_capabilities_is_rejected() {
        let plan = base()
            .step(Step::new("mint", "Treasury", "mint").arg(Arg::identity("0xA")))
            .build();
        assert!(matches!(plan.compile(), Err(Error::UnknownOperation { .. })));
    }

    #[test]
    fn custom_operation_requires_effect() {
        let module = ModuleSpec::new("Bond", "0xB").capabilities(["createBondMarket"]);
        let step = Step::new("market", "Bond", "createBondMarket").arg(Arg::integer(8000));
        let plan = PlanBuilder::new("p", "0xOP").module(module.clone()).step(step.clone()).build();
        assert!(matches!(plan.compile(), Err(Error::UnknownOperation { .. })));

        let plan = PlanBuilder::new("p", "0xOP")
            .module(module)
            .step(step.effect(EffectSpec::Receipt))
            .build();
        assert!(plan.compile().is_ok());
    }

    #[test]
    fn duplicate_idempotency_key_per_module_is_rejected() {
        let plan = base().step(enable("a", 8)).step(enable("b", 8)).build();
        assert!(matches!(
            plan.compile(),
            Err(Error::DuplicateIdempotencyKey { .. })
        ));
    }

    #[test]
    fn role_granted_later_is_a_missing_dependency() {
        // The worker step is declared first and nothing orders it after the grant.
        let plan = base()
            .step(enable("enable", 8).role(RoleName::worker()).caller("0xW"))
            .step(grant("grant-worker", "worker", "0xW"))
            .build();
        match plan.compile() {
            Err(Error::MissingDependency { step, dependency }) => {
                assert_eq!(step.as_str(), "enable");
                assert_eq!(dependency, "grant-worker");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let fixed = base()
            .step(enable("enable", 8).role(RoleName::worker()).caller("0xW").after("grant-worker"))
            .step(grant("grant-worker", "worker", "0xW"))
            .build();
        assert!(fixed.compile().is_ok());
    }

    #[test]
    fn role_never_granted_is_unauthorized() {
        let plan = base().step(enable("enable", 8).caller("0xEVE")).build();
        assert!(matches!(plan.compile(), Err(Error::Unauthorized { .. })));
    }

    #[test]
    fn privileged_steps_are_ordered_before_ownership_transfer() -> Result<()> {
        let plan = base()
            .step(
                Step::new("handover", "Treasury", "transferOwnership")
                    .arg(Arg::identity("0xDAO"))
                    .role(RoleName::owner()),
            )
            .step(enable("enable", 8))
            .step(enable("dao-enable", 2).caller("0xDAO").after("handover"))
            .build();
        let compiled = plan.compile()?;
        let order: Vec<&str> = compiled.order().iter().map(|s| s.as_str()).collect();
        assert_eq!(order, vec!["enable", "handover", "dao-enable"]);
        Ok(())
    }

    #[test]
    fn later_writes_to_the_same_slot_supersede_earlier_ones() -> Result<()> {
        let plan = base()
            .step(grant("vault-a", "vault", "0xA"))
            .step(enable("enable", 8))
            .step(grant("vault-b", "vault", "0xB"))
            .step(grant("vault-c", "vault", "0xC"))
            .build();
        let compiled = plan.compile()?;
        let id = |v: &str| ParamValue::Identity(v.into());
        let superseded: Vec<(&str, Vec<ParamValue>)> = compiled
            .steps
            .iter()
            .map(|s| (s.id().as_str(), s.superseded_by.clone()))
            .collect();
        assert_eq!(
            superseded,
            vec![
                ("vault-a", vec![id("0xB"), id("0xC")]),
                ("enable", vec![]),
                ("vault-b", vec![id("0xC")]),
                ("vault-c", vec![]),
            ]
        );
        Ok(())
    }

    #[test]
    fn module_dependencies_become_edges() -> Result<()> {
        let staking = ModuleSpec::new("Staking", "0xS")
            .capabilities(["setDistributor"])
            .after("Treasury");
        let plan = base()
            .module(staking)
            .role("Staking", RoleName::owner(), "0xOP")
            .step(
                Step::new("distributor", "Staking", "setDistributor")
                    .arg(Arg::identity("0xD"))
                    .role(RoleName::owner()),
            )
            .step(enable("enable", 8))
            .build();
        let compiled = plan.compile()?;
        let order: Vec<&str> = compiled.order().iter().map(|s| s.as_str()).collect();
        assert_eq!(order, vec!["enable", "distributor"]);
        Ok(())
    }

    #[test]
    fn fingerprint_ignores_name_and_inactive_steps() -> Result<()> {
        let a = base().step(enable("enable", 8)).build();
        let mut b = a.clone();
        b.name = "renamed".into();
        b.steps.push(enable("disabled", 3).inactive());
        assert_eq!(a.fingerprint()?, b.fingerprint()?);

        let c = base().step(enable("enable", 2)).build();
        assert_ne!(a.fingerprint()?, c.fingerprint()?);
        Ok(())
    }

    #[test]
    fn diff_lists_step_and_parameter_changes() -> Result<()> {
        let old = base()
            .parameters(ParameterBundle::new().with("rate", ParamValue::BasisPoints(100)))
            .step(grant("grant", "vault", "0xA"))
            .step(enable("enable", 8))
            .build();
        let new = base()
            .parameters(ParameterBundle::new().with("rate", ParamValue::BasisPoints(200)))
            .step(grant("grant", "vault", "0xB"))
            .step(enable("enable-usdc", 2))
            .build();

        let diff = old.diff(&new)?;
        assert_eq!(diff.added, vec![StepId::from("enable-usdc")]);
        assert_eq!(diff.removed, vec![StepId::from("enable")]);
        assert_eq!(diff.changed, vec![StepId::from("grant")]);
        assert_eq!(diff.parameters, vec!["rate".to_string()]);
        assert!(!diff.modules_changed);
        assert!(old.diff(&old)?.is_empty());
        Ok(())
    }

    #[test]
    fn plan_json_round_trips_through_file() -> Result<()> {
        let plan = base().step(grant("grant", "vault", "0xA")).build();
        let dir = tempfile::tempdir().map_err(|e| Error::storage(e.to_string()))?;
        let path = dir.path().join("plan.json");
        plan.save(&path)?;
        assert_eq!(BootstrapPlan::load(&path)?, plan);

        let raw = plan.to_json()?;
        assert!(raw.contains("\"requiredRole\": \"owner\""));
        Ok(())
    }
}
