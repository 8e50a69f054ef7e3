//! Remote modules and the registry that owns them.
//!
//! Steps never hold a module directly. They name it, and the executor
//! resolves the name through the [`ModuleRegistry`] when the step runs.
//! The registry also keeps each module's lifecycle state and the last
//! configuration it observed remotely. That snapshot is advisory; the
//! executor re-queries the module before deciding to skip a step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use ignite_core::{Identity, ModuleName};

use crate::error::{Error, Result};
use crate::params::ParamValue;

/// Module lifecycle.
///
/// ```text
/// Unregistered -> Deployed -> Configuring -> Ready
///                     |            |           |
///                     +----> Failed <----------+ (via Configuring)
///                              |
///                              +--> Configuring (resume)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Not known to the registry.
    Unregistered,
    /// Registered, no configuration step has run yet.
    Deployed,
    /// At least one configuration step has run.
    Configuring,
    /// Every step targeting the module has completed.
    Ready,
    /// A step targeting the module halted the run.
    Failed,
}

impl ModuleState {
    /// Returns true if the transition is allowed.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unregistered, Self::Deployed)
                | (Self::Deployed, Self::Configuring | Self::Ready | Self::Failed)
                | (Self::Configuring, Self::Ready | Self::Failed)
                | (Self::Ready | Self::Failed, Self::Configuring)
        )
    }

    /// Returns the label used in logs and reports.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Deployed => "deployed",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Declaration of a module in a plan file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// Logical name.
    pub name: ModuleName,
    /// Deployed identity.
    pub identity: Identity,
    /// Operations the module exposes.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Modules that must be configured before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ModuleName>,
}

impl ModuleSpec {
    /// Creates a module declaration with no capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: ModuleName::new(name),
            identity: Identity::new(identity),
            capabilities: BTreeSet::new(),
            depends_on: Vec::new(),
        }
    }

    /// Adds exposed operations.
    #[must_use]
    pub fn capabilities<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(operations.into_iter().map(Into::into));
        self
    }

    /// Adds a module dependency.
    #[must_use]
    pub fn after(mut self, module: impl Into<String>) -> Self {
        self.depends_on.push(ModuleName::new(module));
        self
    }
}

/// Last-observed configuration of a module: slot name to value.
pub type Snapshot = BTreeMap<String, ParamValue>;

/// Typed reference to one registered remote module.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    spec: ModuleSpec,
    state: ModuleState,
    snapshot: Snapshot,
}

impl ModuleHandle {
    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &ModuleName {
        &self.spec.name
    }

    /// Returns the deployed identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.spec.identity
    }

    /// Returns true if the module exposes `operation`.
    #[must_use]
    pub fn supports(&self, operation: &str) -> bool {
        self.spec.capabilities.contains(operation)
    }

    /// Returns the module's declared dependencies.
    #[must_use]
    pub fn depends_on(&self) -> &[ModuleName] {
        &self.spec.depends_on
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ModuleState {
        self.state
    }

    /// Returns the last-observed configuration.
    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Owns every module of a run, keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleName, ModuleHandle>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module in the `Deployed` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateModule`] if the name is already bound.
    pub fn register(&mut self, spec: ModuleSpec) -> Result<&ModuleHandle> {
        if self.modules.contains_key(&spec.name) {
            return Err(Error::DuplicateModule { name: spec.name });
        }
        let name = spec.name.clone();
        let handle = ModuleHandle {
            spec,
            state: ModuleState::Deployed,
            snapshot: Snapshot::new(),
        };
        Ok(self.modules.entry(name).or_insert(handle))
    }

    /// Registers a module, or keeps the existing registration if it was
    /// registered before with the same identity.
    ///
    /// Keeping the registration preserves its lifecycle state and snapshot
    /// across runs; capabilities and dependencies are refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateModule`] if the name is bound to a
    /// different identity.
    pub fn register_or_refresh(&mut self, spec: ModuleSpec) -> Result<()> {
        match self.modules.get_mut(&spec.name) {
            Some(existing) if existing.spec.identity == spec.identity => {
                existing.spec = spec;
                Ok(())
            }
            Some(_) => Err(Error::DuplicateModule { name: spec.name }),
            None => self.register(spec).map(|_| ()),
        }
    }

    /// Resolves a module by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the name is not registered.
    pub fn resolve(&self, name: &ModuleName) -> Result<&ModuleHandle> {
        self.modules
            .get(name)
            .ok_or_else(|| Error::UnknownModule { name: name.clone() })
    }

    /// Resolves a module's identity by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the name is not registered.
    pub fn identity_of(&self, name: &ModuleName) -> Result<Identity> {
        self.resolve(name).map(|handle| handle.identity().clone())
    }

    /// Returns the last-observed configuration of a module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the name is not registered.
    pub fn snapshot(&self, name: &ModuleName) -> Result<&Snapshot> {
        self.resolve(name).map(ModuleHandle::snapshot)
    }

    /// Returns a module's lifecycle state, `Unregistered` for unknown names.
    #[must_use]
    pub fn state(&self, name: &ModuleName) -> ModuleState {
        self.modules
            .get(name)
            .map_or(ModuleState::Unregistered, ModuleHandle::state)
    }

    /// Records an observed slot value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the name is not registered.
    pub fn observe(&mut self, name: &ModuleName, slot: &str, value: ParamValue) -> Result<()> {
        let handle = self.handle_mut(name)?;
        handle.snapshot.insert(slot.to_string(), value);
        Ok(())
    }

    /// Forgets an observed slot value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if the name is not registered.
    pub fn forget(&mut self, name: &ModuleName, slot: &str) -> Result<()> {
        let handle = self.handle_mut(name)?;
        handle.snapshot.remove(slot);
        Ok(())
    }

    /// Moves a module to a new lifecycle state. Same-state moves are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] or [`Error::InvalidStateTransition`].
    pub fn transition(&mut self, name: &ModuleName, to: ModuleState) -> Result<()> {
        let handle = self.handle_mut(name)?;
        let from = handle.state;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                module: name.clone(),
                from,
                to,
            });
        }
        tracing::debug!(module = %name, %from, %to, "module lifecycle transition");
        handle.state = to;
        Ok(())
    }

    /// Iterates over registered modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleHandle> {
        self.modules.values()
    }

    /// Returns the number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn handle_mut(&mut self, name: &ModuleName) -> Result<&mut ModuleHandle> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| Error::UnknownModule { name: name.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve() -> Result<()> {
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleSpec::new("Treasury", "0xT").capabilities(["grantRole"]))?;

        let handle = registry.resolve(&ModuleName::new("Treasury"))?;
        assert_eq!(handle.identity().as_str(), "0xT");
        assert_eq!(handle.state(), ModuleState::Deployed);
        assert!(handle.supports("grantRole"));
        assert!(!handle.supports("mint"));
        Ok(())
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleSpec::new("Treasury", "0xT")).unwrap();
        let err = registry.register(ModuleSpec::new("Treasury", "0xT2")).unwrap_err();
        assert!(matches!(err, Error::DuplicateModule { .. }));
    }

    #[test]
    fn refresh_keeps_state_for_same_identity_only() {
        let mut registry = ModuleRegistry::new();
        let name = ModuleName::new("Treasury");
        registry.register(ModuleSpec::new("Treasury", "0xT")).unwrap();
        registry.transition(&name, ModuleState::Configuring).unwrap();

        registry.register_or_refresh(ModuleSpec::new("Treasury", "0xT")).unwrap();
        assert_eq!(registry.state(&name), ModuleState::Configuring);

        assert!(registry.register_or_refresh(ModuleSpec::new("Treasury", "0xOTHER")).is_err());
    }

    #[test]
    fn unknown_module_fails_to_resolve() {
        let registry = ModuleRegistry::new();
        let name = ModuleName::new("Ghost");
        assert!(matches!(registry.resolve(&name), Err(Error::UnknownModule { .. })));
        assert_eq!(registry.state(&name), ModuleState::Unregistered);
    }

    #[test]
    fn lifecycle_rejects_ready_to_failed_shortcut() {
        let mut registry = ModuleRegistry::new();
        let name = ModuleName::new("Staking");
        registry.register(ModuleSpec::new("Staking", "0xS")).unwrap();

        registry.transition(&name, ModuleState::Configuring).unwrap();
        registry.transition(&name, ModuleState::Ready).unwrap();
        let err = registry.transition(&name, ModuleState::Failed).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        registry.transition(&name, ModuleState::Configuring).unwrap();
        registry.transition(&name, ModuleState::Failed).unwrap();
        registry.transition(&name, ModuleState::Configuring).unwrap();
    }

    #[test]
    fn snapshot_records_observations() {
        let mut registry = ModuleRegistry::new();
        let name = ModuleName::new("Staking");
        registry.register(ModuleSpec::new("Staking", "0xS")).unwrap();
        registry
            .observe(&name, "distributor", ParamValue::Identity(Identity::new("0xD")))
            .unwrap();
        assert_eq!(
            registry.snapshot(&name).unwrap().get("distributor"),
            Some(&ParamValue::Identity(Identity::new("0xD")))
        );
        registry.forget(&name, "distributor").unwrap();
        assert!(registry.snapshot(&name).unwrap().is_empty());
    }
}
