//! Step descriptors.
//!
//! A [`Step`] is pure data: one remote operation on one module, with its
//! arguments, required role, idempotency key and ordering constraints. Steps
//! are serialized into plan files, diffed between plan revisions and
//! replayed on every run.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ignite_core::canonical_json;
use ignite_core::{Identity, ModuleName, RoleName};

use crate::error::{Error, Result};
use crate::params::{ParamValue, ParameterBundle};

/// Unique identifier of a step within a plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Creates a new step id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One positional argument of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Arg {
    /// A value written directly into the plan.
    Literal(ParamValue),
    /// A reference into the plan's [`ParameterBundle`].
    Param(String),
    /// The identity of another registered module.
    Module(ModuleName),
}

impl Arg {
    /// Shorthand for an identity literal.
    #[must_use]
    pub fn identity(value: impl Into<String>) -> Self {
        Self::Literal(ParamValue::Identity(Identity::new(value)))
    }

    /// Shorthand for an integer literal.
    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self::Literal(ParamValue::Integer(value))
    }

    /// Shorthand for a text literal.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(ParamValue::Text(value.into()))
    }

    /// Shorthand for a parameter reference.
    #[must_use]
    pub fn param(key: impl Into<String>) -> Self {
        Self::Param(key.into())
    }

    /// Shorthand for a module reference.
    #[must_use]
    pub fn module(name: impl Into<String>) -> Self {
        Self::Module(ModuleName::new(name))
    }

    /// Resolves the argument to a concrete value.
    ///
    /// `lookup` maps module names to identities; it is the registry at
    /// execution time and the plan's module table at compile time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown parameter, or whatever
    /// `lookup` returns for an unknown module.
    pub fn resolve<F>(&self, params: &ParameterBundle, lookup: F) -> Result<ParamValue>
    where
        F: Fn(&ModuleName) -> Result<Identity>,
    {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Param(key) => params
                .get(key)
                .cloned()
                .ok_or_else(|| Error::validation(key.as_str(), "unknown parameter")),
            Self::Module(name) => lookup(name).map(ParamValue::Identity),
        }
    }
}

/// Declared remote effect of an operation outside the built-in catalogue.
///
/// The idempotency check compares the effect against the module's
/// observed state; a step whose effect is already visible is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EffectSpec {
    /// The call sets a named state slot to a value.
    Slot {
        /// Slot name on the target module.
        slot: String,
        /// Expected value after the call.
        value: Arg,
    },
    /// One-shot call; the module records a receipt under the idempotency key.
    Receipt,
}

fn default_active() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(value: &bool) -> bool {
    *value
}

/// One configuration operation on one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique id within the plan.
    pub id: StepId,
    /// Target module.
    pub module: ModuleName,
    /// Operation name.
    pub operation: String,
    /// Ordered arguments.
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Role the caller must hold on the target module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_role: Option<RoleName>,
    /// Identity issuing the call; defaults to the plan operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<Identity>,
    /// Explicit idempotency key; derived from operation and args when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Steps that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    /// Inactive steps stay in the plan file but never execute.
    #[serde(default = "default_active", skip_serializing_if = "is_true")]
    pub active: bool,
    /// Effect override; required for operations outside the catalogue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectSpec>,
}

impl Step {
    /// Creates an active step with no arguments.
    #[must_use]
    pub fn new(id: impl Into<String>, module: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            module: ModuleName::new(module),
            operation: operation.into(),
            args: Vec::new(),
            required_role: None,
            caller: None,
            idempotency_key: None,
            depends_on: Vec::new(),
            active: true,
            effect: None,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Sets the required role.
    #[must_use]
    pub fn role(mut self, role: RoleName) -> Self {
        self.required_role = Some(role);
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(Identity::new(caller));
        self
    }

    /// Sets an explicit idempotency key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Adds a dependency on another step.
    #[must_use]
    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(StepId::new(step));
        self
    }

    /// Declares the remote effect.
    #[must_use]
    pub fn effect(mut self, effect: EffectSpec) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Marks the step inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns the idempotency key, deriving one if none was declared.
    ///
    /// Derived keys have the form `{operation}#{digest}`, where the digest
    /// covers the canonical JSON of the argument list, so two steps with the
    /// same operation and arguments share a key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the arguments cannot be encoded.
    pub fn effective_key(&self) -> Result<String> {
        if let Some(key) = &self.idempotency_key {
            return Ok(key.clone());
        }
        let canonical =
            canonical_json::to_canonical_bytes(&self.args).map_err(|e| Error::Serialization {
                message: format!("failed to encode args of step {}: {e}", self.id),
            })?;
        let digest = Sha256::digest(&canonical);
        let short = digest.get(..8).unwrap_or(&digest[..]);
        Ok(format!("{}#{}", self.operation, hex::encode(short)))
    }
}
