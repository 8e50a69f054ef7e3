//! In-memory module ledger.
//!
//! A sandbox stand-in for a set of deployed modules: every module is a map
//! of state slots, a call writes its effect slot once the caller's role has
//! been checked, and faults can be scripted per operation. The ledger can be
//! saved to and loaded from a JSON file so the CLI can execute and resume a
//! plan locally.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ignite_core::{Identity, RoleName};

use super::{CallError, ModuleClient, ResolvedCall};
use crate::error::{Error, Result};
use crate::params::ParamValue;
use crate::plan::BootstrapPlan;

type Slots = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerState {
    modules: BTreeMap<Identity, Slots>,
}

#[derive(Debug, Clone)]
struct ScriptedFault {
    target: Identity,
    operation: String,
    error: CallError,
    remaining: u32,
}

/// One side-effecting call attempt seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Module identity.
    pub target: Identity,
    /// Operation name.
    pub operation: String,
    /// Caller identity.
    pub caller: Identity,
    /// Idempotency key of the step.
    pub idempotency_key: String,
    /// Whether the attempt changed state.
    pub succeeded: bool,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

fn role_slot(role: &RoleName) -> String {
    format!("role:{role}")
}

/// In-memory implementation of [`ModuleClient`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    faults: Mutex<Vec<ScriptedFault>>,
    calls: Mutex<Vec<CallRecord>>,
    queries: AtomicUsize,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys a module owned by `owner`. Existing modules are left as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn deploy(&self, target: Identity, owner: Identity) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.modules.entry(target).or_insert_with(|| {
            Slots::from([(role_slot(&RoleName::owner()), ParamValue::Identity(owner))])
        });
        Ok(())
    }

    /// Deploys every module of `plan` that is not deployed yet and assigns
    /// the plan's initial role holders on them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModule`] if an initial role names an
    /// undeclared module, or an error if the lock is poisoned.
    pub fn deploy_plan(&self, plan: &BootstrapPlan) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let mut fresh = Vec::new();
        for module in &plan.modules {
            if !state.modules.contains_key(&module.identity) {
                state.modules.insert(module.identity.clone(), Slots::new());
                fresh.push(module.name.clone());
            }
        }
        for assignment in &plan.roles {
            if !fresh.contains(&assignment.module) {
                continue;
            }
            let identity = plan.module_identity(&assignment.module)?;
            if let Some(slots) = state.modules.get_mut(&identity) {
                slots.insert(
                    role_slot(&assignment.role),
                    ParamValue::Identity(assignment.holder.clone()),
                );
            }
        }
        tracing::debug!(deployed = fresh.len(), "sandbox ledger deployed plan modules");
        Ok(())
    }

    /// Returns the value of a slot without counting a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn slot(&self, target: &Identity, slot: &str) -> Result<Option<ParamValue>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.modules.get(target).and_then(|slots| slots.get(slot)).cloned())
    }

    /// Overwrites a slot, deploying the module if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_slot(&self, target: &Identity, slot: &str, value: ParamValue) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .modules
            .entry(target.clone())
            .or_default()
            .insert(slot.to_string(), value);
        Ok(())
    }

    /// Removes a slot, as if the module's state had been reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear_slot(&self, target: &Identity, slot: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if let Some(slots) = state.modules.get_mut(target) {
            slots.remove(slot);
        }
        Ok(())
    }

    /// Makes the next `times` calls of `operation` on `target` fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_next(
        &self,
        target: &Identity,
        operation: &str,
        error: CallError,
        times: u32,
    ) -> Result<()> {
        let mut faults = self.faults.lock().map_err(poison_err)?;
        faults.push(ScriptedFault {
            target: target.clone(),
            operation: operation.to_string(),
            error,
            remaining: times,
        });
        Ok(())
    }

    /// Returns every side-effecting call attempt, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn calls(&self) -> Result<Vec<CallRecord>> {
        Ok(self.calls.lock().map_err(poison_err)?.clone())
    }

    /// Returns the number of side-effecting call attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn side_effect_calls(&self) -> Result<usize> {
        Ok(self.calls.lock().map_err(poison_err)?.len())
    }

    /// Returns the number of call attempts for one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn calls_to(&self, operation: &str) -> Result<usize> {
        let calls = self.calls.lock().map_err(poison_err)?;
        Ok(calls.iter().filter(|c| c.operation == operation).count())
    }

    /// Returns the number of slot reads.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Resets the call and query counters. State and faults are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn reset_counters(&self) -> Result<()> {
        self.calls.lock().map_err(poison_err)?.clear();
        self.queries.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Loads a ledger from a JSON file. A missing file yields an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Serialization`] if the file
    /// cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::storage_with_source(format!("failed to read ledger {}", path.display()), e)
        })?;
        let state: LedgerState = serde_json::from_str(&raw).map_err(|e| Error::Serialization {
            message: format!("failed to parse ledger {}: {e}", path.display()),
        })?;
        Ok(Self {
            state: RwLock::new(state),
            ..Self::default()
        })
    }

    /// Saves the ledger state (not faults or counters) to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Serialization`] on failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let state = self.state.read().map_err(poison_err)?;
            serde_json::to_string_pretty(&*state).map_err(|e| Error::Serialization {
                message: format!("failed to serialize ledger: {e}"),
            })?
        };
        std::fs::write(path, json).map_err(|e| {
            Error::storage_with_source(format!("failed to write ledger {}", path.display()), e)
        })
    }

    fn take_fault(&self, call: &ResolvedCall) -> Option<CallError> {
        let mut faults = self.faults.lock().ok()?;
        let fault = faults.iter_mut().find(|f| {
            f.remaining > 0 && f.target == call.target && f.operation == call.operation
        })?;
        fault.remaining -= 1;
        Some(fault.error.clone())
    }

    fn apply(&self, call: &ResolvedCall) -> std::result::Result<(), CallError> {
        let mut state = self.state.write().map_err(|_| CallError::Network {
            message: "ledger lock poisoned".into(),
        })?;
        let slots = state
            .modules
            .get_mut(&call.target)
            .ok_or_else(|| CallError::Revert {
                reason: format!("no module deployed at {}", call.target),
            })?;

        if let Some(role) = &call.required_role {
            let holder = slots.get(&role_slot(role)).and_then(ParamValue::as_identity);
            if holder != Some(&call.caller) {
                return Err(CallError::Unauthorized {
                    reason: format!("{} is not {role}", call.caller),
                });
            }
        }

        slots.insert(call.effect.slot.clone(), call.effect.value.clone());
        Ok(())
    }

    fn record(&self, call: &ResolvedCall, succeeded: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(CallRecord {
                target: call.target.clone(),
                operation: call.operation.clone(),
                caller: call.caller.clone(),
                idempotency_key: call.idempotency_key.clone(),
                succeeded,
            });
        }
    }
}

#[async_trait]
impl ModuleClient for MemoryLedger {
    async fn read_slot(
        &self,
        target: &Identity,
        slot: &str,
    ) -> std::result::Result<Option<ParamValue>, CallError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.slot(target, slot).map_err(|e| CallError::Network {
            message: e.to_string(),
        })
    }

    async fn call(&self, call: &ResolvedCall) -> std::result::Result<(), CallError> {
        if let Some(error) = self.take_fault(call) {
            tracing::debug!(operation = %call.operation, %error, "scripted fault");
            self.record(call, false);
            return Err(error);
        }
        let result = self.apply(call);
        self.record(call, result.is_ok());
        result
    }
}
