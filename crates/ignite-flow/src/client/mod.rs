//! Transport seam between the orchestrator and remote modules.
//!
//! The orchestrator never speaks a wire protocol itself. It reads state
//! slots and issues calls through a [`ModuleClient`]; RPC transports,
//! signing and fee handling live behind this trait.

pub mod memory;

use async_trait::async_trait;

use ignite_core::{Identity, ModuleName, RoleName};

use crate::error::Error;
use crate::operation::Effect;
use crate::params::ParamValue;

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The module could not be reached.
    #[error("network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// The module did not answer in time.
    #[error("timeout: {message}")]
    Timeout {
        /// Timeout description.
        message: String,
    },

    /// The module rejected the call.
    #[error("reverted: {reason}")]
    Revert {
        /// Module-provided reason.
        reason: String,
    },

    /// The module rejected the caller.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Module-provided reason.
        reason: String,
    },
}

impl CallError {
    /// Lifts the transport failure into an orchestration error for `call`.
    #[must_use]
    pub fn into_error(self, call: &ResolvedCall) -> Error {
        match self {
            Self::Network { message } => Error::Network {
                module: call.module.clone(),
                message,
            },
            Self::Timeout { message } => Error::RemoteTimeout {
                module: call.module.clone(),
                message,
            },
            Self::Revert { reason } => Error::RemoteRevert {
                module: call.module.clone(),
                operation: call.operation.clone(),
                reason,
            },
            Self::Unauthorized { reason } => Error::Unauthorized {
                module: call.module.clone(),
                role: call
                    .required_role
                    .clone()
                    .unwrap_or_else(|| RoleName::new("none")),
                caller: call.caller.clone(),
                detail: Some(reason),
            },
        }
    }
}

/// A fully resolved remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCall {
    /// Logical module name.
    pub module: ModuleName,
    /// Module identity the call is addressed to.
    pub target: Identity,
    /// Operation name.
    pub operation: String,
    /// Concrete argument values.
    pub args: Vec<ParamValue>,
    /// Identity issuing the call.
    pub caller: Identity,
    /// Role the module should check, if any.
    pub required_role: Option<RoleName>,
    /// Idempotency key of the originating step.
    pub idempotency_key: String,
    /// State change the call is expected to produce.
    pub effect: Effect,
}

/// Client for reading and configuring remote modules.
#[async_trait]
pub trait ModuleClient: Send + Sync {
    /// Reads a state slot on `target`. Side-effect free.
    async fn read_slot(
        &self,
        target: &Identity,
        slot: &str,
    ) -> Result<Option<ParamValue>, CallError>;

    /// Issues a side-effecting call.
    async fn call(&self, call: &ResolvedCall) -> Result<(), CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ResolvedCall {
        ResolvedCall {
            module: ModuleName::new("Staking"),
            target: Identity::new("0xS"),
            operation: "advanceRebase".into(),
            args: Vec::new(),
            caller: Identity::new("0xW"),
            required_role: Some(RoleName::worker()),
            idempotency_key: "rebase-1".into(),
            effect: Effect::receipt("rebase-1"),
        }
    }

    #[test]
    fn transient_transport_errors_stay_transient() {
        let err = CallError::Timeout {
            message: "30s".into(),
        }
        .into_error(&call());
        assert!(err.is_transient());
        assert!(matches!(err, Error::RemoteTimeout { .. }));
    }

    #[test]
    fn revert_keeps_module_reason() {
        let err = CallError::Revert {
            reason: "Staking: not yet".into(),
        }
        .into_error(&call());
        match err {
            Error::RemoteRevert { reason, operation, .. } => {
                assert_eq!(reason, "Staking: not yet");
                assert_eq!(operation, "advanceRebase");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn remote_unauthorized_names_required_role() {
        let err = CallError::Unauthorized {
            reason: "caller is not worker".into(),
        }
        .into_error(&call());
        assert!(matches!(
            err,
            Error::Unauthorized { ref role, .. } if role == &RoleName::worker()
        ));
        assert!(!err.is_transient());
    }
}
