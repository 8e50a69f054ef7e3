//! Error types for bootstrap orchestration.
//!
//! Errors fall into three families:
//!
//! - **Plan errors** (`Cycle`, `MissingDependency`, `DuplicateStep`, ...):
//!   the plan is malformed. Raised while compiling, before any remote call.
//! - **Step errors** (`UnknownModule`, `Unauthorized`, `Validation`,
//!   `RemoteRevert`, ...): raised while executing one step. All of them halt
//!   the run; only [`Error::is_transient`] failures are retried first.
//! - **Infrastructure errors** (`Storage`, `Serialization`): the checkpoint
//!   log or a plan file could not be read or written.

use serde::{Deserialize, Serialize};

use ignite_core::{Identity, ModuleName, RoleName};

use crate::module::ModuleState;
use crate::step::StepId;

/// The result type used throughout ignite-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling or running a bootstrap plan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Adding an edge would close a cycle in the dependency graph.
    #[error("cycle detected in dependency graph: {}", cycle.join(" -> "))]
    Cycle {
        /// The offending path, first node repeated at the end.
        cycle: Vec<String>,
    },

    /// A step depends on a step that is not part of the plan, or a
    /// prerequisite (such as a role grant) is not ordered before it.
    #[error("step {step} is missing dependency {dependency}")]
    MissingDependency {
        /// The dependent step.
        step: StepId,
        /// The missing or mis-ordered prerequisite.
        dependency: String,
    },

    /// Two steps share the same identifier.
    #[error("duplicate step id: {step}")]
    DuplicateStep {
        /// The duplicated identifier.
        step: StepId,
    },

    /// Two steps on one module share the same idempotency key.
    #[error("duplicate idempotency key '{key}' on module {module} (steps {first} and {second})")]
    DuplicateIdempotencyKey {
        /// Target module.
        module: ModuleName,
        /// The shared key.
        key: String,
        /// First step declaring the key.
        first: StepId,
        /// Second step declaring the key.
        second: StepId,
    },

    /// A module name is already bound in the registry.
    #[error("module already registered: {name}")]
    DuplicateModule {
        /// The duplicated module name.
        name: ModuleName,
    },

    /// A plan or step references a module that is not registered.
    #[error("unknown module: {name}")]
    UnknownModule {
        /// The unresolved module name.
        name: ModuleName,
    },

    /// A step names an operation its module does not expose, or an
    /// operation without a known effect.
    #[error("module {module} does not support operation '{operation}': {reason}")]
    UnknownOperation {
        /// Target module.
        module: ModuleName,
        /// Requested operation.
        operation: String,
        /// Why the operation cannot be used.
        reason: String,
    },

    /// The caller does not hold the role required for an operation.
    #[error("{caller} is not authorized as {role} on {module}{}", detail_suffix(.detail.as_deref()))]
    Unauthorized {
        /// Target module.
        module: ModuleName,
        /// Required role.
        role: RoleName,
        /// Identity that attempted the call.
        caller: Identity,
        /// Reason reported by the remote module, if it rejected the call.
        detail: Option<String>,
    },

    /// An ownership transfer named a `from` identity that does not hold the role.
    #[error("{claimed} is not the current {role} of {module} (holder: {})", actual.as_ref().map_or("none", Identity::as_str))]
    NotCurrentHolder {
        /// Target module.
        module: ModuleName,
        /// Role being transferred.
        role: RoleName,
        /// Identity that claimed to hold the role.
        claimed: Identity,
        /// Identity actually recorded, if any.
        actual: Option<Identity>,
    },

    /// An argument or parameter value is out of contract.
    #[error("validation failed for {subject}: {message}")]
    Validation {
        /// Parameter key, step id or argument position that failed.
        subject: String,
        /// Description of the violated rule.
        message: String,
    },

    /// The transport could not reach the module.
    #[error("network error calling {module}: {message}")]
    Network {
        /// Target module.
        module: ModuleName,
        /// Transport error description.
        message: String,
    },

    /// The module did not answer in time.
    #[error("remote call to {module} timed out: {message}")]
    RemoteTimeout {
        /// Target module.
        module: ModuleName,
        /// Timeout description.
        message: String,
    },

    /// The module rejected the call. The reason is the module's own.
    #[error("{module}.{operation} reverted: {reason}")]
    RemoteRevert {
        /// Target module.
        module: ModuleName,
        /// Operation that reverted.
        operation: String,
        /// Revert reason reported by the module, verbatim.
        reason: String,
    },

    /// Remote state no longer matches an effect this plan already applied.
    #[error("step {step} was applied before but {module} no longer reflects it (key '{key}')")]
    StateDrift {
        /// Step whose effect drifted.
        step: StepId,
        /// Target module.
        module: ModuleName,
        /// Idempotency key of the earlier application.
        key: String,
    },

    /// A module lifecycle transition is not allowed.
    #[error("invalid lifecycle transition for {module}: {from} -> {to}")]
    InvalidStateTransition {
        /// Target module.
        module: ModuleName,
        /// Current state.
        from: ModuleState,
        /// Attempted state.
        to: ModuleState,
    },

    /// Reading or writing a checkpoint log or plan file failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from ignite-core.
    #[error("core error: {0}")]
    Core(#[from] ignite_core::Error),
}

fn detail_suffix(detail: Option<&str>) -> String {
    detail.map_or_else(String::new, |d| format!(" ({d})"))
}

/// Stable classification of an [`Error`], recorded in checkpoint logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Dependency cycle.
    Cycle,
    /// Missing or mis-ordered prerequisite.
    MissingDependency,
    /// Malformed plan (duplicates, unknown operations).
    InvalidPlan,
    /// Unregistered module.
    UnknownModule,
    /// Caller lacks the required role.
    Unauthorized,
    /// Argument or parameter out of contract.
    Validation,
    /// Transport failure.
    Network,
    /// Remote timeout.
    RemoteTimeout,
    /// Module rejected the call.
    RemoteRevert,
    /// Remote state diverged from an applied effect.
    StateDrift,
    /// Local storage or serialization failure.
    Internal,
}

impl ErrorKind {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::MissingDependency => "missing_dependency",
            Self::InvalidPlan => "invalid_plan",
            Self::UnknownModule => "unknown_module",
            Self::Unauthorized => "unauthorized",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::RemoteTimeout => "remote_timeout",
            Self::RemoteRevert => "remote_revert",
            Self::StateDrift => "state_drift",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

impl Error {
    /// Returns the stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::DuplicateStep { .. }
            | Self::DuplicateIdempotencyKey { .. }
            | Self::DuplicateModule { .. }
            | Self::UnknownOperation { .. }
            | Self::InvalidStateTransition { .. } => ErrorKind::InvalidPlan,
            Self::UnknownModule { .. } => ErrorKind::UnknownModule,
            Self::Unauthorized { .. } | Self::NotCurrentHolder { .. } => ErrorKind::Unauthorized,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Network { .. } => ErrorKind::Network,
            Self::RemoteTimeout { .. } => ErrorKind::RemoteTimeout,
            Self::RemoteRevert { .. } => ErrorKind::RemoteRevert,
            Self::StateDrift { .. } => ErrorKind::StateDrift,
            Self::Storage { .. } | Self::Serialization { .. } | Self::Core(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if the failure may clear up on its own and the current
    /// step may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::RemoteTimeout { .. })
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn cycle_error_display_shows_path() {
        let err = Error::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cycle detected in dependency graph: a -> b -> a");
        assert_eq!(err.kind(), ErrorKind::Cycle);
    }

    #[test]
    fn only_network_and_timeout_are_transient() {
        let network = Error::Network {
            module: ModuleName::new("Treasury"),
            message: "connection reset".into(),
        };
        let timeout = Error::RemoteTimeout {
            module: ModuleName::new("Treasury"),
            message: "after 30s".into(),
        };
        let revert = Error::RemoteRevert {
            module: ModuleName::new("Treasury"),
            operation: "enableAssetClass".into(),
            reason: "already enabled".into(),
        };
        assert!(network.is_transient());
        assert!(timeout.is_transient());
        assert!(!revert.is_transient());
        assert!(!Error::validation("rebaseRate", "out of range").is_transient());
    }

    #[test]
    fn revert_reason_is_surfaced_verbatim() {
        let err = Error::RemoteRevert {
            module: ModuleName::new("Staking"),
            operation: "advanceRebase".into(),
            reason: "Staking: epoch not ended".into(),
        };
        assert!(err.to_string().ends_with("Staking: epoch not ended"));
    }

    #[test]
    fn unauthorized_display_includes_remote_detail() {
        let err = Error::Unauthorized {
            module: ModuleName::new("Treasury"),
            role: RoleName::owner(),
            caller: Identity::new("0xBAD"),
            detail: Some("UNAUTHORIZED".into()),
        };
        assert_eq!(
            err.to_string(),
            "0xBAD is not authorized as owner on Treasury (UNAUTHORIZED)"
        );
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::storage_with_source("failed to read checkpoint log", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
