//! # ignite-flow
//!
//! Bootstrap orchestration for remote protocol modules.
//!
//! This crate turns a declarative bring-up plan into an ordered, idempotent,
//! resumable sequence of remote configuration calls:
//!
//! - **Dependency Graph**: Steps ordered by explicit and derived edges, with
//!   cycles rejected as they are introduced
//! - **Registries**: Modules resolved by name, role holders tracked per module
//! - **Validation**: Parameters checked before any call that consumes them
//! - **Idempotency**: A step whose effect is already visible is skipped
//! - **Checkpointing**: One durable record per executed step, so a halted run
//!   resumes where it stopped
//!
//! ## Core Concepts
//!
//! - **Module**: A deployed remote component exposing configuration
//!   operations
//! - **Step**: One operation on one module, with arguments, a required role
//!   and an idempotency key
//! - **Plan**: Modules, initial role holders, parameters and steps; compiled
//!   into a total order before anything runs
//!
//! ## Guarantees
//!
//! - **Deterministic**: The same plan always compiles to the same order and
//!   fingerprint
//! - **Idempotent**: Re-running a completed plan issues no side-effecting
//!   calls
//! - **Fail-fast**: The first terminal failure halts the run with the
//!   failing step and the checkpoint log
//!
//! ## Example
//!
//! ```rust
//! use ignite_core::RoleName;
//! use ignite_flow::error::Result;
//! use ignite_flow::module::ModuleSpec;
//! use ignite_flow::plan::BootstrapPlan;
//! use ignite_flow::step::{Arg, Step};
//!
//! # fn main() -> Result<()> {
//! let plan = BootstrapPlan::builder("treasury", "0xOPERATOR")
//!     .module(ModuleSpec::new("Treasury", "0xTREASURY").capabilities(["grantRole", "enableAssetClass"]))
//!     .role("Treasury", RoleName::owner(), "0xOPERATOR")
//!     .step(
//!         Step::new("grant-vault", "Treasury", "grantRole")
//!             .arg(Arg::text("vault"))
//!             .arg(Arg::identity("0xA"))
//!             .role(RoleName::owner()),
//!     )
//!     .step(
//!         Step::new("enable-btch", "Treasury", "enableAssetClass")
//!             .arg(Arg::integer(8))
//!             .arg(Arg::identity("0xX"))
//!             .role(RoleName::owner())
//!             .after("grant-vault"),
//!     )
//!     .build();
//!
//! let compiled = plan.compile()?;
//! assert_eq!(compiled.order().len(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

// Internal modules - not exposed in public API.
pub(crate) mod dag;

pub mod checkpoint;
pub mod client;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod module;
pub mod operation;
pub mod params;
pub mod plan;
pub mod protocol;
pub mod retry;
pub mod roles;
pub mod step;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::checkpoint::{
        CheckpointLog, CheckpointRecord, CheckpointSink, JsonlCheckpointStore, Outcome,
    };
    pub use crate::client::memory::MemoryLedger;
    pub use crate::client::{CallError, ModuleClient, ResolvedCall};
    pub use crate::engine::{EngineConfig, OrchestrationEngine, RunOutcome, RunReport};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::executor::StepExecutor;
    pub use crate::graph::DependencyGraph;
    pub use crate::metrics::BootstrapMetrics;
    pub use crate::module::{ModuleRegistry, ModuleSpec, ModuleState};
    pub use crate::operation::Operation;
    pub use crate::params::{ParamValue, ParameterBundle, Rule};
    pub use crate::plan::{BootstrapPlan, CompiledPlan, PlanBuilder, PlanDiff};
    pub use crate::retry::RetryPolicy;
    pub use crate::roles::{RoleAssignment, RoleRegistry};
    pub use crate::step::{Arg, EffectSpec, Step, StepId};
}
