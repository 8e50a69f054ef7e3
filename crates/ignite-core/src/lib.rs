//! # ignite-core
//!
//! Core primitives for the ignite protocol bootstrap orchestrator.
//!
//! This crate provides the foundational types shared by every ignite component:
//!
//! - **Identifiers**: Strongly-typed run identifiers
//! - **Names**: Remote identities, logical module names and role names
//! - **Error Types**: Shared error definitions and result types
//! - **Serialization Helpers**: Canonical JSON for deterministic fingerprints
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use ignite_core::prelude::*;
//!
//! let treasury = ModuleName::new("Treasury");
//! let vault = RoleName::vault();
//! let holder = Identity::new("0xA11CE");
//!
//! assert_eq!(treasury.as_str(), "Treasury");
//! assert_eq!(vault.as_str(), "vault");
//! assert_eq!(holder.to_string(), "0xA11CE");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod error;
pub mod id;
pub mod identity;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::RunId;
    pub use crate::identity::{Identity, ModuleName, RoleName};
}

pub use error::{Error, Result};
pub use id::RunId;
pub use identity::{Identity, ModuleName, RoleName};
pub use observability::{LogFormat, init_logging};
