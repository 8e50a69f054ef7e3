//! Shared test utilities for ignite integration tests.
//!
//! This crate provides:
//! - [`TestContext`]: An in-memory ledger with engine constructors
//! - Plan factories for the common scenarios
//! - Assertion helpers over run reports
//!
//! # Example
//!
//! ```rust,ignore
//! use ignite_test_utils::{TestContext, PlanFactory, assert_all_applied};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let plan = PlanFactory::treasury();
//!     let ctx = TestContext::deployed(&plan);
//!     let report = ctx.engine().run(&plan).await.unwrap();
//!     assert_all_applied(&report);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ignite_flow=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
