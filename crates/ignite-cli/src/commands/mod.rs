//! CLI command implementations.

pub mod diff;
pub mod order;
pub mod run;
pub mod template;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use ignite_flow::plan::BootstrapPlan;

/// Loads a plan file, naming the file in the error.
pub(crate) fn load_plan(path: &Path) -> Result<BootstrapPlan> {
    BootstrapPlan::load(path).with_context(|| format!("Failed to load plan {}", path.display()))
}

/// Pretty-prints a JSON value to stdout.
pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
