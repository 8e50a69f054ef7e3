//! Validate command - compile a plan without contacting any module.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use super::{load_plan, print_json};
use crate::{Config, OutputFormat};

/// Arguments for the validate command.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Plan file (JSON).
    pub plan: PathBuf,
}

/// Execute the validate command.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded, does not compile, or any
/// parameter violates its rules.
pub fn execute(args: &ValidateArgs, config: &Config) -> Result<()> {
    let mut plan = load_plan(&args.plan)?;
    if let Some(operator) = &config.operator {
        plan.operator = operator.as_str().into();
    }
    let compiled = plan.compile().context("Plan is invalid")?;
    let inactive = plan.steps.iter().filter(|s| !s.active).count();
    let failures: Vec<String> = plan
        .parameters
        .validate_all()
        .iter()
        .map(ToString::to_string)
        .collect();

    match config.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "name": plan.name,
            "valid": failures.is_empty(),
            "fingerprint": compiled.fingerprint,
            "modules": compiled.modules.len(),
            "steps": compiled.steps.len(),
            "inactiveSteps": inactive,
            "parameterErrors": failures,
        }))?,
        OutputFormat::Text if failures.is_empty() => {
            println!("Plan '{}' is valid", plan.name);
            println!();
            println!("  Fingerprint: {}", compiled.fingerprint);
            println!("  Modules:     {}", compiled.modules.len());
            println!("  Steps:       {} ({inactive} inactive)", compiled.steps.len());
        }
        OutputFormat::Text => {
            println!("Plan '{}' has invalid parameters:", plan.name);
            for failure in &failures {
                println!("  - {failure}");
            }
        }
    }

    if !failures.is_empty() {
        bail!(
            "Plan is invalid: {} parameter(s) violate their rules",
            failures.len()
        );
    }
    Ok(())
}
