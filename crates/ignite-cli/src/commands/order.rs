//! Order command - print the compiled execution order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{load_plan, print_json};
use crate::{Config, OutputFormat};

/// Arguments for the order command.
#[derive(Debug, Args)]
pub struct OrderArgs {
    /// Plan file (JSON).
    pub plan: PathBuf,
}

/// Execute the order command.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded or does not compile.
pub fn execute(args: &OrderArgs, config: &Config) -> Result<()> {
    let mut plan = load_plan(&args.plan)?;
    if let Some(operator) = &config.operator {
        plan.operator = operator.as_str().into();
    }
    let compiled = plan.compile().context("Plan is invalid")?;

    match config.format {
        OutputFormat::Json => {
            let steps: Vec<serde_json::Value> = compiled
                .steps
                .iter()
                .map(|planned| {
                    serde_json::json!({
                        "stepId": planned.id().as_str(),
                        "module": planned.module().as_str(),
                        "operation": planned.operation.to_string(),
                        "caller": planned.caller.as_str(),
                        "idempotencyKey": planned.idempotency_key,
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "fingerprint": compiled.fingerprint,
                "steps": steps,
            }))?;
        }
        OutputFormat::Text => {
            let width = compiled.steps.len().to_string().len();
            for (position, planned) in compiled.steps.iter().enumerate() {
                println!(
                    "{:>width$}. {:<28} {}.{} (as {})",
                    position + 1,
                    planned.id().as_str(),
                    planned.module(),
                    planned.operation,
                    planned.caller,
                );
            }
        }
    }
    Ok(())
}
