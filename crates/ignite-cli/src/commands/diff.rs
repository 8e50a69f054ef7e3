//! Diff command - compare two plan files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{load_plan, print_json};
use crate::{Config, OutputFormat};

/// Arguments for the diff command.
#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Baseline plan file.
    pub old: PathBuf,
    /// Updated plan file.
    pub new: PathBuf,
}

/// Execute the diff command.
///
/// # Errors
///
/// Returns an error if either plan cannot be loaded or encoded.
pub fn execute(args: &DiffArgs, config: &Config) -> Result<()> {
    let old = load_plan(&args.old)?;
    let new = load_plan(&args.new)?;
    let diff = old.diff(&new).context("Failed to compare plans")?;

    match config.format {
        OutputFormat::Json => {
            print_json(&serde_json::to_value(&diff).context("Failed to serialize diff")?)?;
        }
        OutputFormat::Text => {
            if diff.is_empty() {
                println!("Plans are equivalent");
                return Ok(());
            }
            for step in &diff.added {
                println!("+ {step}");
            }
            for step in &diff.removed {
                println!("- {step}");
            }
            for step in &diff.changed {
                println!("~ {step}");
            }
            for key in &diff.parameters {
                println!("~ parameter {key}");
            }
            if diff.modules_changed {
                println!("~ modules or initial roles");
            }
        }
    }
    Ok(())
}
