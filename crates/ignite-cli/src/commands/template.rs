//! Template command - write the standard protocol bring-up plan.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ignite_flow::protocol::{ProtocolConfig, standard_plan};

use crate::Config;

/// Arguments for the template command.
#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// Genesis timestamp (unix seconds) of the protocol.
    #[arg(long)]
    pub genesis: i64,

    /// Governance identity receiving ownership at the end of the plan.
    #[arg(long)]
    pub governance: Option<String>,

    /// Output file. Prints to stdout when omitted.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

/// Execute the template command.
///
/// # Errors
///
/// Returns an error if no operator is configured or the plan cannot be
/// written.
pub fn execute(args: &TemplateArgs, config: &Config) -> Result<()> {
    let operator = config
        .operator
        .as_ref()
        .context("Operator is required. Set IGNITE_OPERATOR or use --operator")?;

    let mut protocol = ProtocolConfig::sandbox(operator.as_str(), args.genesis);
    if let Some(governance) = &args.governance {
        protocol.governance = governance.as_str().into();
    }
    let plan = standard_plan(&protocol);

    match &args.out {
        Some(path) => {
            plan.save(path)
                .with_context(|| format!("Failed to write plan {}", path.display()))?;
            tracing::info!(path = %path.display(), steps = plan.steps.len(), "wrote standard plan");
        }
        None => println!("{}", plan.to_json().context("Failed to serialize plan")?),
    }
    Ok(())
}
