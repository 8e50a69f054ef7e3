//! Run command - execute a plan against the sandbox ledger.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;

use ignite_core::Identity;
use ignite_flow::checkpoint::{CheckpointSink, JsonlCheckpointStore, Outcome};
use ignite_flow::client::ModuleClient;
use ignite_flow::client::memory::MemoryLedger;
use ignite_flow::engine::{EngineConfig, OrchestrationEngine, RunOutcome, RunReport};
use ignite_flow::retry::RetryPolicy;

use super::{load_plan, print_json};
use crate::{Config, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Plan file (JSON).
    pub plan: PathBuf,

    /// Continue from the records already in the checkpoint log.
    #[arg(long)]
    pub resume: bool,

    /// Attempts per remote request before a transient failure halts the run.
    #[arg(long, default_value = "5")]
    pub max_attempts: u32,

    /// Let the cached module snapshot stand in for idempotency reads.
    #[arg(long)]
    pub trust_snapshot: bool,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the plan is rejected, the ledger or checkpoint log
/// cannot be read or written, or the run halts.
pub async fn execute(args: RunArgs, config: &Config) -> Result<()> {
    let plan = load_plan(&args.plan)?;

    let store = JsonlCheckpointStore::new(&config.checkpoint_log);
    let history = store.records().context("Failed to read checkpoint log")?;
    if !history.is_empty() && !args.resume {
        bail!(
            "Checkpoint log {} already holds {} records. Pass --resume to continue from it",
            config.checkpoint_log.display(),
            history.len()
        );
    }

    let ledger = Arc::new(
        MemoryLedger::load(&config.ledger)
            .with_context(|| format!("Failed to load ledger {}", config.ledger.display()))?,
    );
    ledger
        .deploy_plan(&plan)
        .context("Failed to deploy plan modules")?;

    let engine_config = EngineConfig {
        operator: config.operator.as_deref().map(Identity::new),
        retry: RetryPolicy::default().with_max_attempts(args.max_attempts),
        trust_snapshot: args.trust_snapshot,
    };
    let client: Arc<dyn ModuleClient> = ledger.clone();
    let mut engine =
        OrchestrationEngine::new(client, Box::new(store)).with_config(engine_config);

    let result = engine.run(&plan).await;
    ledger
        .save(&config.ledger)
        .with_context(|| format!("Failed to save ledger {}", config.ledger.display()))?;
    let report = result.context("Plan rejected")?;

    print_report(&report, &config.format)?;
    if let Some(step) = report.failed_step() {
        bail!("Run halted at step {step}. Fix the cause and rerun with --resume");
    }
    Ok(())
}

fn print_report(report: &RunReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&serde_json::to_value(report).context("Failed to serialize report")?)?;
        }
        OutputFormat::Text => {
            println!("Run {} {}", report.run_id, report.outcome.as_label());
            println!();
            println!("  Fingerprint: {}", report.plan_fingerprint);
            println!("  Applied:     {}", report.count(Outcome::Applied));
            println!(
                "  Skipped:     {}",
                report.count(Outcome::SkippedAlreadyApplied)
            );
            match &report.outcome {
                RunOutcome::Completed => {}
                RunOutcome::Halted { step_id, error } => {
                    println!("  Failed:      {step_id} ({}): {}", error.kind, error.message);
                }
                RunOutcome::Cancelled { next_step } => {
                    println!("  Next step:   {next_step}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignite_flow::plan::BootstrapPlan;
    use ignite_flow::protocol::{ProtocolConfig, standard_plan};

    fn sandbox(dir: &std::path::Path) -> (PathBuf, Config) {
        let plan_path = dir.join("plan.json");
        standard_plan(&ProtocolConfig::sandbox("0xOPERATOR", 1_700_000_000))
            .save(&plan_path)
            .unwrap();
        let config = Config {
            operator: None,
            ledger: dir.join("ledger.json"),
            checkpoint_log: dir.join("checkpoints.jsonl"),
            format: OutputFormat::Json,
        };
        (plan_path, config)
    }

    fn args(plan: &std::path::Path, resume: bool) -> RunArgs {
        RunArgs {
            plan: plan.to_path_buf(),
            resume,
            max_attempts: 1,
            trust_snapshot: false,
        }
    }

    #[tokio::test]
    async fn run_then_resume_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (plan_path, config) = sandbox(dir.path());

        execute(args(&plan_path, false), &config).await.unwrap();
        let first = JsonlCheckpointStore::new(&config.checkpoint_log)
            .records()
            .unwrap();
        assert!(!first.is_empty());
        assert!(first.iter().all(|r| r.outcome == Outcome::Applied));
        assert!(config.ledger.exists());

        execute(args(&plan_path, true), &config).await.unwrap();
        let all = JsonlCheckpointStore::new(&config.checkpoint_log)
            .records()
            .unwrap();
        assert_eq!(all.len(), first.len() * 2);
        assert!(
            all[first.len()..]
                .iter()
                .all(|r| r.outcome == Outcome::SkippedAlreadyApplied)
        );
    }

    #[tokio::test]
    async fn existing_log_requires_resume() {
        let dir = tempfile::tempdir().unwrap();
        let (plan_path, config) = sandbox(dir.path());

        execute(args(&plan_path, false), &config).await.unwrap();
        let err = execute(args(&plan_path, false), &config).await.unwrap_err();
        assert!(err.to_string().contains("--resume"));
    }

    #[tokio::test]
    async fn invalid_plan_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (plan_path, config) = sandbox(dir.path());
        let mut plan = BootstrapPlan::load(&plan_path).unwrap();
        let first = plan.steps[0].id.clone();
        let dep = plan.steps[1].id.clone();
        plan.steps[0].depends_on.push(dep);
        plan.steps[1].depends_on.push(first);
        plan.save(&plan_path).unwrap();

        let err = execute(args(&plan_path, false), &config).await.unwrap_err();
        assert!(err.to_string().contains("Plan rejected"));
        assert!(
            JsonlCheckpointStore::new(&config.checkpoint_log)
                .records()
                .unwrap()
                .is_empty()
        );
    }
}
