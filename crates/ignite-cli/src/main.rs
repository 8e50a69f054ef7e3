//! Ignite CLI - Command-line interface for bootstrap plans.
//!
//! The main entry point for the `ignite` CLI binary.

use anyhow::Result;
use clap::Parser;

use ignite_cli::{Cli, Commands};
use ignite_core::observability::{LogFormat, init_logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });
    let config = cli.config();

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Validate(args) => ignite_cli::commands::validate::execute(&args, &config),
            Commands::Order(args) => ignite_cli::commands::order::execute(&args, &config),
            Commands::Run(args) => ignite_cli::commands::run::execute(args, &config).await,
            Commands::Diff(args) => ignite_cli::commands::diff::execute(&args, &config),
            Commands::Template(args) => ignite_cli::commands::template::execute(&args, &config),
        }
    })
}
