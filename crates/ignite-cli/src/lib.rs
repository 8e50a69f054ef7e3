//! # ignite-cli
//!
//! Command-line interface for bootstrap plans.
//!
//! ## Commands
//!
//! - `ignite validate` - Compile a plan and report its fingerprint
//! - `ignite order` - Print the execution order of a plan
//! - `ignite run` - Execute a plan against the sandbox ledger
//! - `ignite diff` - Compare two plan files
//! - `ignite template` - Write the standard protocol plan
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `IGNITE_OPERATOR` - Operator identity overriding the plan's
//! - `IGNITE_LEDGER` - Sandbox ledger file (default: `ignite-ledger.json`)
//! - `IGNITE_CHECKPOINT_LOG` - Checkpoint log (default: `ignite-checkpoints.jsonl`)
//! - `IGNITE_FORMAT` - Output format, `text` or `json`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ignite CLI - bootstrap orchestration for protocol modules.
#[derive(Debug, Parser)]
#[command(name = "ignite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operator identity. Overrides the plan's operator.
    #[arg(long, env = "IGNITE_OPERATOR")]
    pub operator: Option<String>,

    /// Sandbox ledger file.
    #[arg(long, env = "IGNITE_LEDGER", default_value = "ignite-ledger.json")]
    pub ledger: PathBuf,

    /// Checkpoint log file (JSON lines).
    #[arg(
        long,
        env = "IGNITE_CHECKPOINT_LOG",
        default_value = "ignite-checkpoints.jsonl"
    )]
    pub checkpoint_log: PathBuf,

    /// Output format.
    #[arg(long, env = "IGNITE_FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            operator: self.operator.clone(),
            ledger: self.ledger.clone(),
            checkpoint_log: self.checkpoint_log.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile a plan and report its fingerprint.
    Validate(commands::validate::ValidateArgs),
    /// Print the execution order of a plan.
    Order(commands::order::OrderArgs),
    /// Execute a plan against the sandbox ledger.
    Run(commands::run::RunArgs),
    /// Compare two plan files.
    Diff(commands::diff::DiffArgs),
    /// Write the standard protocol plan.
    Template(commands::template::TemplateArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Operator override.
    pub operator: Option<String>,
    /// Sandbox ledger file.
    pub ledger: PathBuf,
    /// Checkpoint log file.
    pub checkpoint_log: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}
