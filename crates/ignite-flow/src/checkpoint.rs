//! Append-only checkpoint log.
//!
//! One record per executed step per run. The log is the source of truth for
//! re-runs: combined with a fresh remote query it tells the executor whether
//! a step's effect is expected to be visible, so that a lost effect is
//! reported as drift instead of being silently applied a second time.
//!
//! Two sinks are provided: [`CheckpointLog`] keeps records in memory, and
//! [`JsonlCheckpointStore`] appends one JSON document per line to a file.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ignite_core::{Identity, ModuleName, RunId};

use crate::error::{Error, ErrorKind, Result};
use crate::step::StepId;

/// Outcome of one step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The call was issued and succeeded.
    Applied,
    /// The effect was already observed remotely; no call was issued.
    SkippedAlreadyApplied,
    /// The step failed and halted the run.
    Failed,
}

impl Outcome {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::SkippedAlreadyApplied => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Returns true for outcomes that let the run continue.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Applied | Self::SkippedAlreadyApplied)
    }
}

/// Error summary stored with a failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// One entry of the checkpoint log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    /// Run that produced the record.
    pub run_id: RunId,
    /// Executed step.
    pub step_id: StepId,
    /// Target module name.
    pub module: ModuleName,
    /// Target module identity; a redeployed module starts a fresh history.
    pub target: Identity,
    /// Idempotency key of the step.
    pub idempotency_key: String,
    /// Outcome.
    pub outcome: Outcome,
    /// Remote call attempts made (0 when skipped before calling).
    pub attempts: u32,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
    /// Failure detail for `Failed` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Destination for checkpoint records.
///
/// Synchronous on purpose: records are small and each one must be durable
/// before the next step starts.
pub trait CheckpointSink: Send {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn append(&mut self, record: &CheckpointRecord) -> Result<()>;

    /// Returns every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn records(&self) -> Result<Vec<CheckpointRecord>>;
}

/// Returns the `(target, idempotency key)` pairs recorded as applied.
#[must_use]
pub fn applied_keys(records: &[CheckpointRecord]) -> HashSet<(Identity, String)> {
    records
        .iter()
        .filter(|r| r.outcome == Outcome::Applied)
        .map(|r| (r.target.clone(), r.idempotency_key.clone()))
        .collect()
}

/// In-memory checkpoint log.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLog {
    records: Vec<CheckpointRecord>,
}

impl CheckpointLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[CheckpointRecord] {
        &self.records
    }
}

impl CheckpointSink for CheckpointLog {
    fn append(&mut self, record: &CheckpointRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<CheckpointRecord>> {
        Ok(self.records.clone())
    }
}

/// File-backed checkpoint log, one JSON record per line.
#[derive(Debug, Clone)]
pub struct JsonlCheckpointStore {
    path: PathBuf,
}

impl JsonlCheckpointStore {
    /// Opens (or lazily creates) a log at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointSink for JsonlCheckpointStore {
    #[tracing::instrument(
        skip(self, record),
        fields(path = %self.path.display(), step_id = %record.step_id, outcome = record.outcome.as_label())
    )]
    fn append(&mut self, record: &CheckpointRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(|e| Error::Serialization {
            message: format!("failed to serialize checkpoint record: {e}"),
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                Error::storage_with_source(
                    format!("failed to open checkpoint log {}", self.path.display()),
                    e,
                )
            })?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| {
                Error::storage_with_source(
                    format!("failed to append to checkpoint log {}", self.path.display()),
                    e,
                )
            })
    }

    fn records(&self) -> Result<Vec<CheckpointRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::storage_with_source(
                    format!("failed to open checkpoint log {}", self.path.display()),
                    e,
                ));
            }
        };

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                Error::storage_with_source(
                    format!("failed to read checkpoint log {}", self.path.display()),
                    e,
                )
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| Error::Serialization {
                message: format!(
                    "invalid checkpoint record at {}:{}: {e}",
                    self.path.display(),
                    line_no + 1
                ),
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: &str, outcome: Outcome) -> CheckpointRecord {
        CheckpointRecord {
            run_id: RunId::generate(),
            step_id: StepId::from(step),
            module: ModuleName::new("Treasury"),
            target: Identity::new("0xT"),
            idempotency_key: format!("{step}-key"),
            outcome,
            attempts: 1,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn memory_log_preserves_order() -> Result<()> {
        let mut log = CheckpointLog::new();
        log.append(&record("a", Outcome::Applied))?;
        log.append(&record("b", Outcome::SkippedAlreadyApplied))?;
        let steps: Vec<String> = log.records()?.iter().map(|r| r.step_id.to_string()).collect();
        assert_eq!(steps, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn jsonl_store_appends_across_instances() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::storage(e.to_string()))?;
        let path = dir.path().join("checkpoints.jsonl");

        let mut store = JsonlCheckpointStore::new(&path);
        assert!(store.records()?.is_empty());
        store.append(&record("a", Outcome::Applied))?;

        let mut failed = record("b", Outcome::Failed);
        failed.error = Some(ErrorDetail {
            kind: ErrorKind::RemoteRevert,
            message: "Treasury.enableAssetClass reverted: paused".into(),
        });
        JsonlCheckpointStore::new(&path).append(&failed)?;

        let records = JsonlCheckpointStore::new(&path).records()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].error.as_ref().map(|e| e.kind), Some(ErrorKind::RemoteRevert));

        let raw = std::fs::read_to_string(&path).map_err(|e| Error::storage(e.to_string()))?;
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"outcome\":\"applied\""));
        Ok(())
    }

    #[test]
    fn corrupt_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = JsonlCheckpointStore::new(&path).records().unwrap_err();
        assert!(err.to_string().contains("bad.jsonl:1"));
    }

    #[test]
    fn applied_keys_ignore_skips_and_failures() {
        let records = vec![
            record("a", Outcome::Applied),
            record("b", Outcome::SkippedAlreadyApplied),
            record("c", Outcome::Failed),
        ];
        let keys = applied_keys(&records);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&(Identity::new("0xT"), "a-key".to_string())));
    }
}
