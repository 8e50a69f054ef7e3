//! Custom assertion helpers for integration tests.

use ignite_flow::checkpoint::Outcome;
use ignite_flow::client::memory::MemoryLedger;
use ignite_flow::engine::{RunOutcome, RunReport};
use ignite_flow::error::ErrorKind;

/// Asserts that a run completed with every step applied.
///
/// # Panics
///
/// Panics if the run did not complete or any step was skipped.
pub fn assert_all_applied(report: &RunReport) {
    assert!(
        report.is_completed(),
        "Expected run to complete, but outcome was {:?}",
        report.outcome
    );
    for record in &report.records {
        assert_eq!(
            record.outcome,
            Outcome::Applied,
            "Expected step {} to be applied",
            record.step_id
        );
    }
}

/// Asserts that a run completed with every step skipped.
///
/// # Panics
///
/// Panics if the run did not complete or any step was applied.
pub fn assert_all_skipped(report: &RunReport) {
    assert!(
        report.is_completed(),
        "Expected run to complete, but outcome was {:?}",
        report.outcome
    );
    for record in &report.records {
        assert_eq!(
            record.outcome,
            Outcome::SkippedAlreadyApplied,
            "Expected step {} to be skipped",
            record.step_id
        );
    }
}

/// Asserts that a run halted at `step` with an error of `kind`.
///
/// # Panics
///
/// Panics if the run did not halt there.
pub fn assert_halted_at(report: &RunReport, step: &str, kind: ErrorKind) {
    match &report.outcome {
        RunOutcome::Halted { step_id, error } => {
            assert_eq!(step_id.as_str(), step, "halted at the wrong step");
            assert_eq!(error.kind, kind, "unexpected error: {}", error.message);
        }
        other => panic!("Expected run to halt at {step}, but outcome was {other:?}"),
    }
    let last = report.records.last().expect("halted run has records");
    assert_eq!(last.outcome, Outcome::Failed);
    assert_eq!(last.step_id.as_str(), step);
}

/// Asserts that records appear in exactly this step order.
///
/// # Panics
///
/// Panics if the executed order differs.
pub fn assert_executed_order(report: &RunReport, expected: &[&str]) {
    let actual: Vec<&str> = report.records.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(actual, expected, "unexpected execution order");
}

/// Asserts that the ledger saw no side-effecting call.
///
/// # Panics
///
/// Panics if any call was attempted.
pub fn assert_no_side_effects(ledger: &MemoryLedger) {
    let calls = ledger.calls().expect("ledger calls");
    assert!(calls.is_empty(), "Expected no side-effecting calls, got {calls:?}");
}
