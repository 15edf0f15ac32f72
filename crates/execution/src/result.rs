//! Execution result types.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::{ExecutionId, OperationId};
use sluice_reporting::{OperationState, RowCount};

use crate::error::ExecutionError;
use crate::status::ExecutionStatus;

/// How a single operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Final lifecycle state.
    pub state: OperationState,
    /// Rows reported by the handler.
    pub rows: RowCount,
    /// Failure reason, for failed operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    /// Not started yet.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_state(OperationState::Pending)
    }

    /// Handed to its handler.
    #[must_use]
    pub fn running() -> Self {
        Self::with_state(OperationState::Running)
    }

    /// Finished with `rows`.
    #[must_use]
    pub fn finished(rows: RowCount) -> Self {
        Self {
            state: OperationState::Finished,
            rows,
            error: None,
        }
    }

    /// Failed with `error`.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: OperationState::Failed,
            rows: RowCount::default(),
            error: Some(error.into()),
        }
    }

    /// Stopped before finishing.
    #[must_use]
    pub fn stopped() -> Self {
        Self::with_state(OperationState::Stopped)
    }

    fn with_state(state: OperationState) -> Self {
        Self {
            state,
            rows: RowCount::default(),
            error: None,
        }
    }
}

/// The final result of a pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The execution this result belongs to.
    pub execution_id: ExecutionId,
    /// Final execution status.
    pub status: ExecutionStatus,
    /// The operation whose failure ended the execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_operation: Option<OperationId>,
    /// Per-operation outcomes.
    pub operations: HashMap<OperationId, OperationOutcome>,
    /// When the engine started.
    pub started_at: DateTime<Utc>,
    /// When the engine finished.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Whether the execution completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the execution failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Wall-clock duration of the execution.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }

    /// A specific operation's outcome.
    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&OperationOutcome> {
        self.operations.get(&id)
    }

    /// Turn anything but a completed execution into an error.
    pub fn ensure_success(self) -> Result<Self, ExecutionError> {
        match self.status {
            ExecutionStatus::Completed => Ok(self),
            ExecutionStatus::Cancelled => Err(ExecutionError::Cancelled),
            ExecutionStatus::TimedOut => Err(ExecutionError::TimedOut),
            ExecutionStatus::Failed => match self.failed_operation {
                Some(id) => Err(ExecutionError::Operation {
                    operation: id,
                    reason: self
                        .operations
                        .get(&id)
                        .and_then(|outcome| outcome.error.clone())
                        .unwrap_or_default(),
                }),
                None => Err(ExecutionError::Engine("execution failed".into())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(status: ExecutionStatus, operations: HashMap<OperationId, OperationOutcome>) -> ExecutionResult {
        let now = Utc::now();
        ExecutionResult {
            execution_id: ExecutionId::v4(),
            status,
            failed_operation: None,
            operations,
            started_at: now,
            finished_at: now + TimeDelta::milliseconds(100),
        }
    }

    #[test]
    fn success_result() {
        let r = result(ExecutionStatus::Completed, HashMap::new());
        assert!(r.is_success());
        assert!(!r.is_failure());
        assert_eq!(r.duration(), TimeDelta::milliseconds(100));
        assert!(r.ensure_success().is_ok());
    }

    #[test]
    fn failed_result_names_the_operation() {
        let id = OperationId::v4();
        let mut ops = HashMap::new();
        ops.insert(id, OperationOutcome::failed("fatal: disk full"));
        ops.insert(OperationId::v4(), OperationOutcome::stopped());

        let mut r = result(ExecutionStatus::Failed, ops);
        r.failed_operation = Some(id);
        assert!(r.is_failure());
        match r.ensure_success().unwrap_err() {
            ExecutionError::Operation { operation, reason } => {
                assert_eq!(operation, id);
                assert_eq!(reason, "fatal: disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn recorded_failure_wins_over_later_ones() {
        let first = OperationId::v4();
        let ops: HashMap<_, _> = (0..16)
            .map(|i| (OperationId::v4(), OperationOutcome::failed(format!("late {i}"))))
            .chain([(first, OperationOutcome::failed("first"))])
            .collect();

        let mut r = result(ExecutionStatus::Failed, ops);
        r.failed_operation = Some(first);
        match r.ensure_success().unwrap_err() {
            ExecutionError::Operation { operation, reason } => {
                assert_eq!(operation, first);
                assert_eq!(reason, "first");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failure_without_recorded_operation_is_an_engine_error() {
        let mut ops = HashMap::new();
        ops.insert(OperationId::v4(), OperationOutcome::failed("boom"));
        assert!(matches!(
            result(ExecutionStatus::Failed, ops).ensure_success(),
            Err(ExecutionError::Engine(_))
        ));
    }

    #[test]
    fn cancelled_and_timed_out_map_to_errors() {
        assert!(matches!(
            result(ExecutionStatus::Cancelled, HashMap::new()).ensure_success(),
            Err(ExecutionError::Cancelled)
        ));
        assert!(matches!(
            result(ExecutionStatus::TimedOut, HashMap::new()).ensure_success(),
            Err(ExecutionError::TimedOut)
        ));
    }

    #[test]
    fn outcome_constructors() {
        let rows = RowCount {
            read: 3,
            written: 2,
            rejected: 1,
        };
        let done = OperationOutcome::finished(rows);
        assert_eq!(done.state, OperationState::Finished);
        assert_eq!(done.rows, rows);
        assert_eq!(OperationOutcome::pending().state, OperationState::Pending);
        assert_eq!(OperationOutcome::running().state, OperationState::Running);
        assert!(OperationOutcome::failed("x").error.is_some());
    }
}
