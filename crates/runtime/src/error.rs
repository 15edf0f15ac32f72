//! Runtime error types.

use sluice_core::{OperationId, OperationKind};
use sluice_pipeline::PipelineError;
use sluice_reporting::{EventType, ReportingError};

/// Errors from compiling a logical pipeline into its materialized graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaterializationError {
    /// The logical pipeline failed structural validation.
    #[error("invalid pipeline: {}", join(.0))]
    Invalid(Vec<PipelineError>),

    /// No handler is registered for an operation's kind.
    #[error("no handler registered for kind `{kind}` of operation {operation}")]
    UnknownOperationKind {
        /// The operation that could not be bound.
        operation: OperationId,
        /// Its kind.
        kind: OperationKind,
    },
}

fn join(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error returned by an [`OperationHandler`](crate::OperationHandler) run.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Permanent failure of the operation.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The operation observed cancellation and stopped.
    #[error("cancelled")]
    Cancelled,

    /// The operation emitted an event type it never declared.
    #[error("event type `{0}` is not published by this operation")]
    UndeclaredEvent(EventType),

    /// Publishing a payload failed.
    #[error(transparent)]
    Reporting(#[from] ReportingError),
}

impl OperationError {
    /// Create a fatal error.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the error stems from cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
