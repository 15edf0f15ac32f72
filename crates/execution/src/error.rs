//! Execution error types.

use sluice_core::OperationId;
use sluice_runtime::MaterializationError;
use thiserror::Error;

/// An [`ExecutionConfig`](crate::ExecutionConfig) no execution can run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Event channels need room for at least one event.
    #[error("event capacity must be greater than zero")]
    ZeroEventCapacity,

    /// At least one operation must be allowed to run.
    #[error("max parallel operations must be greater than zero")]
    ZeroParallelism,

    /// More parallel operations than a semaphore can hand out permits for.
    #[error("max parallel operations must not exceed {max}")]
    TooManyParallelOperations { max: usize },

    /// Larger than a broadcast channel can buffer.
    #[error("event capacity must not exceed {max}")]
    EventCapacityTooLarge { max: usize },
}

/// Errors from building or mutating an [`ExecutionContext`](crate::ExecutionContext).
#[derive(Debug, Error)]
pub enum ContextError {
    /// The pipeline could not be materialized.
    #[error("materialization failed: {0}")]
    Materialization(#[from] MaterializationError),

    /// The configuration is unusable.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// Parameters and environment are frozen once execution has started.
    #[error("execution already started")]
    ExecutionStarted,
}

/// Errors that can occur while executing a pipeline.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// `execute` was already called on this context.
    #[error("execution already started")]
    AlreadyStarted,

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// The execution exceeded its time limit.
    #[error("execution timed out")]
    TimedOut,

    /// An operation failed.
    #[error("operation {operation} failed: {reason}")]
    Operation {
        /// The failing operation.
        operation: OperationId,
        /// What went wrong.
        reason: String,
    },

    /// The engine could not run the execution.
    #[error("engine error: {0}")]
    Engine(String),

    /// The spawned engine task panicked or was aborted.
    #[error("engine task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_pipeline::PipelineError;

    #[test]
    fn operation_display() {
        let id = OperationId::v4();
        let err = ExecutionError::Operation {
            operation: id,
            reason: "fatal: bad row".into(),
        };
        assert_eq!(err.to_string(), format!("operation {id} failed: fatal: bad row"));
    }

    #[test]
    fn context_error_wraps_materialization() {
        let err = ContextError::from(MaterializationError::Invalid(vec![
            PipelineError::NoOperations,
        ]));
        assert!(err.to_string().starts_with("materialization failed: invalid pipeline"));
    }

    #[test]
    fn context_error_wraps_config() {
        let err = ContextError::from(ConfigError::ZeroParallelism);
        assert_eq!(
            err.to_string(),
            "invalid config: max parallel operations must be greater than zero"
        );
    }

    #[test]
    fn simple_variants_display() {
        assert_eq!(ExecutionError::AlreadyStarted.to_string(), "execution already started");
        assert_eq!(ExecutionError::Cancelled.to_string(), "execution cancelled");
        assert_eq!(ExecutionError::TimedOut.to_string(), "execution timed out");
        assert_eq!(
            ContextError::ExecutionStarted.to_string(),
            "execution already started"
        );
    }
}
