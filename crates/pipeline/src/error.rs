//! Pipeline-specific error types.

use sluice_core::{ConnectionId, OperationId};
use thiserror::Error;

/// Errors that can occur during pipeline definition, validation, or graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Pipeline name must not be empty.
    #[error("pipeline name must not be empty")]
    EmptyName,

    /// Pipeline must have at least one operation.
    #[error("pipeline must have at least one operation")]
    NoOperations,

    /// Duplicate operation id found.
    #[error("duplicate operation id: {0}")]
    DuplicateOperationId(OperationId),

    /// Duplicate connection id found.
    #[error("duplicate connection id: {0}")]
    DuplicateConnectionId(ConnectionId),

    /// A connection endpoint references an operation that does not exist.
    #[error("connection {connection} references unknown operation: {operation}")]
    UnknownOperation {
        /// The dangling connection.
        connection: ConnectionId,
        /// The missing endpoint.
        operation: OperationId,
    },

    /// A connection has the same source and target operation.
    #[error("self-loop detected on operation: {0}")]
    SelfLoop(OperationId),

    /// The pipeline graph contains a cycle.
    #[error("cycle detected in pipeline graph")]
    CycleDetected,

    /// Generic graph construction error.
    #[error("graph error: {0}")]
    GraphError(String),
}
