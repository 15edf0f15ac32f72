//! Stable identity of nodes in the logical graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use sluice_core::{ConnectionId, OperationId, PipelineId};

/// A node of the logical graph: the pipeline itself, one of its operations,
/// or one of its connections.
///
/// Identity is the wrapped id, so two values compare equal exactly when they
/// name the same element. Used as a map key throughout the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LogicalElement {
    /// The pipeline as a whole.
    Pipeline(PipelineId),
    /// A single operation.
    Operation(OperationId),
    /// A connection between two operations.
    Connection(ConnectionId),
}

/// Discriminant of a [`LogicalElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// See [`LogicalElement::Pipeline`].
    Pipeline,
    /// See [`LogicalElement::Operation`].
    Operation,
    /// See [`LogicalElement::Connection`].
    Connection,
}

impl LogicalElement {
    /// Which kind of element this is.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Pipeline(_) => ElementKind::Pipeline,
            Self::Operation(_) => ElementKind::Operation,
            Self::Connection(_) => ElementKind::Connection,
        }
    }

    /// The operation id, if this is an operation.
    #[must_use]
    pub fn as_operation(&self) -> Option<OperationId> {
        match self {
            Self::Operation(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pipeline => "pipeline",
            Self::Operation => "operation",
            Self::Connection => "connection",
        })
    }
}

impl fmt::Display for LogicalElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline(id) => write!(f, "pipeline:{id}"),
            Self::Operation(id) => write!(f, "operation:{id}"),
            Self::Connection(id) => write!(f, "connection:{id}"),
        }
    }
}

impl From<PipelineId> for LogicalElement {
    fn from(id: PipelineId) -> Self {
        Self::Pipeline(id)
    }
}

impl From<OperationId> for LogicalElement {
    fn from(id: OperationId) -> Self {
        Self::Operation(id)
    }
}

impl From<ConnectionId> for LogicalElement {
    fn from(id: ConnectionId) -> Self {
        Self::Connection(id)
    }
}
