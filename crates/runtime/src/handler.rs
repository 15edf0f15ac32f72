//! Operation handler trait and the context handed to each run.
//!
//! The runtime stores handlers in the [`OperationRegistry`](crate::OperationRegistry)
//! as `Arc<dyn OperationHandler>`, one per [`OperationKind`]. The materializer
//! binds every logical operation to the handler of its kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sluice_core::{ExecutionId, OperationId, OperationKind};
use sluice_reporting::{EventPayload, EventType, LogEntry, LogLevel, RowCount};
use tokio_util::sync::CancellationToken;

use crate::error::OperationError;
use crate::materialized::MaterializedOperation;

/// Runtime implementation of one operation kind.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The kind this handler implements.
    fn kind(&self) -> &OperationKind;

    /// Event types this handler emits through [`OperationContext::emit`].
    ///
    /// `OperationStatus` and `RowCount` are always published for every
    /// operation and need not be listed.
    fn event_types(&self) -> Vec<EventType> {
        Vec::new()
    }

    /// Process the operation's rows and report the totals.
    async fn run(&self, ctx: OperationContext) -> Result<RowCount, OperationError>;
}

/// Everything an [`OperationHandler`] sees during one run.
#[derive(Debug, Clone)]
pub struct OperationContext {
    execution_id: ExecutionId,
    operation: Arc<MaterializedOperation>,
    upstream_rows: u64,
    parameters: Arc<HashMap<String, serde_json::Value>>,
    cancellation: CancellationToken,
}

impl OperationContext {
    /// Create a context for running `operation`.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        operation: Arc<MaterializedOperation>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            operation,
            upstream_rows: 0,
            parameters: Arc::default(),
            cancellation,
        }
    }

    /// Set the number of rows written by upstream operations.
    #[must_use]
    pub fn with_upstream_rows(mut self, rows: u64) -> Self {
        self.upstream_rows = rows;
        self
    }

    /// Set the execution parameters visible to the operation.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Arc<HashMap<String, serde_json::Value>>) -> Self {
        self.parameters = parameters;
        self
    }

    /// The execution this run belongs to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// The operation being run.
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        self.operation.id()
    }

    /// The materialized operation being run.
    #[must_use]
    pub fn operation(&self) -> &Arc<MaterializedOperation> {
        &self.operation
    }

    /// A setting from the operation's definition.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.operation.config().get(key)
    }

    /// Rows written by all upstream operations.
    #[must_use]
    pub fn upstream_rows(&self) -> u64 {
        self.upstream_rows
    }

    /// An execution parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }

    /// Emit a payload on the operation's channel for `P`.
    ///
    /// Returns the number of subscribers reached. Fails with
    /// [`OperationError::UndeclaredEvent`] if the handler did not declare `P`.
    pub fn emit<P: EventPayload>(&self, payload: &P) -> Result<usize, OperationError> {
        let Some(channel) = self.operation.channels().typed::<P>() else {
            return Err(OperationError::UndeclaredEvent(EventType::of::<P>()));
        };
        Ok(channel.publish_payload(payload)?)
    }

    /// Emit a [`LogEntry`].
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<usize, OperationError> {
        self.emit(&LogEntry {
            level,
            message: message.into(),
        })
    }

    /// The cancellation token of the execution.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Check if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), OperationError> {
        if self.cancellation.is_cancelled() {
            Err(OperationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
