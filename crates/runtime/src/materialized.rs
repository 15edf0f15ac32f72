//! The three kinds of materialized element.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sluice_core::{ConnectionId, OperationId, OperationKind, PipelineId};
use sluice_pipeline::{Connection, DependencyGraph, LogicalElement, OperationDefinition};
use sluice_reporting::{
    EventStream, EventType, OperationStatus, PublisherError, PublisherSource, RowCount,
};

use crate::element::{ChannelSet, MaterializedElement};
use crate::handler::OperationHandler;

/// A logical operation bound to its handler.
///
/// Publishes `OperationStatus` and the `RowCount` its handler reports, plus
/// whatever the handler declares.
pub struct MaterializedOperation {
    id: OperationId,
    name: String,
    kind: OperationKind,
    config: HashMap<String, serde_json::Value>,
    handler: Arc<dyn OperationHandler>,
    channels: ChannelSet,
}

impl MaterializedOperation {
    /// Bind `definition` to `handler`.
    #[must_use]
    pub fn new(
        definition: &OperationDefinition,
        handler: Arc<dyn OperationHandler>,
        capacity: usize,
    ) -> Self {
        let event_types = handler
            .event_types()
            .into_iter()
            .chain([EventType::of::<OperationStatus>(), EventType::of::<RowCount>()]);
        Self {
            id: definition.id,
            name: definition.name.clone(),
            kind: definition.kind.clone(),
            config: definition.config.clone(),
            channels: ChannelSet::new(definition.element(), event_types, capacity),
            handler,
        }
    }

    /// The logical operation id.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation kind.
    #[must_use]
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Settings from the definition.
    #[must_use]
    pub fn config(&self) -> &HashMap<String, serde_json::Value> {
        &self.config
    }

    /// The bound handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn OperationHandler> {
        &self.handler
    }
}

impl fmt::Debug for MaterializedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedOperation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// A hop between two materialized operations. Publishes `RowCount`.
#[derive(Debug)]
pub struct MaterializedConnection {
    id: ConnectionId,
    from: OperationId,
    to: OperationId,
    channels: ChannelSet,
}

impl MaterializedConnection {
    /// Materialize `connection`.
    #[must_use]
    pub fn new(connection: &Connection, capacity: usize) -> Self {
        Self {
            id: connection.id,
            from: connection.from,
            to: connection.to,
            channels: ChannelSet::new(
                connection.element(),
                [EventType::of::<RowCount>()],
                capacity,
            ),
        }
    }

    /// The logical connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Upstream operation.
    #[must_use]
    pub fn from(&self) -> OperationId {
        self.from
    }

    /// Downstream operation.
    #[must_use]
    pub fn to(&self) -> OperationId {
        self.to
    }
}

/// The executable pipeline: its operations, connections and level schedule.
///
/// Publishes `OperationStatus` for the pipeline as a whole.
pub struct MaterializedPipeline {
    id: PipelineId,
    name: String,
    operations: Vec<Arc<MaterializedOperation>>,
    connections: Vec<Arc<MaterializedConnection>>,
    graph: DependencyGraph,
    levels: Vec<Vec<OperationId>>,
    channels: ChannelSet,
}

impl MaterializedPipeline {
    /// Assemble a pipeline from already materialized parts.
    #[must_use]
    pub fn new(
        id: PipelineId,
        name: impl Into<String>,
        operations: Vec<Arc<MaterializedOperation>>,
        connections: Vec<Arc<MaterializedConnection>>,
        graph: DependencyGraph,
        levels: Vec<Vec<OperationId>>,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            operations,
            connections,
            graph,
            levels,
            channels: ChannelSet::new(
                LogicalElement::Pipeline(id),
                [EventType::of::<OperationStatus>()],
                capacity,
            ),
        }
    }

    /// The logical pipeline id.
    #[must_use]
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materialized operations in definition order.
    #[must_use]
    pub fn operations(&self) -> &[Arc<MaterializedOperation>] {
        &self.operations
    }

    /// Materialized connections in definition order.
    #[must_use]
    pub fn connections(&self) -> &[Arc<MaterializedConnection>] {
        &self.connections
    }

    /// Look up an operation.
    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&Arc<MaterializedOperation>> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// Look up a connection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&Arc<MaterializedConnection>> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Connections leaving `id`.
    #[must_use]
    pub fn outgoing(&self, id: OperationId) -> Vec<&Arc<MaterializedConnection>> {
        self.graph
            .outgoing_connections(id)
            .into_iter()
            .filter_map(|cid| self.connection(cid))
            .collect()
    }

    /// Connections arriving at `id`.
    #[must_use]
    pub fn incoming(&self, id: OperationId) -> Vec<&Arc<MaterializedConnection>> {
        self.graph
            .incoming_connections(id)
            .into_iter()
            .filter_map(|cid| self.connection(cid))
            .collect()
    }

    /// The dependency graph of the operations.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Operations grouped into levels; each level only depends on earlier ones.
    #[must_use]
    pub fn levels(&self) -> &[Vec<OperationId>] {
        &self.levels
    }

    /// Close the channels of the pipeline and of every operation and connection.
    pub fn close_all(&self) {
        for operation in &self.operations {
            operation.close();
        }
        for connection in &self.connections {
            connection.close();
        }
        self.close();
    }
}

impl fmt::Debug for MaterializedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedPipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("operations", &self.operations.len())
            .field("connections", &self.connections.len())
            .field("levels", &self.levels)
            .finish_non_exhaustive()
    }
}

macro_rules! materialized_element {
    ($ty:ty, $logical:expr) => {
        impl MaterializedElement for $ty {
            fn logical(&self) -> LogicalElement {
                $logical(self.id)
            }

            fn channels(&self) -> &ChannelSet {
                &self.channels
            }
        }

        #[async_trait]
        impl PublisherSource for $ty {
            async fn publisher(
                &self,
                event_type: &EventType,
            ) -> Result<Option<EventStream>, PublisherError> {
                Ok(self.channels.stream(event_type))
            }
        }
    };
}

materialized_element!(MaterializedPipeline, LogicalElement::Pipeline);
materialized_element!(MaterializedOperation, LogicalElement::Operation);
materialized_element!(MaterializedConnection, LogicalElement::Connection);
