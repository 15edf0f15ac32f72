//! Pipeline-level definition types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::{ConnectionId, OperationId, PipelineId};

use crate::connection::Connection;
use crate::element::LogicalElement;
use crate::operation::OperationDefinition;

/// A complete logical pipeline: operations, connections, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Unique identifier for this pipeline.
    pub id: PipelineId,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// The operations (steps) of this pipeline.
    pub operations: Vec<OperationDefinition>,
    /// Hops connecting the operations.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Pipeline-level variables with their default values.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Free-form tags for filtering and grouping.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When this definition was first created.
    pub created_at: DateTime<Utc>,
    /// When this definition was last modified.
    pub updated_at: DateTime<Utc>,
}

impl PipelineDefinition {
    /// The logical identity of the pipeline itself.
    #[must_use]
    pub fn element(&self) -> LogicalElement {
        LogicalElement::Pipeline(self.id)
    }

    /// Every logical element: the pipeline, then its operations, then its connections.
    pub fn elements(&self) -> impl Iterator<Item = LogicalElement> + '_ {
        std::iter::once(self.element())
            .chain(self.operations.iter().map(OperationDefinition::element))
            .chain(self.connections.iter().map(Connection::element))
    }

    /// Look up an operation by id.
    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&OperationDefinition> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Whether `element` belongs to this pipeline.
    #[must_use]
    pub fn contains(&self, element: &LogicalElement) -> bool {
        match element {
            LogicalElement::Pipeline(id) => *id == self.id,
            LogicalElement::Operation(id) => self.operation(*id).is_some(),
            LogicalElement::Connection(id) => self.connection(*id).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use sluice_core::OperationKind;

    fn op(id: OperationId) -> OperationDefinition {
        OperationDefinition::new(id, "op", OperationKind::new("noop").unwrap())
    }

    #[test]
    fn elements_lists_pipeline_operations_and_connections() {
        let a = OperationId::v4();
        let b = OperationId::v4();
        let def = PipelineBuilder::new("p")
            .add_operation(op(a))
            .add_operation(op(b))
            .connect(a, b)
            .build()
            .unwrap();

        let elements: Vec<_> = def.elements().collect();
        assert_eq!(elements.len(), 4);
        assert_eq!(elements[0], def.element());
        assert_eq!(elements[1], LogicalElement::Operation(a));
        assert_eq!(elements[2], LogicalElement::Operation(b));
        assert_eq!(elements[3], def.connections[0].element());
    }

    #[test]
    fn contains_only_own_elements() {
        let a = OperationId::v4();
        let def = PipelineBuilder::new("p").add_operation(op(a)).build().unwrap();

        assert!(def.contains(&def.element()));
        assert!(def.contains(&LogicalElement::Operation(a)));
        assert!(!def.contains(&LogicalElement::Operation(OperationId::v4())));
        assert!(!def.contains(&LogicalElement::Pipeline(PipelineId::v4())));
    }

    #[test]
    fn serde_roundtrip() {
        let a = OperationId::v4();
        let b = OperationId::v4();
        let def = PipelineBuilder::new("roundtrip")
            .add_operation(op(a))
            .add_operation(op(b))
            .connect(a, b)
            .variable("batch_size", serde_json::json!(500))
            .build()
            .unwrap();

        let json = serde_json::to_string(&def).unwrap();
        let back: PipelineDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, def.id);
        assert_eq!(back.operations.len(), 2);
        assert_eq!(back.connections[0].id, def.connections[0].id);
        assert_eq!(back.variables["batch_size"], serde_json::json!(500));
    }
}
