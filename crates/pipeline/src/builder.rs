//! Fluent builder for constructing and validating pipeline definitions.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::Utc;
use sluice_core::{OperationId, PipelineId};

use crate::connection::Connection;
use crate::definition::PipelineDefinition;
use crate::error::PipelineError;
use crate::graph::DependencyGraph;
use crate::operation::OperationDefinition;

/// A builder that accumulates operations, connections, and metadata, then
/// validates and produces a [`PipelineDefinition`].
pub struct PipelineBuilder {
    id: PipelineId,
    name: String,
    description: Option<String>,
    operations: Vec<OperationDefinition>,
    connections: Vec<Connection>,
    variables: HashMap<String, serde_json::Value>,
    tags: Vec<String>,
}

impl PipelineBuilder {
    /// Start building a pipeline with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PipelineId::v4(),
            name: name.into(),
            description: None,
            operations: Vec::new(),
            connections: Vec::new(),
            variables: HashMap::new(),
            tags: Vec::new(),
        }
    }

    /// Override the auto-generated pipeline ID.
    #[must_use]
    pub fn id(mut self, id: PipelineId) -> Self {
        self.id = id;
        self
    }

    /// Set the pipeline description.
    #[must_use]
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add an operation.
    #[must_use]
    pub fn add_operation(mut self, operation: OperationDefinition) -> Self {
        self.operations.push(operation);
        self
    }

    /// Connect two operations with a fresh connection id.
    #[must_use]
    pub fn connect(self, from: OperationId, to: OperationId) -> Self {
        self.add_connection(Connection::new(from, to))
    }

    /// Add a prepared connection.
    #[must_use]
    pub fn add_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Set a pipeline-level variable default.
    #[must_use]
    pub fn variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Consume the builder, validate the pipeline, and return the definition.
    ///
    /// Stops at the first problem: empty name, no operations, duplicate ids,
    /// self-loops, dangling endpoints, or a cycle.
    pub fn build(self) -> Result<PipelineDefinition, PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName);
        }
        if self.operations.is_empty() {
            return Err(PipelineError::NoOperations);
        }

        let mut seen = HashSet::new();
        for op in &self.operations {
            if !seen.insert(op.id) {
                return Err(PipelineError::DuplicateOperationId(op.id));
            }
        }

        let mut seen = HashSet::new();
        for conn in &self.connections {
            if !seen.insert(conn.id) {
                return Err(PipelineError::DuplicateConnectionId(conn.id));
            }
            if conn.is_self_loop() {
                return Err(PipelineError::SelfLoop(conn.from));
            }
        }

        let now = Utc::now();
        let definition = PipelineDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            operations: self.operations,
            connections: self.connections,
            variables: self.variables,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        };

        let graph = DependencyGraph::from_definition(&definition)?;
        if graph.has_cycle() {
            return Err(PipelineError::CycleDetected);
        }

        Ok(definition)
    }
}
