//! One-time compilation of a logical pipeline into its materialized graph.

use std::sync::Arc;

use sluice_pipeline::{DependencyGraph, PipelineDefinition, validate_pipeline};

use crate::element::MaterializedElement;
use crate::error::MaterializationError;
use crate::index::ElementIndex;
use crate::materialized::{MaterializedConnection, MaterializedOperation, MaterializedPipeline};
use crate::registry::OperationRegistry;

/// Output of [`Materializer::materialize`].
#[derive(Debug, Clone)]
pub struct Materialization {
    /// The executable pipeline.
    pub pipeline: Arc<MaterializedPipeline>,
    /// Every logical element of the pipeline mapped to its materialized node.
    pub index: Arc<ElementIndex>,
}

/// Compiles logical pipelines, binding operations to registered handlers.
#[derive(Clone)]
pub struct Materializer {
    registry: Arc<OperationRegistry>,
    channel_capacity: usize,
}

impl Materializer {
    /// Create a materializer whose event channels buffer `channel_capacity`
    /// events per subscriber.
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>, channel_capacity: usize) -> Self {
        Self {
            registry,
            channel_capacity,
        }
    }

    /// Build the materialized graph and the logical-to-materialized index.
    ///
    /// The index holds one entry for the pipeline, one per operation and one
    /// per connection. Nothing is returned unless every element materialized.
    pub fn materialize(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<Materialization, MaterializationError> {
        let errors = validate_pipeline(definition);
        if !errors.is_empty() {
            return Err(MaterializationError::Invalid(errors));
        }

        let graph = DependencyGraph::from_definition(definition)
            .map_err(|e| MaterializationError::Invalid(vec![e]))?;
        let levels = graph
            .compute_levels()
            .map_err(|e| MaterializationError::Invalid(vec![e]))?;

        let mut operations = Vec::with_capacity(definition.operations.len());
        for op in &definition.operations {
            let handler = self.registry.get(&op.kind).ok_or_else(|| {
                MaterializationError::UnknownOperationKind {
                    operation: op.id,
                    kind: op.kind.clone(),
                }
            })?;
            let materialized = MaterializedOperation::new(op, handler, self.channel_capacity);
            tracing::debug!(
                operation_id = %op.id,
                operation_kind = %op.kind,
                event_types = materialized.channels().len(),
                "materialized operation"
            );
            operations.push(Arc::new(materialized));
        }

        let connections: Vec<_> = definition
            .connections
            .iter()
            .map(|conn| {
                tracing::debug!(
                    connection_id = %conn.id,
                    from = %conn.from,
                    to = %conn.to,
                    "materialized connection"
                );
                Arc::new(MaterializedConnection::new(conn, self.channel_capacity))
            })
            .collect();

        let pipeline = Arc::new(MaterializedPipeline::new(
            definition.id,
            &definition.name,
            operations,
            connections,
            graph,
            levels,
            self.channel_capacity,
        ));

        let mut index = ElementIndex::new();
        index.insert(pipeline.clone());
        for op in pipeline.operations() {
            index.insert(op.clone());
        }
        for conn in pipeline.connections() {
            index.insert(conn.clone());
        }

        tracing::info!(
            pipeline_id = %definition.id,
            operations = pipeline.operations().len(),
            connections = pipeline.connections().len(),
            indexed = index.len(),
            "pipeline materialized"
        );

        Ok(Materialization {
            pipeline,
            index: Arc::new(index),
        })
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("handlers", &self.registry.len())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}
