//! Comprehensive pipeline validation that collects all errors.

use std::collections::HashSet;

use crate::definition::PipelineDefinition;
use crate::error::PipelineError;
use crate::graph::DependencyGraph;

/// Validate a pipeline definition comprehensively.
///
/// Unlike [`PipelineBuilder::build`](crate::PipelineBuilder::build), which stops at the
/// first error, this function collects every issue it can find so they can all be
/// reported at once. An empty result means the pipeline is structurally sound.
#[must_use]
pub fn validate_pipeline(definition: &PipelineDefinition) -> Vec<PipelineError> {
    let mut errors = Vec::new();

    if definition.name.trim().is_empty() {
        errors.push(PipelineError::EmptyName);
    }

    if definition.operations.is_empty() {
        errors.push(PipelineError::NoOperations);
        return errors;
    }

    let mut operation_ids = HashSet::new();
    for op in &definition.operations {
        if !operation_ids.insert(op.id) {
            errors.push(PipelineError::DuplicateOperationId(op.id));
        }
    }

    let mut connection_ids = HashSet::new();
    let mut endpoints_ok = true;
    for conn in &definition.connections {
        if !connection_ids.insert(conn.id) {
            errors.push(PipelineError::DuplicateConnectionId(conn.id));
        }
        for endpoint in [conn.from, conn.to] {
            if !operation_ids.contains(&endpoint) {
                endpoints_ok = false;
                errors.push(PipelineError::UnknownOperation {
                    connection: conn.id,
                    operation: endpoint,
                });
            }
        }
        if conn.is_self_loop() {
            errors.push(PipelineError::SelfLoop(conn.from));
        }
    }

    // Endpoint and self-loop problems are already reported above.
    if endpoints_ok && !definition.connections.iter().any(|c| c.is_self_loop()) {
        match DependencyGraph::from_definition(definition) {
            Ok(graph) if graph.has_cycle() => errors.push(PipelineError::CycleDetected),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }

    errors
}
