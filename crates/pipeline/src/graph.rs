//! Operation dependency graph built on `petgraph`.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use sluice_core::{ConnectionId, OperationId};

use crate::definition::PipelineDefinition;
use crate::error::PipelineError;

/// Operations as vertices, connections as edges.
///
/// Vertices are added in definition order, which makes level and terminal
/// listings deterministic.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<OperationId, ConnectionId>,
    positions: HashMap<OperationId, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph of `definition`.
    ///
    /// Fails on the first connection with an unknown endpoint or a self-loop.
    /// Cycles are accepted here and reported by the ordering methods.
    pub fn from_definition(definition: &PipelineDefinition) -> Result<Self, PipelineError> {
        let mut graph = DiGraph::with_capacity(
            definition.operations.len(),
            definition.connections.len(),
        );
        let positions: HashMap<_, _> = definition
            .operations
            .iter()
            .map(|op| (op.id, graph.add_node(op.id)))
            .collect();

        for conn in &definition.connections {
            let endpoint = |operation: OperationId| {
                positions
                    .get(&operation)
                    .copied()
                    .ok_or(PipelineError::UnknownOperation {
                        connection: conn.id,
                        operation,
                    })
            };
            let (from, to) = (endpoint(conn.from)?, endpoint(conn.to)?);
            if from == to {
                return Err(PipelineError::SelfLoop(conn.from));
            }
            graph.add_edge(from, to, conn.id);
        }

        Ok(Self { graph, positions })
    }

    /// Whether any cycle exists.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// A topological order of the operations.
    pub fn topological_sort(&self) -> Result<Vec<OperationId>, PipelineError> {
        algo::toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx]).collect())
            .map_err(|_| PipelineError::CycleDetected)
    }

    /// Group operations into levels.
    ///
    /// Level 0 holds the entry operations; every other operation sits one
    /// level below its deepest upstream operation. Operations of one level
    /// never depend on each other. Within a level, definition order is kept.
    pub fn compute_levels(&self) -> Result<Vec<Vec<OperationId>>, PipelineError> {
        let mut unmet: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut frontier: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| unmet[idx.index()] == 0)
            .collect();
        let mut levels = Vec::new();
        let mut placed = 0;

        while !frontier.is_empty() {
            placed += frontier.len();
            let mut next = Vec::new();
            for &idx in &frontier {
                for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                    let target = edge.target();
                    let count = &mut unmet[target.index()];
                    *count -= 1;
                    if *count == 0 {
                        next.push(target);
                    }
                }
            }
            next.sort_unstable();
            levels.push(frontier.iter().map(|&idx| self.graph[idx]).collect());
            frontier = next;
        }

        if placed == self.graph.node_count() {
            Ok(levels)
        } else {
            Err(PipelineError::CycleDetected)
        }
    }

    /// Connections leaving `id`.
    #[must_use]
    pub fn outgoing_connections(&self, id: OperationId) -> Vec<ConnectionId> {
        self.edges(id, Direction::Outgoing)
    }

    /// Connections arriving at `id`.
    #[must_use]
    pub fn incoming_connections(&self, id: OperationId) -> Vec<ConnectionId> {
        self.edges(id, Direction::Incoming)
    }

    fn edges(&self, id: OperationId, direction: Direction) -> Vec<ConnectionId> {
        let Some(&idx) = self.positions.get(&id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| (e.id(), *e.weight()))
            .collect();
        edges.sort_unstable_by_key(|(edge, _)| *edge);
        edges.into_iter().map(|(_, conn)| conn).collect()
    }

    /// Operations nothing feeds into.
    #[must_use]
    pub fn entry_operations(&self) -> Vec<OperationId> {
        self.without_edges(Direction::Incoming)
    }

    /// Operations feeding nothing.
    #[must_use]
    pub fn exit_operations(&self) -> Vec<OperationId> {
        self.without_edges(Direction::Outgoing)
    }

    fn without_edges(&self, direction: Direction) -> Vec<OperationId> {
        self.graph
            .externals(direction)
            .map(|idx| self.graph[idx])
            .collect()
    }

    /// Number of operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::connection::Connection;
    use crate::operation::OperationDefinition;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use sluice_core::OperationKind;

    fn op(id: OperationId) -> OperationDefinition {
        OperationDefinition::new(id, "op", OperationKind::new("noop").unwrap())
    }

    /// Definition with `n` operations and the given edges between their
    /// positions. Bypasses the builder so invalid shapes can be expressed.
    fn shape(n: usize, edges: &[(usize, usize)]) -> (PipelineDefinition, Vec<OperationId>) {
        let ids: Vec<_> = (0..n).map(|_| OperationId::v4()).collect();
        let mut def = PipelineBuilder::new("shape")
            .add_operation(op(OperationId::v4()))
            .build()
            .unwrap();
        def.operations = ids.iter().copied().map(op).collect();
        def.connections = edges
            .iter()
            .map(|&(from, to)| Connection::new(ids[from], ids[to]))
            .collect();
        (def, ids)
    }

    fn levels_by_position(edges: &[(usize, usize)], n: usize) -> Vec<Vec<usize>> {
        let (def, ids) = shape(n, edges);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        graph
            .compute_levels()
            .unwrap()
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .map(|id| ids.iter().position(|x| *x == id).unwrap())
                    .collect()
            })
            .collect()
    }

    #[rstest]
    #[case::single(1, &[], vec![vec![0]])]
    #[case::chain(3, &[(0, 1), (1, 2)], vec![vec![0], vec![1], vec![2]])]
    #[case::diamond(4, &[(0, 1), (0, 2), (1, 3), (2, 3)], vec![vec![0], vec![1, 2], vec![3]])]
    #[case::independent(3, &[], vec![vec![0, 1, 2]])]
    #[case::skip_edge(3, &[(0, 1), (1, 2), (0, 2)], vec![vec![0], vec![1], vec![2]])]
    #[case::fan_in_order(4, &[(3, 0), (2, 0), (1, 0)], vec![vec![1, 2, 3], vec![0]])]
    fn levels(
        #[case] n: usize,
        #[case] edges: &[(usize, usize)],
        #[case] expected: Vec<Vec<usize>>,
    ) {
        assert_eq!(levels_by_position(edges, n), expected);
    }

    #[test]
    fn parallel_connections_count_once_per_edge() {
        assert_eq!(
            levels_by_position(&[(0, 1), (0, 1)], 2),
            vec![vec![0], vec![1]]
        );
    }

    #[test]
    fn cycles_are_reported_by_ordering() {
        let (def, _) = shape(3, &[(0, 1), (1, 2), (2, 1)]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        assert!(graph.has_cycle());
        assert_eq!(graph.topological_sort(), Err(PipelineError::CycleDetected));
        assert_eq!(graph.compute_levels(), Err(PipelineError::CycleDetected));
    }

    #[test]
    fn dangling_endpoint_is_rejected() {
        let (mut def, ids) = shape(1, &[]);
        let missing = OperationId::v4();
        let conn = Connection::new(ids[0], missing);
        let conn_id = conn.id;
        def.connections.push(conn);

        assert_eq!(
            DependencyGraph::from_definition(&def).unwrap_err(),
            PipelineError::UnknownOperation {
                connection: conn_id,
                operation: missing,
            }
        );
    }

    #[test]
    fn self_loop_is_rejected() {
        let (def, ids) = shape(1, &[(0, 0)]);
        assert_eq!(
            DependencyGraph::from_definition(&def).unwrap_err(),
            PipelineError::SelfLoop(ids[0])
        );
    }

    #[test]
    fn topological_sort_respects_edges() {
        let (def, ids) = shape(4, &[(2, 0), (0, 3), (1, 3)]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        let order = graph.topological_sort().unwrap();
        let at = |i: usize| order.iter().position(|x| *x == ids[i]).unwrap();
        assert!(at(2) < at(0));
        assert!(at(0) < at(3));
        assert!(at(1) < at(3));
    }

    #[test]
    fn terminals_and_edges() {
        let (def, ids) = shape(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let graph = DependencyGraph::from_definition(&def).unwrap();

        assert_eq!(graph.operation_count(), 4);
        assert_eq!(graph.connection_count(), 4);
        assert_eq!(graph.entry_operations(), vec![ids[0]]);
        assert_eq!(graph.exit_operations(), vec![ids[3]]);
        assert_eq!(
            graph.outgoing_connections(ids[0]),
            vec![def.connections[0].id, def.connections[1].id]
        );
        assert_eq!(
            graph.incoming_connections(ids[3]),
            vec![def.connections[2].id, def.connections[3].id]
        );
        assert!(graph.outgoing_connections(OperationId::v4()).is_empty());
    }
}
