//! Scenario graph validation — a read-only check the external executor can
//! run before starting an execution.
//!
//! Connection edits are never rejected for creating a cycle; this check only
//! reports. Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Every connection must reference valid node IDs (source and target).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError,
    models::{Connection, Node},
};

/// Minimal graph shape: what the check needs and nothing else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub connections: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
}

impl GraphDocument {
    pub fn from_parts(nodes: &[Node], connections: &[Connection]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|n| GraphNode { id: n.id, order: n.order })
                .collect(),
            connections: connections
                .iter()
                .map(|c| GraphEdge {
                    source_node_id: c.source_node_id,
                    target_node_id: c.target_node_id,
                })
                .collect(),
        }
    }
}

/// Validate the graph and return node IDs in topological execution order.
///
/// Among nodes that become ready at the same time, the lower `order` runs
/// first, so the result is deterministic.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_graph(graph: &GraphDocument) -> Result<Vec<Uuid>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<Uuid> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id) {
            return Err(EngineError::DuplicateNodeId(node.id));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    for edge in &graph.connections {
        if !seen_ids.contains(&edge.source_node_id) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.source_node_id,
                side: "source",
            });
        }
        if !seen_ids.contains(&edge.target_node_id) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.target_node_id,
                side: "target",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let order_of: HashMap<Uuid, (i32, usize)> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, n)| (n.id, (n.order, idx)))
        .collect();

    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut in_degree: HashMap<Uuid, usize> = graph.nodes.iter().map(|n| (n.id, 0)).collect();

    for edge in &graph.connections {
        adjacency
            .entry(edge.source_node_id)
            .or_default()
            .push(edge.target_node_id);
        *in_degree.entry(edge.target_node_id).or_insert(0) += 1;
    }

    let by_order = |ids: &mut Vec<Uuid>| ids.sort_by_key(|id| order_of[id]);

    let mut roots: Vec<Uuid> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    by_order(&mut roots);
    let mut queue: VecDeque<Uuid> = roots.into();

    let mut sorted: Vec<Uuid> = Vec::with_capacity(graph.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id);

        if let Some(neighbours) = adjacency.get(&node_id) {
            let mut ready = Vec::new();
            for neighbour in neighbours {
                let deg = in_degree.entry(*neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    ready.push(*neighbour);
                }
            }
            by_order(&mut ready);
            queue.extend(ready);
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != graph.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<GraphNode> {
        (0..n)
            .map(|i| GraphNode { id: Uuid::new_v4(), order: i as i32 })
            .collect()
    }

    fn edge(from: &GraphNode, to: &GraphNode) -> GraphEdge {
        GraphEdge { source_node_id: from.id, target_node_id: to.id }
    }

    #[test]
    fn valid_linear_graph_returns_sorted_order() {
        // A → B → C, declared out of order
        let n = nodes(3);
        let graph = GraphDocument {
            nodes: vec![n[2].clone(), n[0].clone(), n[1].clone()],
            connections: vec![edge(&n[0], &n[1]), edge(&n[1], &n[2])],
        };

        let sorted = validate_graph(&graph).expect("should be valid");
        assert_eq!(sorted, vec![n[0].id, n[1].id, n[2].id]);
    }

    #[test]
    fn valid_diamond_graph() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let n = nodes(4);
        let graph = GraphDocument {
            nodes: n.clone(),
            connections: vec![
                edge(&n[0], &n[1]),
                edge(&n[0], &n[2]),
                edge(&n[1], &n[3]),
                edge(&n[2], &n[3]),
            ],
        };

        let sorted = validate_graph(&graph).expect("should be valid");
        // Siblings follow their `order`.
        assert_eq!(sorted, vec![n[0].id, n[1].id, n[2].id, n[3].id]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let n = nodes(1);
        let graph = GraphDocument {
            nodes: vec![n[0].clone(), n[0].clone()],
            connections: vec![],
        };
        assert!(matches!(
            validate_graph(&graph),
            Err(EngineError::DuplicateNodeId(id)) if id == n[0].id
        ));
    }

    #[test]
    fn connection_referencing_missing_node_is_rejected() {
        let n = nodes(1);
        let ghost = Uuid::new_v4();
        let graph = GraphDocument {
            nodes: n.clone(),
            connections: vec![GraphEdge { source_node_id: n[0].id, target_node_id: ghost }],
        };
        assert!(matches!(
            validate_graph(&graph),
            Err(EngineError::UnknownNodeReference { node_id, side: "target" }) if node_id == ghost
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A
        let n = nodes(3);
        let graph = GraphDocument {
            nodes: n.clone(),
            connections: vec![edge(&n[0], &n[1]), edge(&n[1], &n[2]), edge(&n[2], &n[0])],
        };
        assert!(matches!(validate_graph(&graph), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn single_node_no_connections_is_valid() {
        let n = nodes(1);
        let graph = GraphDocument { nodes: n.clone(), connections: vec![] };
        assert_eq!(validate_graph(&graph).unwrap(), vec![n[0].id]);
    }
}
