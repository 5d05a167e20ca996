//! Execution ordering over a workflow graph.
//!
//! [`execution_order`] is what the orchestrator uses at the start of a run:
//! 1. No connections → nodes in insertion order, untouched.
//! 2. Otherwise Kahn's algorithm over the nodes that take part in at least one
//!    connection. When several nodes are ready at once the one authored first
//!    wins, so the order is deterministic.
//! 3. Nodes that appear in no connection have no ordering constraint; they are
//!    appended after every constrained node, in insertion order.
//!
//! The tie-break matters when two independent nodes write the same context
//! key: the one later in the order wins.
//!
//! [`validate_dag`] is the strict variant for tooling: it also rejects
//! connections that point at missing nodes instead of skipping them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::warn;

use crate::models::{Connection, Node, Workflow};
use crate::EngineError;

/// Order `nodes` so that every connection's source precedes its target.
///
/// Each node appears exactly once, however many connections reference it.
/// Connections with an endpoint outside `nodes` are skipped with a warning.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::CycleDetected`] if the connections form a directed cycle
///   (a connection from a node to itself included).
pub fn execution_order<'n>(
    nodes: &'n [Node],
    connections: &[Connection],
) -> Result<Vec<&'n Node>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Index nodes by insertion position, rejecting duplicates
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    if connections.is_empty() {
        return Ok(nodes.iter().collect());
    }

    // -----------------------------------------------------------------------
    // 2. Build the dependency edges between known nodes
    // -----------------------------------------------------------------------
    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(connections.len());
    for conn in connections {
        match (
            index.get(conn.from_node_id.as_str()),
            index.get(conn.to_node_id.as_str()),
        ) {
            (Some(&from), Some(&to)) => edges.push((from, to)),
            _ => warn!(
                connection_id = %conn.id,
                from = %conn.from_node_id,
                to = %conn.to_node_id,
                "skipping connection with an endpoint outside the workflow"
            ),
        }
    }

    let mut connected = vec![false; nodes.len()];
    for &(from, to) in &edges {
        connected[from] = true;
        connected[to] = true;
    }

    // -----------------------------------------------------------------------
    // 3. Kahn's algorithm over the connected nodes
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for &(from, to) in &edges {
        adjacency[from].push(to);
        in_degree[to] += 1;
    }

    // Min-heap on insertion index: the earliest-authored ready node goes next.
    let mut ready: BinaryHeap<Reverse<usize>> = (0..nodes.len())
        .filter(|&i| connected[i] && in_degree[i] == 0)
        .map(Reverse)
        .collect();

    let constrained = connected.iter().filter(|&&c| c).count();
    let mut sorted: Vec<&Node> = Vec::with_capacity(nodes.len());

    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(&nodes[i]);
        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    // Anything connected that never reached in-degree zero sits on a cycle
    // (or downstream of one).
    if sorted.len() != constrained {
        let nodes_in_cycle = (0..nodes.len())
            .filter(|&i| connected[i] && in_degree[i] > 0)
            .map(|i| nodes[i].id.clone())
            .collect();
        return Err(EngineError::CycleDetected {
            nodes: nodes_in_cycle,
        });
    }

    // -----------------------------------------------------------------------
    // 4. Disconnected nodes go last, in insertion order
    // -----------------------------------------------------------------------
    sorted.extend(
        nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !connected[*i])
            .map(|(_, n)| n),
    );

    Ok(sorted)
}

/// Validate the workflow's DAG and return node IDs in execution order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    for conn in &workflow.connections {
        if !seen_ids.contains(conn.from_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.from_node_id.clone(),
                side: "from",
            });
        }
        if !seen_ids.contains(conn.to_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.to_node_id.clone(),
                side: "to",
            });
        }
    }

    let order = execution_order(&workflow.nodes, &workflow.connections)?;
    Ok(order.into_iter().map(|n| n.id.clone()).collect())
}
