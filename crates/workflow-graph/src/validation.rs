//! Full validation pass over a workflow graph
//!
//! Reports everything a user should look at before running a workflow:
//! connections whose endpoint types no longer agree, nodes still waiting
//! for a module definition, tool-level errors and label clashes. Cycles are
//! not reported.

use std::collections::BTreeMap;

use crate::graph::WorkflowGraph;
use crate::types::{ConnectionId, NodeId};

/// A problem found by [`validate_workflow`]
#[derive(Debug, Clone, PartialEq)]
pub enum GraphDiagnostic {
    /// A connection whose types or multiplicity no longer check out
    StaleConnection {
        connection_id: ConnectionId,
        source: String,
        target: String,
    },
    /// A node whose module definition has not been applied
    UnresolvedNode { node_id: NodeId, name: String },
    /// Errors the build service attached to a node's configuration
    NodeErrors {
        node_id: NodeId,
        messages: Vec<String>,
    },
    /// Several nodes carry the same label
    DuplicateLabel { label: String, nodes: Vec<NodeId> },
}

impl std::fmt::Display for GraphDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleConnection {
                connection_id,
                source,
                target,
            } => {
                write!(
                    f,
                    "Connection {} from {} to {} is no longer valid",
                    connection_id, source, target
                )
            }
            Self::UnresolvedNode { node_id, name } => {
                write!(f, "Node {} ('{}') has not been resolved", node_id, name)
            }
            Self::NodeErrors { node_id, messages } => {
                write!(f, "Node {} has errors: {}", node_id, messages.join("; "))
            }
            Self::DuplicateLabel { label, nodes } => {
                let ids: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                write!(f, "Label '{}' is used by nodes {}", label, ids.join(", "))
            }
        }
    }
}

impl std::error::Error for GraphDiagnostic {}

/// Validate a workflow graph
///
/// Returns all diagnostics found (not just the first). Connection validity
/// is recomputed rather than read from the stored flag.
pub fn validate_workflow(graph: &WorkflowGraph) -> Vec<GraphDiagnostic> {
    let mut diagnostics = Vec::new();

    validate_connections(graph, &mut diagnostics);
    validate_nodes(graph, &mut diagnostics);
    validate_labels(graph, &mut diagnostics);

    diagnostics
}

impl WorkflowGraph {
    /// Run [`validate_workflow`] on this graph
    pub fn validate(&self) -> Vec<GraphDiagnostic> {
        validate_workflow(self)
    }
}

fn validate_connections(graph: &WorkflowGraph, diagnostics: &mut Vec<GraphDiagnostic>) {
    for conn in graph.connections() {
        if !graph.check_existing(conn.id) {
            diagnostics.push(GraphDiagnostic::StaleConnection {
                connection_id: conn.id,
                source: conn.source.to_string(),
                target: conn.target.to_string(),
            });
        }
    }
}

fn validate_nodes(graph: &WorkflowGraph, diagnostics: &mut Vec<GraphDiagnostic>) {
    for node in graph.nodes() {
        if !node.resolved && node.kind.capabilities().resolvable {
            diagnostics.push(GraphDiagnostic::UnresolvedNode {
                node_id: node.id,
                name: node.name.clone(),
            });
        }
        if !node.errors.is_empty() {
            diagnostics.push(GraphDiagnostic::NodeErrors {
                node_id: node.id,
                messages: node.errors.clone(),
            });
        }
    }
}

/// Labels are kept unique by every mutation; this catches graphs assembled
/// by other means.
fn validate_labels(graph: &WorkflowGraph, diagnostics: &mut Vec<GraphDiagnostic>) {
    let mut by_label: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    for node in graph.nodes() {
        if let Some(label) = node.label.as_deref() {
            by_label.entry(label).or_default().push(node.id);
        }
    }
    for (label, nodes) in by_label {
        if nodes.len() > 1 {
            diagnostics.push(GraphDiagnostic::DuplicateLabel {
                label: label.to_string(),
                nodes,
            });
        }
    }
}
