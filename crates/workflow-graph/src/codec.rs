//! Conversion between [`WorkflowGraph`] and [`WorkflowDocument`]
//!
//! Nodes keep stable in-memory ids; step indices exist only at this
//! boundary. Serialization numbers the nodes in graph order, and
//! deserialization maps every step index back to a freshly allocated node.
//!
//! Loading never hard-fails on a bad reference. Documents may have been
//! written against older module versions, so a reference to a missing step
//! or terminal becomes an [`UpgradeDiagnostic`] on the step and the
//! connection is left out. Only a document that does not parse at all is
//! rejected, and that happens in [`WorkflowDocument::from_json`] before any
//! graph is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datatypes::DatatypeLattice;
use crate::document::{
    InputConnection, StepErrors, StepIndex, StepOutputRef, StepRecord, WorkflowDocument,
};
use crate::events::GraphEvent;
use crate::graph::WorkflowGraph;
use crate::types::{InputTerminal, Node, NodeId, OutputTerminal, TerminalRef};

/// Non-fatal note attached to one step while loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeDiagnostic {
    /// Step index in the loaded document
    pub step: StepIndex,
    /// Node created for the step, when the step exists
    pub node: Option<NodeId>,
    pub message: String,
}

/// Result of loading a document into a graph
#[derive(Debug, Clone, Default)]
pub struct DocumentLoad {
    /// Created nodes, in step order
    pub nodes: Vec<NodeId>,
    pub diagnostics: Vec<UpgradeDiagnostic>,
}

/// Serialize a graph into a document
pub fn serialize(graph: &WorkflowGraph) -> WorkflowDocument {
    graph.to_document()
}

/// Build a fresh graph from a document
pub fn deserialize(
    doc: &WorkflowDocument,
    datatypes: Arc<DatatypeLattice>,
) -> (WorkflowGraph, Vec<UpgradeDiagnostic>) {
    let mut graph = WorkflowGraph::new(doc.name.clone(), datatypes);
    let load = graph.from_document(doc, false);
    (graph, load.diagnostics)
}

impl WorkflowGraph {
    /// Serialize the graph. Step indices follow node order.
    pub fn to_document(&self) -> WorkflowDocument {
        let index: BTreeMap<NodeId, StepIndex> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let steps = self
            .nodes
            .values()
            .enumerate()
            .map(|(i, node)| (i, self.step_record(i, node, &index)))
            .collect();

        WorkflowDocument {
            name: self.name.clone(),
            annotation: self.annotation.clone(),
            steps,
            upgrade_messages: BTreeMap::new(),
        }
    }

    fn step_record(
        &self,
        step: StepIndex,
        node: &Node,
        index: &BTreeMap<NodeId, StepIndex>,
    ) -> StepRecord {
        let mut input_connections = BTreeMap::new();
        for input in &node.inputs {
            let refs: Vec<StepOutputRef> = input
                .connections
                .iter()
                .filter_map(|id| self.connections.get(id))
                .filter_map(|conn| {
                    Some(StepOutputRef {
                        id: *index.get(&conn.source.node)?,
                        output_name: conn.source.name.clone(),
                    })
                })
                .collect();
            if let Some(conn) = InputConnection::from_refs(refs) {
                input_connections.insert(input.def.name.clone(), conn);
            }
        }

        let (data_inputs, data_outputs) = node.terminal_defs();
        StepRecord {
            id: step,
            kind: node.kind,
            content_id: node.content_id.clone(),
            name: node.name.clone(),
            tool_state: node.config_values.clone(),
            errors: (!node.errors.is_empty())
                .then(|| StepErrors::Many(node.errors.clone())),
            input_connections,
            position: node.position,
            annotation: node.annotation.clone(),
            label: node.label.clone(),
            uuid: Some(node.uuid),
            post_job_actions: node.post_job_actions.clone(),
            workflow_outputs: node.workflow_outputs.clone(),
            data_inputs,
            data_outputs,
        }
    }

    /// Load a document into this graph.
    ///
    /// Without `merge` the graph is replaced, including its name and
    /// annotation. With `merge` the steps are appended as new nodes (copying
    /// steps from another workflow) and their step references are remapped
    /// to the new node ids.
    pub fn from_document(&mut self, doc: &WorkflowDocument, merge: bool) -> DocumentLoad {
        if !merge {
            self.clear();
            self.name = doc.name.clone();
            self.annotation = doc.annotation.clone();
        }

        let mut load = DocumentLoad::default();
        let mut step_nodes: BTreeMap<StepIndex, NodeId> = BTreeMap::new();
        let mut used_uuids: BTreeSet<Uuid> = self.nodes.values().map(|n| n.uuid).collect();

        for (&step, record) in &doc.steps {
            let id = self.allocate_node_id();
            let mut node = Node::new(id, record.kind, record.content_id.clone());
            if !record.name.is_empty() {
                node.name = record.name.clone();
            }
            node.config_values = record.tool_state.clone();
            node.annotation = record.annotation.clone();
            node.position = record.position;
            node.post_job_actions = record.post_job_actions.clone();
            node.workflow_outputs = record.workflow_outputs.clone();
            node.inputs = record
                .data_inputs
                .iter()
                .cloned()
                .map(|def| InputTerminal {
                    def,
                    connections: BTreeSet::new(),
                })
                .collect();
            node.outputs = record
                .data_outputs
                .iter()
                .cloned()
                .map(|def| OutputTerminal {
                    def,
                    connections: BTreeSet::new(),
                })
                .collect();
            node.resolved = !node.inputs.is_empty() || !node.outputs.is_empty();

            match record.uuid {
                Some(uuid) if !used_uuids.contains(&uuid) => node.uuid = uuid,
                _ => {}
            }
            used_uuids.insert(node.uuid);

            if let Some(label) = record.label.clone().filter(|l| !l.is_empty()) {
                if self.find_label(&label).is_some() {
                    load.diagnostics.push(UpgradeDiagnostic {
                        step,
                        node: Some(id),
                        message: format!("Duplicate label '{}' was removed", label),
                    });
                } else {
                    node.label = Some(label);
                }
            }

            if let Some(errors) = record.errors.clone() {
                node.errors = errors.into_messages();
                for message in &node.errors {
                    load.diagnostics.push(UpgradeDiagnostic {
                        step,
                        node: Some(id),
                        message: message.clone(),
                    });
                }
            }

            self.insert_node(node);
            step_nodes.insert(step, id);
            load.nodes.push(id);
        }

        for (&step, messages) in &doc.upgrade_messages {
            for message in messages {
                load.diagnostics.push(UpgradeDiagnostic {
                    step,
                    node: step_nodes.get(&step).copied(),
                    message: message.clone(),
                });
            }
        }

        for (&step, record) in &doc.steps {
            let Some(&target_node) = step_nodes.get(&step) else {
                continue;
            };
            for (input_name, connection) in &record.input_connections {
                for source in connection.refs() {
                    if let Err(message) =
                        self.restore_connection(target_node, input_name, source, &step_nodes)
                    {
                        log::info!("Step {}: {}", step, message);
                        load.diagnostics.push(UpgradeDiagnostic {
                            step,
                            node: Some(target_node),
                            message,
                        });
                    }
                }
            }
        }

        if !merge {
            self.emit(GraphEvent::GraphReplaced);
        }
        log::debug!(
            "Loaded {} steps ({} diagnostics, merge = {})",
            load.nodes.len(),
            load.diagnostics.len(),
            merge
        );
        load
    }

    /// Recreate one serialized connection. Type mismatches are kept and
    /// flagged; everything else that cannot be wired is reported.
    fn restore_connection(
        &mut self,
        target_node: NodeId,
        input_name: &str,
        source: &StepOutputRef,
        step_nodes: &BTreeMap<StepIndex, NodeId>,
    ) -> std::result::Result<(), String> {
        let Some(&source_node) = step_nodes.get(&source.id) else {
            return Err(format!(
                "Input '{}' referenced step {} which does not exist; connection removed",
                input_name, source.id
            ));
        };
        let target = TerminalRef::input(target_node, input_name);
        let source_ref = TerminalRef::output(source_node, source.output_name.as_str());

        let input = self
            .nodes
            .get(&target_node)
            .and_then(|n| n.input(input_name))
            .ok_or_else(|| {
                format!(
                    "Input '{}' no longer exists; connection from step {} removed",
                    input_name, source.id
                )
            })?;
        let output = self
            .nodes
            .get(&source_node)
            .and_then(|n| n.output(&source.output_name))
            .ok_or_else(|| {
                format!(
                    "Output '{}' of step {} no longer exists; connection to '{}' removed",
                    source.output_name, source.id, input_name
                )
            })?;

        let occupied = !input.def.multiple && !input.connections.is_empty();
        if self
            .connections
            .values()
            .any(|c| c.source == source_ref && c.target == target)
        {
            return Err(format!(
                "Duplicate connection from step {} to '{}' removed",
                source.id, input_name
            ));
        }

        if occupied {
            self.insert_connection(source_ref, target, false);
            return Err(format!(
                "Input '{}' accepts a single connection; extra connection from step {} flagged invalid",
                input_name, source.id
            ));
        }

        let valid = self
            .datatypes
            .accepts(&output.def.extensions, &input.def.extensions);
        self.insert_connection(source_ref, target, valid);
        if valid {
            Ok(())
        } else {
            Err(format!(
                "Connection from step {} output '{}' to '{}' has incompatible types",
                source.id, source.output_name, input_name
            ))
        }
    }
}

/// Render load diagnostics grouped per step, for display to the user
pub fn format_upgrade_report(diagnostics: &[UpgradeDiagnostic], graph: &WorkflowGraph) -> String {
    let mut grouped: BTreeMap<StepIndex, (Option<NodeId>, Vec<&str>)> = BTreeMap::new();
    for diag in diagnostics {
        let entry = grouped.entry(diag.step).or_insert((diag.node, Vec::new()));
        entry.1.push(diag.message.as_str());
    }

    let mut report = String::new();
    for (step, (node, messages)) in grouped {
        let name = node
            .and_then(|id| graph.node(id))
            .map(|n| n.name.as_str())
            .unwrap_or("(missing step)");
        let _ = writeln!(report, "Step {}: {}", step.saturating_add(1), name);
        for message in messages {
            let _ = writeln!(report, "  - {}", message);
        }
    }
    report
}
