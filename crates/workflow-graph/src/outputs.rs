//! Post job actions and workflow outputs
//!
//! Actions are stored per node under `action_type + output_name`. Marking
//! outputs as workflow outputs is tied to `HideDatasetAction`: once any
//! output is marked, every unmarked tool output gets hidden on save.

use std::collections::BTreeMap;

use crate::document::WorkflowDocument;
use crate::error::{GraphError, Result};
use crate::graph::WorkflowGraph;
use crate::types::{ModuleKind, NodeId, PostJobAction, WorkflowOutput};

/// Action type that hides an output dataset from the history
pub const HIDE_DATASET_ACTION: &str = "HideDatasetAction";

/// Replacement post job actions, keyed by node
pub type PostActionChanges = BTreeMap<NodeId, BTreeMap<String, PostJobAction>>;

impl WorkflowGraph {
    /// Attach a post job action to one of the node's outputs.
    ///
    /// Returns false, leaving the node untouched, when an action with the
    /// same type already exists on that output.
    pub fn add_post_action(
        &mut self,
        id: NodeId,
        action_type: &str,
        output_name: &str,
        action_arguments: BTreeMap<String, serde_json::Value>,
    ) -> Result<bool> {
        let action = PostJobAction {
            action_type: action_type.to_string(),
            output_name: output_name.to_string(),
            action_arguments,
        };
        let key = action.key();
        let node = self.node_mut(id)?;
        if node.post_job_actions.contains_key(&key) {
            return Ok(false);
        }
        node.post_job_actions.insert(key, action);
        self.node_changed(id);
        Ok(true)
    }

    /// Remove a post job action by key. Returns the removed action.
    pub fn remove_post_action(&mut self, id: NodeId, key: &str) -> Result<Option<PostJobAction>> {
        let removed = self.node_mut(id)?.post_job_actions.remove(key);
        if removed.is_some() {
            self.node_changed(id);
        }
        Ok(removed)
    }

    /// Mark or unmark an output as a workflow output
    pub fn set_workflow_output(&mut self, id: NodeId, output_name: &str, enabled: bool) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.output(output_name).is_none() {
            return Err(GraphError::UnknownTerminal(crate::types::TerminalRef::output(
                id,
                output_name,
            )));
        }
        let present = node.is_workflow_output(output_name);
        match (enabled, present) {
            (true, false) => node.workflow_outputs.push(WorkflowOutput {
                output_name: output_name.to_string(),
                label: None,
            }),
            (false, true) => node.workflow_outputs.retain(|o| o.output_name != output_name),
            _ => return Ok(()),
        }
        self.node_changed(id);
        Ok(())
    }

    /// Rebuild `HideDatasetAction`s on every tool node so exactly the
    /// outputs not marked as workflow outputs are hidden.
    ///
    /// Does nothing unless some node marks a workflow output or some hide
    /// action already exists. Returns whether anything changed.
    pub fn rectify_workflow_outputs(&mut self) -> bool {
        let changes = self.rectified_post_actions();
        let changed = !changes.is_empty();
        self.apply_post_actions(changes);
        changed
    }

    /// The post job actions [`Self::rectify_workflow_outputs`] would set,
    /// for the nodes whose actions would change. The graph is not touched.
    pub fn rectified_post_actions(&self) -> PostActionChanges {
        let in_use = self.nodes.values().any(|n| {
            !n.workflow_outputs.is_empty()
                || n.post_job_actions
                    .values()
                    .any(|a| a.action_type == HIDE_DATASET_ACTION)
        });
        let mut changes = PostActionChanges::new();
        if !in_use {
            return changes;
        }

        for node in self.nodes.values().filter(|n| n.kind == ModuleKind::Tool) {
            let mut actions = node.post_job_actions.clone();
            actions.retain(|_, a| a.action_type != HIDE_DATASET_ACTION);
            for terminal in &node.outputs {
                if node.is_workflow_output(&terminal.def.name) {
                    continue;
                }
                let action = PostJobAction {
                    action_type: HIDE_DATASET_ACTION.to_string(),
                    output_name: terminal.def.name.clone(),
                    action_arguments: BTreeMap::new(),
                };
                actions.insert(action.key(), action);
            }
            if actions != node.post_job_actions {
                changes.insert(node.id, actions);
            }
        }
        changes
    }

    /// Replace the post job actions of the listed nodes. Nodes that no
    /// longer exist are skipped.
    pub fn apply_post_actions(&mut self, changes: PostActionChanges) {
        let mut applied = 0;
        for (id, actions) in changes {
            let Ok(node) = self.node_mut(id) else {
                continue;
            };
            if node.post_job_actions != actions {
                node.post_job_actions = actions;
                self.node_changed(id);
                applied += 1;
            }
        }
        if applied > 0 {
            log::debug!("Rectified hidden outputs on {} nodes", applied);
        }
    }

    /// Serialize the graph as it would look after
    /// [`Self::rectify_workflow_outputs`], without modifying it
    pub fn rectified_document(&self) -> WorkflowDocument {
        let changes = self.rectified_post_actions();
        let mut doc = self.to_document();
        for (step, id) in self.nodes.keys().enumerate() {
            if let (Some(actions), Some(record)) = (changes.get(id), doc.steps.get_mut(&step)) {
                record.post_job_actions = actions.clone();
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{add_tool, make_lattice, tool_def};
    use crate::types::OutputTerminalDef;

    fn make_graph() -> (WorkflowGraph, NodeId, NodeId) {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(
            &mut graph,
            tool_def(
                "A",
                vec![],
                vec![OutputTerminalDef::new("out", &["bam"]), OutputTerminalDef::new("log", &["tabular"])],
            ),
        );
        let b = add_tool(&mut graph, tool_def("B", vec![], vec![OutputTerminalDef::new("out", &["vcf"])]));
        (graph, a, b)
    }

    fn hidden(graph: &WorkflowGraph, id: NodeId) -> Vec<String> {
        graph
            .node(id)
            .unwrap()
            .post_job_actions
            .values()
            .filter(|a| a.action_type == HIDE_DATASET_ACTION)
            .map(|a| a.output_name.clone())
            .collect()
    }

    #[test]
    fn test_add_post_action_rejects_duplicate_key() {
        let (mut graph, a, _) = make_graph();
        let mut args = BTreeMap::new();
        args.insert("newname".to_string(), serde_json::json!("${sample}.bam"));

        assert!(graph.add_post_action(a, "RenameDatasetAction", "out", args.clone()).unwrap());
        assert!(!graph.add_post_action(a, "RenameDatasetAction", "out", BTreeMap::new()).unwrap());
        let node = graph.node(a).unwrap();
        assert_eq!(node.post_job_actions["RenameDatasetActionout"].action_arguments, args);

        graph.mark_saved();
        let removed = graph.remove_post_action(a, "RenameDatasetActionout").unwrap();
        assert!(removed.is_some());
        assert!(graph.is_dirty());
        assert!(graph.remove_post_action(a, "RenameDatasetActionout").unwrap().is_none());
    }

    #[test]
    fn test_set_workflow_output() {
        let (mut graph, a, _) = make_graph();
        graph.set_workflow_output(a, "out", true).unwrap();
        graph.set_workflow_output(a, "out", true).unwrap();
        assert_eq!(graph.node(a).unwrap().workflow_outputs.len(), 1);

        graph.set_workflow_output(a, "out", false).unwrap();
        assert!(!graph.node(a).unwrap().is_workflow_output("out"));
        assert!(matches!(
            graph.set_workflow_output(a, "missing", true),
            Err(GraphError::UnknownTerminal(_))
        ));
    }

    #[test]
    fn test_rectify_without_outputs_is_noop() {
        let (mut graph, a, b) = make_graph();
        graph.mark_saved();
        assert!(!graph.rectify_workflow_outputs());
        assert!(hidden(&graph, a).is_empty());
        assert!(hidden(&graph, b).is_empty());
        assert!(!graph.is_dirty());
    }

    #[test]
    fn test_rectify_hides_unmarked_outputs() {
        let (mut graph, a, b) = make_graph();
        graph.set_workflow_output(a, "out", true).unwrap();

        assert!(graph.rectify_workflow_outputs());
        assert_eq!(hidden(&graph, a), vec!["log".to_string()]);
        assert_eq!(hidden(&graph, b), vec!["out".to_string()]);

        // Stable on a second pass
        assert!(!graph.rectify_workflow_outputs());

        graph.set_workflow_output(b, "out", true).unwrap();
        graph.rectify_workflow_outputs();
        assert!(hidden(&graph, b).is_empty());
    }

    #[test]
    fn test_rectified_document_leaves_graph_alone() {
        let (mut graph, a, b) = make_graph();
        graph.set_workflow_output(b, "out", true).unwrap();
        graph.mark_saved();
        let revision = graph.revision();

        let doc = graph.rectified_document();

        let step_a: Vec<&str> = doc.steps[&0]
            .post_job_actions
            .values()
            .map(|p| p.output_name.as_str())
            .collect();
        assert_eq!(step_a, vec!["log", "out"]);
        assert!(doc.steps[&1].post_job_actions.is_empty());
        assert!(hidden(&graph, a).is_empty());
        assert_eq!(graph.revision(), revision);
        assert!(!graph.is_dirty());

        graph.apply_post_actions(graph.rectified_post_actions());
        assert_eq!(graph.to_document(), doc);
    }
}
