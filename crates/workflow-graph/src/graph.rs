//! The workflow graph
//!
//! [`WorkflowGraph`] owns every node and connection and keeps them
//! referentially consistent: a connection always points at terminals that
//! exist on nodes in the graph, and each terminal knows the connections
//! attached to it. Every mutation bumps the revision and sets the dirty
//! flag; clearing the flag is left to the editor session after a save.
//!
//! Cycles are allowed. The editor represents whatever the user draws and
//! leaves cycle detection to the execution side.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::datatypes::DatatypeLattice;
use crate::error::{GraphError, Result};
use crate::events::{EventSink, GraphEvent, NullEventSink};
use crate::types::{
    ConfigValues, Connection, ConnectionId, Direction, InputTerminal, ModuleDefinition,
    ModuleKind, Node, NodeId, OutputTerminal, Position, TerminalRef,
};

/// Outcome of re-checking the connections touching one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevalidationReport {
    pub node: Option<NodeId>,
    /// Connections that are still compatible
    pub valid: Vec<ConnectionId>,
    /// Connections that are now incompatible; kept in the graph, flagged
    pub invalid: Vec<ConnectionId>,
    /// Connections dropped because one of their terminals no longer exists
    pub removed: Vec<Connection>,
}

impl RevalidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty() && self.removed.is_empty()
    }
}

/// A complete, editable workflow graph
pub struct WorkflowGraph {
    pub(crate) name: String,
    pub(crate) annotation: String,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) datatypes: Arc<DatatypeLattice>,
    events: Arc<dyn EventSink>,
    next_node_id: u64,
    next_connection_id: u64,
    dirty: bool,
    revision: u64,
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connections.len())
            .field("dirty", &self.dirty)
            .field("revision", &self.revision)
            .finish()
    }
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>, datatypes: Arc<DatatypeLattice>) -> Self {
        Self {
            name: name.into(),
            annotation: String::new(),
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            datatypes,
            events: Arc::new(NullEventSink),
            next_node_id: 0,
            next_connection_id: 0,
            dirty: false,
            revision: 0,
        }
    }

    /// Route change events to the given sink
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn set_event_sink(&mut self, events: Arc<dyn EventSink>) {
        self.events = events;
    }

    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.events)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.name {
            self.name = name;
            self.touch();
        }
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    pub fn set_annotation(&mut self, annotation: impl Into<String>) {
        let annotation = annotation.into();
        if annotation != self.annotation {
            self.annotation = annotation;
            self.touch();
        }
    }

    /// Whether unsaved modifications exist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Monotonic mutation counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Clear the dirty flag. Called by the editor session once a save has
    /// been confirmed.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn datatypes(&self) -> &Arc<DatatypeLattice> {
        &self.datatypes
    }

    /// Replace the datatype lattice and re-check every connection against it
    pub fn set_datatypes(&mut self, datatypes: Arc<DatatypeLattice>) -> Vec<RevalidationReport> {
        self.datatypes = datatypes;
        self.revalidate_all()
    }

    /// Nodes in step order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections with either endpoint on the node
    pub fn connections_for_node(&self, id: NodeId) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.source.node == id || c.target.node == id)
            .collect()
    }

    /// Connections feeding one input terminal, oldest first
    pub fn input_connections(&self, id: NodeId, input: &str) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.target.node == id && c.target.name == input)
            .collect()
    }

    /// Node currently carrying the label, if any
    pub fn find_label(&self, label: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.label.as_deref() == Some(label))
            .map(|n| n.id)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node with no terminals yet. The caller is expected to resolve
    /// its module definition.
    pub fn add_node(&mut self, kind: ModuleKind, content_id: Option<String>) -> NodeId {
        let id = self.allocate_node_id();
        self.insert_node(Node::new(id, kind, content_id));
        log::debug!("Added {} node {}", kind, id);
        id
    }

    pub(crate) fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    pub(crate) fn insert_node(&mut self, node: Node) {
        let id = node.id;
        self.nodes.insert(id, node);
        self.touch();
        self.emit(GraphEvent::NodeAdded { node_id: id });
    }

    /// Remove a node and every connection touching its terminals
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let attached = self
            .nodes
            .get(&id)
            .ok_or(GraphError::UnknownNode(id))?
            .connection_ids();
        for conn_id in attached {
            self.detach_connection(conn_id);
        }
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        self.touch();
        self.emit(GraphEvent::NodeRemoved { node_id: id });
        log::debug!("Removed node {}", id);
        Ok(node)
    }

    /// Change a node's label.
    ///
    /// Labels are compared case-sensitively against every other node; an
    /// empty label clears it. Renaming a node to its current label is a
    /// no-op.
    pub fn rename_label(&mut self, id: NodeId, label: Option<String>) -> Result<()> {
        let label = label.filter(|l| !l.is_empty());
        let current = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        if current.label == label {
            return Ok(());
        }
        if let Some(ref wanted) = label {
            if let Some(other) = self
                .nodes
                .values()
                .find(|n| n.id != id && n.label.as_deref() == Some(wanted.as_str()))
            {
                return Err(GraphError::DuplicateLabel {
                    label: wanted.clone(),
                    existing: other.id,
                });
            }
        }
        self.node_mut(id)?.label = label;
        self.node_changed(id);
        Ok(())
    }

    pub fn set_node_annotation(&mut self, id: NodeId, annotation: impl Into<String>) -> Result<()> {
        let annotation = annotation.into();
        let node = self.node_mut(id)?;
        if node.annotation != annotation {
            node.annotation = annotation;
            self.node_changed(id);
        }
        Ok(())
    }

    /// Replace a node's configuration values
    pub fn set_config_values(&mut self, id: NodeId, values: ConfigValues) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.config_values != values {
            node.config_values = values;
            self.node_changed(id);
        }
        Ok(())
    }

    /// Merge individual field values into a node's configuration
    pub fn update_config_values(&mut self, id: NodeId, values: ConfigValues) -> Result<()> {
        let node = self.node_mut(id)?;
        let mut changed = false;
        for (field, value) in values {
            if node.config_values.get(&field) != Some(&value) {
                node.config_values.insert(field, value);
                changed = true;
            }
        }
        if changed {
            self.node_changed(id);
        }
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: Position) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.position != position {
            node.position = position;
            self.node_changed(id);
        }
        Ok(())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn node_changed(&mut self, id: NodeId) {
        self.touch();
        self.emit(GraphEvent::NodeChanged { node_id: id });
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Check whether a connection could be created, without creating it
    pub fn can_connect(&self, source: &TerminalRef, target: &TerminalRef) -> Result<()> {
        if source.direction != Direction::Output {
            return Err(GraphError::UnknownTerminal(source.clone()));
        }
        if target.direction != Direction::Input {
            return Err(GraphError::UnknownTerminal(target.clone()));
        }
        let output = self
            .nodes
            .get(&source.node)
            .ok_or(GraphError::UnknownNode(source.node))?
            .output(&source.name)
            .ok_or_else(|| GraphError::UnknownTerminal(source.clone()))?;
        let input = self
            .nodes
            .get(&target.node)
            .ok_or(GraphError::UnknownNode(target.node))?
            .input(&target.name)
            .ok_or_else(|| GraphError::UnknownTerminal(target.clone()))?;

        if self
            .connections
            .values()
            .any(|c| &c.source == source && &c.target == target)
        {
            return Err(GraphError::AlreadyConnected {
                source_ref: source.clone(),
                target_ref: target.clone(),
            });
        }
        if !input.def.multiple && !input.connections.is_empty() {
            return Err(GraphError::InputOccupied(target.clone()));
        }
        if !self
            .datatypes
            .accepts(&output.def.extensions, &input.def.extensions)
        {
            return Err(GraphError::IncompatibleTypes {
                source_ref: source.clone(),
                target_ref: target.clone(),
                produced: output.def.extensions.join(", "),
                accepted: input.def.extensions.join(", "),
            });
        }
        Ok(())
    }

    /// Connect an output terminal to an input terminal.
    ///
    /// Both terminals are left untouched when the connection is rejected.
    pub fn create_connection(
        &mut self,
        source: TerminalRef,
        target: TerminalRef,
    ) -> Result<ConnectionId> {
        self.can_connect(&source, &target)?;
        let id = self.insert_connection(source, target, true);
        log::debug!("Created connection {}", id);
        Ok(id)
    }

    /// Wire up a connection whose endpoints are known to exist
    pub(crate) fn insert_connection(
        &mut self,
        source: TerminalRef,
        target: TerminalRef,
        valid: bool,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        if let Some(output) = self
            .nodes
            .get_mut(&source.node)
            .and_then(|n| n.output_mut(&source.name))
        {
            output.connections.insert(id);
        }
        if let Some(input) = self
            .nodes
            .get_mut(&target.node)
            .and_then(|n| n.input_mut(&target.name))
        {
            input.connections.insert(id);
        }
        self.connections.insert(
            id,
            Connection {
                id,
                source,
                target,
                valid,
            },
        );
        self.touch();
        self.emit(GraphEvent::ConnectionAdded { connection_id: id });
        id
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection> {
        let conn = self
            .detach_connection(id)
            .ok_or(GraphError::UnknownConnection(id.0))?;
        log::debug!("Removed connection {}", id);
        Ok(conn)
    }

    /// Remove a connection from the map and from both terminals
    fn detach_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        if let Some(output) = self
            .nodes
            .get_mut(&conn.source.node)
            .and_then(|n| n.output_mut(&conn.source.name))
        {
            output.connections.remove(&id);
        }
        if let Some(input) = self
            .nodes
            .get_mut(&conn.target.node)
            .and_then(|n| n.input_mut(&conn.target.name))
        {
            input.connections.remove(&id);
        }
        self.touch();
        self.emit(GraphEvent::ConnectionRemoved { connection_id: id });
        Some(conn)
    }

    // ------------------------------------------------------------------
    // Module resolution and revalidation
    // ------------------------------------------------------------------

    /// Merge a resolved module definition into a node.
    ///
    /// Terminal sets are replaced by the definition. Connections on
    /// terminals that kept their name carry over and are re-checked;
    /// connections on terminals that disappeared are dropped and reported.
    /// When the definition carries a `tool_state` it replaces the node's
    /// configuration (last write wins).
    pub fn apply_module_definition(
        &mut self,
        id: NodeId,
        definition: ModuleDefinition,
    ) -> Result<RevalidationReport> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;

        let kept_inputs: BTreeSet<&str> = definition
            .data_inputs
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        let kept_outputs: BTreeSet<&str> = definition
            .data_outputs
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        let orphaned: Vec<ConnectionId> = node
            .inputs
            .iter()
            .filter(|t| !kept_inputs.contains(t.def.name.as_str()))
            .flat_map(|t| t.connections.iter())
            .chain(
                node.outputs
                    .iter()
                    .filter(|t| !kept_outputs.contains(t.def.name.as_str()))
                    .flat_map(|t| t.connections.iter()),
            )
            .copied()
            .collect();

        let mut removed = Vec::new();
        for conn_id in orphaned {
            if let Some(conn) = self.detach_connection(conn_id) {
                log::info!(
                    "Dropped connection {} on node {}: terminal no longer exists",
                    conn_id,
                    id
                );
                removed.push(conn);
            }
        }

        let node = self.node_mut(id)?;
        let mut previous_inputs: BTreeMap<String, BTreeSet<ConnectionId>> = node
            .inputs
            .drain(..)
            .map(|t| (t.def.name, t.connections))
            .collect();
        let mut previous_outputs: BTreeMap<String, BTreeSet<ConnectionId>> = node
            .outputs
            .drain(..)
            .map(|t| (t.def.name, t.connections))
            .collect();

        node.inputs = definition
            .data_inputs
            .into_iter()
            .map(|def| InputTerminal {
                connections: previous_inputs.remove(&def.name).unwrap_or_default(),
                def,
            })
            .collect();
        node.outputs = definition
            .data_outputs
            .into_iter()
            .map(|def| OutputTerminal {
                connections: previous_outputs.remove(&def.name).unwrap_or_default(),
                def,
            })
            .collect();

        let output_names: BTreeSet<String> =
            node.outputs.iter().map(|t| t.def.name.clone()).collect();
        node.workflow_outputs
            .retain(|o| output_names.contains(&o.output_name));
        node.post_job_actions
            .retain(|_, a| output_names.contains(&a.output_name));

        if !definition.name.is_empty() {
            node.name = definition.name;
        }
        node.config_form = definition.config_form;
        node.errors = definition.errors;
        if let Some(state) = definition.tool_state {
            node.config_values = state;
        }
        node.resolved = true;
        self.node_changed(id);

        let mut report = self.revalidate_connections_for_node(id)?;
        report.removed = removed;
        Ok(report)
    }

    /// Re-check every connection touching the node against the current
    /// terminal types and multiplicity.
    ///
    /// Incompatible connections are flagged and returned, never deleted.
    pub fn revalidate_connections_for_node(&mut self, id: NodeId) -> Result<RevalidationReport> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        let touching: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source.node == id || c.target.node == id)
            .map(|c| c.id)
            .collect();

        let mut report = RevalidationReport {
            node: Some(id),
            ..Default::default()
        };
        for conn_id in touching {
            let valid = self.check_existing(conn_id);
            if let Some(conn) = self.connections.get_mut(&conn_id) {
                conn.valid = valid;
            }
            if valid {
                report.valid.push(conn_id);
            } else {
                log::warn!("Connection {} is no longer valid", conn_id);
                report.invalid.push(conn_id);
            }
            self.emit(GraphEvent::ConnectionRevalidated {
                connection_id: conn_id,
                valid,
            });
        }
        Ok(report)
    }

    /// Revalidate every node; reports only nodes with touching connections
    pub fn revalidate_all(&mut self) -> Vec<RevalidationReport> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        let mut reports = Vec::new();
        let mut seen = BTreeSet::new();
        for id in ids {
            if let Ok(mut report) = self.revalidate_connections_for_node(id) {
                report.valid.retain(|c| seen.insert(*c));
                report.invalid.retain(|c| seen.insert(*c));
                if !report.valid.is_empty() || !report.invalid.is_empty() {
                    reports.push(report);
                }
            }
        }
        reports
    }

    /// Whether an existing connection still satisfies types and
    /// multiplicity. For a single-valued input holding several connections
    /// only the oldest stays valid.
    pub(crate) fn check_existing(&self, conn_id: ConnectionId) -> bool {
        let Some(conn) = self.connections.get(&conn_id) else {
            return false;
        };
        let output = self
            .nodes
            .get(&conn.source.node)
            .and_then(|n| n.output(&conn.source.name));
        let input = self
            .nodes
            .get(&conn.target.node)
            .and_then(|n| n.input(&conn.target.name));
        let (Some(output), Some(input)) = (output, input) else {
            return false;
        };
        if !self
            .datatypes
            .accepts(&output.def.extensions, &input.def.extensions)
        {
            return false;
        }
        input.def.multiple || input.connections.iter().next() == Some(&conn_id)
    }

    // ------------------------------------------------------------------

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.dirty = true;
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver graph event: {}", e);
        }
    }

    /// Drop all nodes and connections. Id counters keep running so stale
    /// references to removed nodes never match new ones.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.touch();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::types::{InputTerminalDef, OutputTerminalDef};

    pub(crate) fn make_lattice() -> Arc<DatatypeLattice> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(
            DatatypeLattice::new()
                .with_extension("bam", "Bam")
                .with_extension("sam", "Sam")
                .with_extension("vcf", "Vcf")
                .with_extension("tabular", "Tabular")
                .with_ancestor("Sam", "Tabular"),
        )
    }

    pub(crate) fn tool_def(
        name: &str,
        inputs: Vec<InputTerminalDef>,
        outputs: Vec<OutputTerminalDef>,
    ) -> ModuleDefinition {
        ModuleDefinition {
            name: name.to_string(),
            data_inputs: inputs,
            data_outputs: outputs,
            ..Default::default()
        }
    }

    /// Add a tool node and immediately apply its definition
    pub(crate) fn add_tool(graph: &mut WorkflowGraph, definition: ModuleDefinition) -> NodeId {
        let id = graph.add_node(ModuleKind::Tool, Some(definition.name.to_lowercase()));
        graph.apply_module_definition(id, definition).unwrap();
        id
    }

    fn make_pair() -> (WorkflowGraph, NodeId, NodeId) {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(
            &mut graph,
            tool_def("A", vec![], vec![OutputTerminalDef::new("out", &["bam"])]),
        );
        let b = add_tool(
            &mut graph,
            tool_def(
                "B",
                vec![InputTerminalDef::new("input", &["bam", "sam"])],
                vec![OutputTerminalDef::new("out", &["vcf"])],
            ),
        );
        (graph, a, b)
    }

    fn assert_no_orphans(graph: &WorkflowGraph) {
        for conn in graph.connections() {
            let source = graph.node(conn.source.node).and_then(|n| n.output(&conn.source.name));
            let target = graph.node(conn.target.node).and_then(|n| n.input(&conn.target.name));
            assert!(source.is_some_and(|t| t.connections.contains(&conn.id)));
            assert!(target.is_some_and(|t| t.connections.contains(&conn.id)));
        }
    }

    #[test]
    fn test_create_connection() {
        let (mut graph, a, b) = make_pair();
        let id = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();

        let conn = graph.connection(id).unwrap();
        assert!(conn.valid);
        assert!(graph.node(a).unwrap().output("out").unwrap().connections.contains(&id));
        assert!(graph.node(b).unwrap().input("input").unwrap().connections.contains(&id));
        assert!(graph.is_dirty());
    }

    #[test]
    fn test_incompatible_connection_leaves_terminals_untouched() {
        let (mut graph, a, b) = make_pair();
        let c = add_tool(
            &mut graph,
            tool_def("C", vec![InputTerminalDef::new("calls", &["tabular"])], vec![]),
        );
        let revision = graph.revision();
        let before_b = graph.node(b).unwrap().clone();
        let before_c = graph.node(c).unwrap().clone();

        let err = graph
            .create_connection(TerminalRef::output(b, "out"), TerminalRef::input(c, "calls"))
            .unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleTypes { .. }));

        assert_eq!(graph.node(b).unwrap(), &before_b);
        assert_eq!(graph.node(c).unwrap(), &before_c);
        assert_eq!(graph.connection_count(), 0);
        assert_eq!(graph.revision(), revision);
        let _ = a;
    }

    #[test]
    fn test_subtype_connection_accepted() {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(&mut graph, tool_def("A", vec![], vec![OutputTerminalDef::new("out", &["sam"])]));
        let b = add_tool(
            &mut graph,
            tool_def("B", vec![InputTerminalDef::new("table", &["tabular"])], vec![]),
        );
        assert!(graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "table"))
            .is_ok());
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let (mut graph, a, b) = make_pair();
        let err = graph
            .create_connection(TerminalRef::input(b, "input"), TerminalRef::output(a, "out"))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownTerminal(_)));

        let err = graph
            .create_connection(TerminalRef::output(a, "missing"), TerminalRef::input(b, "input"))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownTerminal(_)));

        let err = graph
            .create_connection(TerminalRef::output(NodeId(99), "out"), TerminalRef::input(b, "input"))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(NodeId(99))));
    }

    #[test]
    fn test_single_input_holds_one_connection() {
        let (mut graph, a, b) = make_pair();
        let a2 = add_tool(&mut graph, tool_def("A2", vec![], vec![OutputTerminalDef::new("out", &["bam"])]));

        graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();
        let err = graph
            .create_connection(TerminalRef::output(a2, "out"), TerminalRef::input(b, "input"))
            .unwrap_err();
        assert!(matches!(err, GraphError::InputOccupied(_)));

        let err = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap_err();
        assert!(matches!(err, GraphError::AlreadyConnected { .. }));
    }

    #[test]
    fn test_multiple_input_accepts_many() {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(&mut graph, tool_def("A", vec![], vec![OutputTerminalDef::new("out", &["bam"])]));
        let a2 = add_tool(&mut graph, tool_def("A2", vec![], vec![OutputTerminalDef::new("out", &["bam"])]));
        let m = add_tool(
            &mut graph,
            tool_def("Merge", vec![InputTerminalDef::new("inputs", &["bam"]).multiple()], vec![]),
        );
        graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(m, "inputs"))
            .unwrap();
        graph
            .create_connection(TerminalRef::output(a2, "out"), TerminalRef::input(m, "inputs"))
            .unwrap();
        assert_eq!(graph.input_connections(m, "inputs").len(), 2);
    }

    #[test]
    fn test_self_loop_and_cycle_are_represented() {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let def = tool_def(
            "Loop",
            vec![InputTerminalDef::new("input", &["bam"])],
            vec![OutputTerminalDef::new("out", &["bam"])],
        );
        let x = add_tool(&mut graph, def.clone());
        let y = add_tool(&mut graph, def.clone());
        let z = add_tool(&mut graph, def);

        graph
            .create_connection(TerminalRef::output(x, "out"), TerminalRef::input(x, "input"))
            .unwrap();
        graph
            .create_connection(TerminalRef::output(y, "out"), TerminalRef::input(z, "input"))
            .unwrap();
        graph
            .create_connection(TerminalRef::output(z, "out"), TerminalRef::input(y, "input"))
            .unwrap();
        assert_eq!(graph.connection_count(), 3);
        assert_no_orphans(&graph);
    }

    #[test]
    fn test_remove_node_cascades() {
        let (mut graph, a, b) = make_pair();
        let c = add_tool(
            &mut graph,
            tool_def("C", vec![InputTerminalDef::new("calls", &["vcf"])], vec![]),
        );
        graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();
        graph
            .create_connection(TerminalRef::output(b, "out"), TerminalRef::input(c, "calls"))
            .unwrap();

        graph.remove_node(b).unwrap();

        assert_eq!(graph.connection_count(), 0);
        assert!(graph.node(a).unwrap().output("out").unwrap().connections.is_empty());
        assert!(graph.node(c).unwrap().input("calls").unwrap().connections.is_empty());
        assert_no_orphans(&graph);
        assert!(matches!(graph.remove_node(b), Err(GraphError::UnknownNode(_))));
    }

    #[test]
    fn test_remove_connection() {
        let (mut graph, a, b) = make_pair();
        let id = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();
        graph.mark_saved();

        graph.remove_connection(id).unwrap();
        assert!(graph.is_dirty());
        assert!(graph.node(b).unwrap().input("input").unwrap().connections.is_empty());
        assert!(matches!(
            graph.remove_connection(id),
            Err(GraphError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_rename_label() {
        let (mut graph, a, b) = make_pair();
        graph.rename_label(a, Some("reads".to_string())).unwrap();
        graph.rename_label(b, Some("Reads".to_string())).unwrap();

        let err = graph.rename_label(b, Some("reads".to_string())).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateLabel { existing, .. } if existing == a));
        assert_eq!(graph.node(a).unwrap().label.as_deref(), Some("reads"));
        assert_eq!(graph.node(b).unwrap().label.as_deref(), Some("Reads"));

        graph.mark_saved();
        graph.rename_label(a, Some("reads".to_string())).unwrap();
        assert!(!graph.is_dirty());

        graph.rename_label(a, Some(String::new())).unwrap();
        assert_eq!(graph.node(a).unwrap().label, None);
        assert_eq!(graph.find_label("Reads"), Some(b));
    }

    #[test]
    fn test_rebuilt_terminals_flag_stale_connection() {
        let (mut graph, a, b) = make_pair();
        let id = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();

        let report = graph
            .apply_module_definition(
                b,
                tool_def(
                    "B",
                    vec![InputTerminalDef::new("input", &["vcf"])],
                    vec![OutputTerminalDef::new("out", &["vcf"])],
                ),
            )
            .unwrap();

        assert_eq!(report.invalid, vec![id]);
        assert!(report.removed.is_empty());
        let conn = graph.connection(id).expect("stale connection must be kept");
        assert!(!conn.valid);

        let report = graph.revalidate_connections_for_node(b).unwrap();
        assert_eq!(report.invalid, vec![id]);
    }

    #[test]
    fn test_vanished_terminal_drops_connection() {
        let (mut graph, a, b) = make_pair();
        let id = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();

        let report = graph
            .apply_module_definition(
                b,
                tool_def("B", vec![InputTerminalDef::new("renamed", &["bam"])], vec![]),
            )
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].id, id);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.node(a).unwrap().output("out").unwrap().connections.is_empty());
        assert_no_orphans(&graph);
    }

    #[test]
    fn test_vanished_output_drops_its_actions() {
        let (mut graph, a, _) = make_pair();
        graph
            .add_post_action(a, "RenameDatasetAction", "out", Default::default())
            .unwrap();
        graph.set_workflow_output(a, "out", true).unwrap();

        graph
            .apply_module_definition(
                a,
                tool_def("A", vec![], vec![OutputTerminalDef::new("aligned", &["bam"])]),
            )
            .unwrap();

        let node = graph.node(a).unwrap();
        assert!(node.post_job_actions.is_empty());
        assert!(node.workflow_outputs.is_empty());
        assert!(graph.to_document().steps[&0].post_job_actions.is_empty());
    }

    #[test]
    fn test_definition_tool_state_replaces_config() {
        let (mut graph, a, _) = make_pair();
        let mut values = ConfigValues::new();
        values.insert("threshold".to_string(), serde_json::json!(3));
        graph.set_config_values(a, values).unwrap();

        let mut def = tool_def("A", vec![], vec![OutputTerminalDef::new("out", &["bam"])]);
        let mut canonical = ConfigValues::new();
        canonical.insert("threshold".to_string(), serde_json::json!("3"));
        def.tool_state = Some(canonical.clone());
        def.errors = vec!["threshold must be a string".to_string()];
        graph.apply_module_definition(a, def).unwrap();

        let node = graph.node(a).unwrap();
        assert_eq!(node.config_values, canonical);
        assert_eq!(node.errors.len(), 1);
    }

    #[test]
    fn test_lattice_swap_revalidates() {
        let (mut graph, a, b) = make_pair();
        let id = graph
            .create_connection(TerminalRef::output(a, "out"), TerminalRef::input(b, "input"))
            .unwrap();

        let reports = graph.set_datatypes(Arc::new(DatatypeLattice::new()));
        assert_eq!(reports.len(), 1);
        // "bam" is still listed verbatim on both sides, so reflexivity holds
        assert!(graph.connection(id).unwrap().valid);
    }

    #[test]
    fn test_events_emitted() {
        let sink = Arc::new(VecEventSink::new());
        let mut graph =
            WorkflowGraph::new("test", make_lattice()).with_event_sink(sink.clone());
        let a = graph.add_node(ModuleKind::DataInput, None);
        graph.remove_node(a).unwrap();

        let events = sink.events();
        assert_eq!(events.first(), Some(&GraphEvent::NodeAdded { node_id: a }));
        assert_eq!(events.last(), Some(&GraphEvent::NodeRemoved { node_id: a }));
    }

    #[test]
    fn test_every_mutation_marks_dirty() {
        let (mut graph, a, _) = make_pair();
        let mut revision = graph.revision();
        let mut check = |graph: &mut WorkflowGraph| {
            assert!(graph.is_dirty());
            assert!(graph.revision() > revision);
            revision = graph.revision();
            graph.mark_saved();
        };

        graph.mark_saved();
        graph.set_node_annotation(a, "notes").unwrap();
        check(&mut graph);
        graph.set_position(a, Position::new(10.0, 5.0)).unwrap();
        check(&mut graph);
        graph.rename_label(a, Some("x".to_string())).unwrap();
        check(&mut graph);
        graph.set_name("renamed");
        check(&mut graph);
        graph.add_node(ModuleKind::Pause, None);
        check(&mut graph);
    }
}
