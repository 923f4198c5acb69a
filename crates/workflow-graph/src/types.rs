//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs, including
//! nodes, terminals, connections, and the module definitions returned by
//! the module build service.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Configuration values of a node (form field name → value)
pub type ConfigValues = BTreeMap<String, serde_json::Value>;

/// Stable in-memory identifier for a node
///
/// Ids increase monotonically in creation order, so iterating nodes by id
/// yields the step order used by the document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of module a node wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// A tool invocation
    Tool,
    /// An embedded workflow
    Subworkflow,
    /// A single dataset input
    DataInput,
    /// A dataset collection input
    DataCollectionInput,
    /// Waits for the user to review intermediate results
    Pause,
}

/// What the editor may do with a module kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Terminals come from the module build service
    pub resolvable: bool,
    /// Has a configuration form
    pub renderable_form: bool,
    /// Executes as a job
    pub runnable: bool,
}

impl ModuleKind {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            ModuleKind::Tool | ModuleKind::Subworkflow => Capabilities {
                resolvable: true,
                renderable_form: true,
                runnable: true,
            },
            ModuleKind::DataInput | ModuleKind::DataCollectionInput => Capabilities {
                resolvable: true,
                renderable_form: true,
                runnable: false,
            },
            ModuleKind::Pause => Capabilities {
                resolvable: true,
                renderable_form: false,
                runnable: false,
            },
        }
    }

    /// Wire name, as used in documents and build requests
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Tool => "tool",
            ModuleKind::Subworkflow => "subworkflow",
            ModuleKind::DataInput => "data_input",
            ModuleKind::DataCollectionInput => "data_collection_input",
            ModuleKind::Pause => "pause",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a terminal receives or produces data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

/// Address of a terminal: owning node, direction, terminal name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRef {
    pub node: NodeId,
    pub direction: Direction,
    pub name: String,
}

impl TerminalRef {
    pub fn input(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            direction: Direction::Input,
            name: name.into(),
        }
    }

    pub fn output(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            direction: Direction::Output,
            name: name.into(),
        }
    }
}

impl fmt::Display for TerminalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(f, "{}:{}:{}", self.node, dir, self.name)
    }
}

/// Definition of an input terminal, as returned by the module build service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTerminalDef {
    pub name: String,
    /// Accepted datatype extensions
    #[serde(default, deserialize_with = "null_as_default")]
    pub extensions: Vec<String>,
    /// Accepts more than one connection
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl InputTerminalDef {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            multiple: false,
            optional: false,
            label: None,
        }
    }

    /// Set this input to accept multiple connections
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Definition of an output terminal, as returned by the module build service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTerminalDef {
    pub name: String,
    /// Produced datatype extensions
    #[serde(default, deserialize_with = "null_as_default")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OutputTerminalDef {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            label: None,
        }
    }
}

/// Authoritative description of a node, produced by module resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Display name of the module (tool name, workflow name...)
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_inputs: Vec<InputTerminalDef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_outputs: Vec<OutputTerminalDef>,
    /// Opaque form schema, rendered by the host
    #[serde(default)]
    pub config_form: serde_json::Value,
    /// Canonical configuration; replaces the node's values when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_state: Option<ConfigValues>,
    /// Validation messages for the current configuration
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

/// A live input terminal on a node
#[derive(Debug, Clone, PartialEq)]
pub struct InputTerminal {
    pub def: InputTerminalDef,
    pub connections: BTreeSet<ConnectionId>,
}

/// A live output terminal on a node
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTerminal {
    pub def: OutputTerminalDef,
    pub connections: BTreeSet<ConnectionId>,
}

/// Action applied to one output after the step runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostJobAction {
    pub action_type: String,
    pub output_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_arguments: BTreeMap<String, serde_json::Value>,
}

impl PostJobAction {
    /// Key under which the action is stored on its node
    pub fn key(&self) -> String {
        format!("{}{}", self.action_type, self.output_name)
    }
}

/// An output marked as a visible result of the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutput {
    pub output_name: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Canvas position. Opaque to the graph; carried for the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

impl Position {
    pub fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: ModuleKind,
    /// Tool id or sub-workflow id
    pub content_id: Option<String>,
    pub name: String,
    /// Unique across the graph when present
    pub label: Option<String>,
    pub annotation: String,
    pub inputs: Vec<InputTerminal>,
    pub outputs: Vec<OutputTerminal>,
    pub post_job_actions: BTreeMap<String, PostJobAction>,
    pub workflow_outputs: Vec<WorkflowOutput>,
    pub config_values: ConfigValues,
    pub config_form: serde_json::Value,
    /// Validation messages from the last resolution
    pub errors: Vec<String>,
    pub uuid: Uuid,
    pub position: Position,
    /// Whether a module definition has been applied
    pub resolved: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: ModuleKind, content_id: Option<String>) -> Self {
        Self {
            id,
            kind,
            name: content_id.clone().unwrap_or_else(|| kind.to_string()),
            content_id,
            label: None,
            annotation: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            post_job_actions: BTreeMap::new(),
            workflow_outputs: Vec::new(),
            config_values: ConfigValues::new(),
            config_form: serde_json::Value::Null,
            errors: Vec::new(),
            uuid: Uuid::new_v4(),
            position: Position::default(),
            resolved: false,
        }
    }

    /// Find an input terminal by name
    pub fn input(&self, name: &str) -> Option<&InputTerminal> {
        self.inputs.iter().find(|t| t.def.name == name)
    }

    /// Find an output terminal by name
    pub fn output(&self, name: &str) -> Option<&OutputTerminal> {
        self.outputs.iter().find(|t| t.def.name == name)
    }

    pub(crate) fn input_mut(&mut self, name: &str) -> Option<&mut InputTerminal> {
        self.inputs.iter_mut().find(|t| t.def.name == name)
    }

    pub(crate) fn output_mut(&mut self, name: &str) -> Option<&mut OutputTerminal> {
        self.outputs.iter_mut().find(|t| t.def.name == name)
    }

    /// Check if an output is marked as a workflow output
    pub fn is_workflow_output(&self, output_name: &str) -> bool {
        self.workflow_outputs
            .iter()
            .any(|o| o.output_name == output_name)
    }

    /// All connection ids attached to any of this node's terminals
    pub fn connection_ids(&self) -> BTreeSet<ConnectionId> {
        self.inputs
            .iter()
            .flat_map(|t| t.connections.iter())
            .chain(self.outputs.iter().flat_map(|t| t.connections.iter()))
            .copied()
            .collect()
    }

    /// Definitions of the current terminal sets
    pub fn terminal_defs(&self) -> (Vec<InputTerminalDef>, Vec<OutputTerminalDef>) {
        (
            self.inputs.iter().map(|t| t.def.clone()).collect(),
            self.outputs.iter().map(|t| t.def.clone()).collect(),
        )
    }
}

/// An edge from an output terminal to an input terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    /// Always an output terminal
    pub source: TerminalRef,
    /// Always an input terminal
    pub target: TerminalRef,
    /// False once a revalidation pass found the endpoint types incompatible
    pub valid: bool,
}

/// Treat an explicit `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_kind_capabilities() {
        assert!(ModuleKind::Tool.capabilities().runnable);
        assert!(!ModuleKind::DataInput.capabilities().runnable);
        assert!(!ModuleKind::Pause.capabilities().renderable_form);
        assert!(ModuleKind::Subworkflow.capabilities().resolvable);
    }

    #[test]
    fn test_module_kind_wire_names() {
        let json = serde_json::to_string(&ModuleKind::DataCollectionInput).unwrap();
        assert_eq!(json, "\"data_collection_input\"");
        let kind: ModuleKind = serde_json::from_str("\"subworkflow\"").unwrap();
        assert_eq!(kind, ModuleKind::Subworkflow);
        assert!(serde_json::from_str::<ModuleKind>("\"mystery\"").is_err());
    }

    #[test]
    fn test_module_definition_tolerates_nulls() {
        let def: ModuleDefinition = serde_json::from_str(
            r#"{"name": "Cut", "data_inputs": null, "data_outputs": [{"name": "out", "extensions": null}], "errors": null}"#,
        )
        .unwrap();
        assert_eq!(def.name, "Cut");
        assert!(def.data_inputs.is_empty());
        assert!(def.data_outputs[0].extensions.is_empty());
        assert!(def.errors.is_empty());
        assert!(def.tool_state.is_none());
    }

    #[test]
    fn test_post_job_action_key() {
        let pja = PostJobAction {
            action_type: "RenameDatasetAction".to_string(),
            output_name: "out_file1".to_string(),
            action_arguments: BTreeMap::new(),
        };
        assert_eq!(pja.key(), "RenameDatasetActionout_file1");
    }

    #[test]
    fn test_terminal_ref_display() {
        assert_eq!(TerminalRef::output(NodeId(3), "out").to_string(), "3:out:out");
        assert_eq!(TerminalRef::input(NodeId(0), "input1").to_string(), "0:in:input1");
    }
}
