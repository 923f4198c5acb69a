//! Persisted workflow document
//!
//! The flat, versionable form of a workflow. Steps are keyed by their
//! index, and connections refer to their source by step index and output
//! name. These field names are what previously saved workflows use, so they
//! must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{
    null_as_default, ConfigValues, InputTerminalDef, ModuleKind, OutputTerminalDef, Position,
    PostJobAction, WorkflowOutput,
};

/// Index of a step within a document
pub type StepIndex = usize;

/// Fatal decoding failure: the document is not well-formed
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed workflow document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A serialized workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotation: String,
    /// Steps keyed by step index
    #[serde(default)]
    pub steps: BTreeMap<StepIndex, StepRecord>,
    /// Schema-drift notes from the service, keyed by step index
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upgrade_messages: BTreeMap<StepIndex, Vec<String>>,
}

impl WorkflowDocument {
    /// Parse a document, failing outright when it is not well-formed
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a document from an already-decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, CodecError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// One step (node) of a serialized workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Redundant copy of the step key
    #[serde(default)]
    pub id: StepIndex,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_tool_state")]
    pub tool_state: ConfigValues,
    /// Validation messages attached by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<StepErrors>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_connections: BTreeMap<String, InputConnection>,
    #[serde(default)]
    pub position: Position,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotation: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_job_actions: BTreeMap<String, PostJobAction>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub workflow_outputs: Vec<WorkflowOutput>,
    /// Input terminal definitions the step was resolved with
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_inputs: Vec<InputTerminalDef>,
    /// Output terminal definitions the step was resolved with
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_outputs: Vec<OutputTerminalDef>,
}

impl StepRecord {
    pub fn new(id: StepIndex, kind: ModuleKind) -> Self {
        Self {
            id,
            kind,
            content_id: None,
            name: kind.to_string(),
            tool_state: ConfigValues::new(),
            errors: None,
            input_connections: BTreeMap::new(),
            position: Position::default(),
            annotation: String::new(),
            label: None,
            uuid: None,
            post_job_actions: BTreeMap::new(),
            workflow_outputs: Vec::new(),
            data_inputs: Vec::new(),
            data_outputs: Vec::new(),
        }
    }
}

/// Step-level errors: the service sends either one message or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepErrors {
    One(String),
    Many(Vec<String>),
}

impl StepErrors {
    pub fn into_messages(self) -> Vec<String> {
        match self {
            StepErrors::One(message) => vec![message],
            StepErrors::Many(messages) => messages,
        }
    }
}

/// Reference to the output feeding an input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutputRef {
    /// Source step index
    pub id: StepIndex,
    pub output_name: String,
}

/// Sources of one input: a single reference, or a list for inputs that
/// accept multiple connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputConnection {
    One(StepOutputRef),
    Many(Vec<StepOutputRef>),
}

impl InputConnection {
    pub fn refs(&self) -> &[StepOutputRef] {
        match self {
            InputConnection::One(r) => std::slice::from_ref(r),
            InputConnection::Many(refs) => refs,
        }
    }

    pub(crate) fn from_refs(mut refs: Vec<StepOutputRef>) -> Option<Self> {
        match refs.len() {
            0 => None,
            1 => refs.pop().map(InputConnection::One),
            _ => Some(InputConnection::Many(refs)),
        }
    }
}

/// Older documents store the tool state as a JSON-encoded string
fn deserialize_tool_state<'de, D>(deserializer: D) -> Result<ConfigValues, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawState {
        Values(ConfigValues),
        Encoded(String),
    }

    match Option::<RawState>::deserialize(deserializer)? {
        None => Ok(ConfigValues::new()),
        Some(RawState::Values(values)) => Ok(values),
        Some(RawState::Encoded(encoded)) => serde_json::from_str(&encoded).map_err(D::Error::custom),
    }
}
