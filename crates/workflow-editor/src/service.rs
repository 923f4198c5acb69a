//! The workflow service the editor talks to
//!
//! Module resolution, document load/save and the datatype mapping all live
//! on the service side. [`WorkflowService`] abstracts over the transport so
//! the session can be driven by the HTTP client or by an in-memory double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use workflow_graph::{ConfigValues, DatatypeLattice, ModuleDefinition, ModuleKind, WorkflowDocument};

use crate::error::ServiceError;

/// Request to build (resolve) a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildModuleRequest {
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// Current configuration values of the node
    #[serde(default)]
    pub inputs: ConfigValues,
}

/// Body of a save request
#[derive(Debug, Clone, Serialize)]
pub struct SaveRequest<'a> {
    pub workflow: &'a WorkflowDocument,
}

/// Response to a save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Canonical workflow name as stored by the service
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Problems the service found in the stored workflow
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

/// Request to store a copy of the workflow under a new name
#[derive(Debug, Clone, Serialize)]
pub struct SaveAsRequest {
    pub workflow_name: String,
    pub workflow_annotation: String,
    pub workflow_data: WorkflowDocument,
}

/// Operations offered by the workflow service
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Resolve a module: terminals, form and canonical configuration
    async fn build_module(&self, request: &BuildModuleRequest) -> Result<ModuleDefinition, ServiceError>;

    /// Fetch a stored workflow as raw JSON. Decoding is left to the caller
    /// so a malformed document can be told apart from a transport failure.
    async fn load_workflow(&self, id: &str) -> Result<serde_json::Value, ServiceError>;

    /// Update a stored workflow
    async fn save_workflow(&self, id: &str, document: &WorkflowDocument) -> Result<SaveResponse, ServiceError>;

    /// Store a new copy; returns the new workflow id
    async fn save_workflow_as(&self, request: &SaveAsRequest) -> Result<String, ServiceError>;

    /// Fetch the datatype compatibility mapping
    async fn datatypes_mapping(&self) -> Result<DatatypeLattice, ServiceError>;
}
