//! Error types for the editor session and the workflow service

use thiserror::Error;
use workflow_graph::{CodecError, GraphError};

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors talking to the workflow service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The service cannot be reached or refused the request
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned to the host by session operations
///
/// None of these end the session; the graph is left as it was before the
/// failed operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A loaded document was not well-formed
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The workflow has never been stored, so there is nothing to update
    #[error("Workflow has no id yet; use save as")]
    NoWorkflowId,

    #[error("A save is already in progress")]
    SaveInProgress,

    /// `finish_save` was called without a matching `begin_save`
    #[error("No save in progress")]
    NoSaveInProgress,
}

/// Errors loading an editor configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
