//! Error types for the workflow graph

use thiserror::Error;

use crate::types::{NodeId, TerminalRef};

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors returned by mutating graph operations
///
/// All of these are recoverable: the graph is left exactly as it was
/// before the rejected operation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The output's produced types and the input's accepted types share no
    /// compatible pair
    #[error("Incompatible types: {source_ref} produces [{produced}], {target_ref} accepts [{accepted}]")]
    IncompatibleTypes {
        source_ref: TerminalRef,
        target_ref: TerminalRef,
        produced: String,
        accepted: String,
    },

    /// Another node already carries this label
    #[error("Duplicate label '{label}' (already used by node {existing})")]
    DuplicateLabel { label: String, existing: NodeId },

    /// Node is not part of the graph
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Terminal is not declared on its node (or has the wrong direction)
    #[error("Unknown terminal: {0}")]
    UnknownTerminal(TerminalRef),

    /// Connection is not part of the graph
    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    /// Single-valued input already holds a connection
    #[error("Input {0} already has a connection")]
    InputOccupied(TerminalRef),

    /// The exact same source/target pair is already connected
    #[error("{source_ref} is already connected to {target_ref}")]
    AlreadyConnected {
        source_ref: TerminalRef,
        target_ref: TerminalRef,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),
}
