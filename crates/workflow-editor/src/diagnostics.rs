//! Non-fatal problems surfaced to the host
//!
//! Nothing here stops the session. The host decides how to present them
//! (status line, modal, per-node badge).

use workflow_graph::{ConnectionId, NodeId, UpgradeDiagnostic};

/// A recoverable problem reported by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDiagnostic {
    /// Module resolution failed; the node kept its previous terminals
    ResolutionFailure { node_id: NodeId, message: String },
    /// A connection stopped type-checking, or was dropped because its
    /// terminal disappeared
    StaleConnection {
        node_id: Option<NodeId>,
        connection_id: ConnectionId,
        removed: bool,
    },
    /// A loaded step needs the user's attention
    Upgrade(UpgradeDiagnostic),
    /// The workflow was saved but the service reported problems
    SaveWarning { message: String },
    /// The save did not go through; the graph is unchanged and still dirty
    SaveFailure { message: String },
    /// A label edit clashed with another node's label
    LabelRejected {
        node_id: NodeId,
        label: String,
        existing: NodeId,
    },
}

impl std::fmt::Display for SessionDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolutionFailure { node_id, message } => {
                write!(f, "Failed to resolve node {}: {}", node_id, message)
            }
            Self::StaleConnection {
                connection_id,
                removed: true,
                ..
            } => {
                write!(
                    f,
                    "Connection {} was removed: its terminal no longer exists",
                    connection_id
                )
            }
            Self::StaleConnection { connection_id, .. } => {
                write!(f, "Connection {} is no longer valid", connection_id)
            }
            Self::Upgrade(diag) => {
                write!(f, "Step {}: {}", diag.step.saturating_add(1), diag.message)
            }
            Self::SaveWarning { message } => write!(f, "Saved with warnings: {}", message),
            Self::SaveFailure { message } => write!(f, "Saving workflow failed: {}", message),
            Self::LabelRejected { label, existing, .. } => {
                write!(
                    f,
                    "Duplicate label '{}' (already used by node {})",
                    label, existing
                )
            }
        }
    }
}
