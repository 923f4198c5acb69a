//! Change events for the rendering collaborator
//!
//! The graph never draws anything itself. Every structural change is
//! reported through an [`EventSink`] so a canvas (or any other consumer)
//! can redraw the affected nodes and connections.

use std::sync::{mpsc, Mutex};

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, NodeId};

/// Receiver of graph change events. Implemented by whatever bridges the
/// graph to a canvas.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Failures are logged by the graph and never undo
    /// the change that caused the event.
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// An event could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Event receiver is gone")]
    Disconnected,
    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

/// Events emitted when the graph changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A node was created
    #[serde(rename_all = "camelCase")]
    NodeAdded { node_id: NodeId },

    /// A node and its connections were removed
    #[serde(rename_all = "camelCase")]
    NodeRemoved { node_id: NodeId },

    /// A node's terminals, configuration, label or position changed
    #[serde(rename_all = "camelCase")]
    NodeChanged { node_id: NodeId },

    /// A connection was created
    #[serde(rename_all = "camelCase")]
    ConnectionAdded { connection_id: ConnectionId },

    /// A connection was removed
    #[serde(rename_all = "camelCase")]
    ConnectionRemoved { connection_id: ConnectionId },

    /// A connection's validity was re-checked
    #[serde(rename_all = "camelCase")]
    ConnectionRevalidated {
        connection_id: ConnectionId,
        valid: bool,
    },

    /// The whole graph was replaced (load, undo)
    GraphReplaced,
}

/// Discards every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Buffers events in memory, for hosts that poll and for tests
pub struct VecEventSink {
    events: Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError::Delivery("event buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl EventSink for mpsc::Sender<GraphEvent> {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        mpsc::Sender::send(self, event).map_err(|_| EventError::Disconnected)
    }
}
