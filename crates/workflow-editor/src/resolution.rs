//! Single-flight bookkeeping for module resolution
//!
//! Each node has at most one resolution that counts: beginning a new one
//! supersedes whatever was pending for that node, and only the latest
//! ticket is honored on completion. Forgetting a node (it was deleted)
//! makes every outstanding ticket for it stale.

use std::collections::HashMap;

use workflow_graph::{NodeId, RevalidationReport};

/// Handle for one resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTicket {
    pub node: NodeId,
    generation: u64,
}

impl ResolutionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What happened to a completed resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// The definition was merged into the node
    Applied(RevalidationReport),
    /// A newer request for the same node was started; response dropped
    Superseded,
    /// The node was deleted while the request was in flight
    NodeGone,
    /// The service failed; the node kept its previous state
    Failed(String),
}

/// Tracks the latest resolution request per node
#[derive(Debug, Default)]
pub struct ResolutionTracker {
    pending: HashMap<NodeId, u64>,
    next_generation: u64,
}

impl ResolutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a resolution, superseding any pending one for the node
    pub fn begin(&mut self, node: NodeId) -> ResolutionTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        if self.pending.insert(node, generation).is_some() {
            log::debug!("Resolution of node {} superseded", node);
        }
        ResolutionTicket { node, generation }
    }

    /// Whether the ticket is still the latest one for its node
    pub fn is_current(&self, ticket: &ResolutionTicket) -> bool {
        self.pending.get(&ticket.node) == Some(&ticket.generation)
    }

    /// Finish a resolution. Returns true when its result should be applied.
    pub fn complete(&mut self, ticket: &ResolutionTicket) -> bool {
        if self.is_current(ticket) {
            self.pending.remove(&ticket.node);
            true
        } else {
            false
        }
    }

    /// Drop every pending request for a node
    pub fn forget(&mut self, node: NodeId) {
        self.pending.remove(&node);
    }

    pub fn is_pending(&self, node: NodeId) -> bool {
        self.pending.contains_key(&node)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
