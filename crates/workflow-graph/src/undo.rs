//! Undo/redo using compressed snapshots
//!
//! Each snapshot is the serialized [`WorkflowDocument`] of the graph,
//! zstd-compressed. Restoring a snapshot rebuilds the graph through the
//! regular document loader, so individual edits never need an inverse.

use std::collections::VecDeque;

use crate::document::WorkflowDocument;
use crate::error::{GraphError, Result};
use crate::graph::WorkflowGraph;

/// Default number of snapshots kept
pub const DEFAULT_MAX_SNAPSHOTS: usize = 100;

const COMPRESSION_LEVEL: i32 = 3;

/// One compressed document
#[derive(Clone, PartialEq, Eq)]
struct Snapshot(Vec<u8>);

impl Snapshot {
    fn capture(doc: &WorkflowDocument) -> Result<Self> {
        let json = serde_json::to_vec(doc)?;
        zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map(Snapshot)
            .map_err(|e| GraphError::Compression(e.to_string()))
    }

    fn restore(&self) -> Result<WorkflowDocument> {
        let json =
            zstd::decode_all(&self.0[..]).map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Undo/redo history of compressed document snapshots.
///
/// The snapshot the graph currently matches sits between two stacks: older
/// ones to undo to, newer ones to redo to.
pub struct UndoStack {
    past: VecDeque<Snapshot>,
    present: Option<Snapshot>,
    future: Vec<Snapshot>,
    max_snapshots: usize,
}

impl UndoStack {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: None,
            future: Vec::new(),
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Record the graph's current state. Drops the redo history.
    ///
    /// Returns false when the state equals the latest snapshot and nothing
    /// was recorded.
    pub fn push(&mut self, graph: &WorkflowGraph) -> Result<bool> {
        self.push_document(&graph.to_document())
    }

    pub fn push_document(&mut self, doc: &WorkflowDocument) -> Result<bool> {
        let snapshot = Snapshot::capture(doc)?;
        if self.present.as_ref() == Some(&snapshot) {
            return Ok(false);
        }

        self.future.clear();
        if let Some(previous) = self.present.replace(snapshot) {
            self.past.push_back(previous);
        }
        while self.past.len() + 1 > self.max_snapshots {
            self.past.pop_front();
        }
        Ok(true)
    }

    /// Step back one snapshot, or None at the oldest one
    pub fn undo(&mut self) -> Option<Result<WorkflowDocument>> {
        let previous = self.past.pop_back()?;
        if let Some(present) = self.present.replace(previous) {
            self.future.push(present);
        }
        self.current()
    }

    /// Step forward one snapshot, or None at the newest one
    pub fn redo(&mut self) -> Option<Result<WorkflowDocument>> {
        let next = self.future.pop()?;
        if let Some(present) = self.present.replace(next) {
            self.past.push_back(present);
        }
        self.current()
    }

    /// The snapshot the graph is expected to match
    pub fn current(&self) -> Option<Result<WorkflowDocument>> {
        self.present.as_ref().map(Snapshot::restore)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn len(&self) -> usize {
        self.past.len() + self.future.len() + usize::from(self.present.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_none()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.present = None;
        self.future.clear();
    }

    /// Total compressed size of all snapshots, in bytes
    pub fn compressed_size(&self) -> usize {
        self.past
            .iter()
            .chain(self.present.iter())
            .chain(self.future.iter())
            .map(|s| s.0.len())
            .sum()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}
