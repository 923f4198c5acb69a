//! Workflow Graph - Typed model of a workflow under edition
//!
//! This crate holds everything about a workflow that does not need the
//! network:
//!
//! - Nodes with typed input/output terminals and the connections between them
//! - Connection checks against a datatype lattice (subtypes, wildcard, multiplicity)
//! - Revalidation when a node's terminals are rebuilt by module resolution
//! - The persisted step-index document format, with lenient loading that
//!   reports schema drift as per-step diagnostics
//! - Compressed snapshot-based undo/redo
//!
//! # Architecture
//!
//! - `WorkflowGraph`: owns nodes and connections, keeps them consistent and
//!   tracks the dirty state
//! - `DatatypeLattice`: immutable type compatibility mapping, shared via `Arc`
//! - `EventSink`: change notifications for whatever renders the graph
//! - `WorkflowDocument`: serialized form; nodes get step indices only here
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow_graph::{DatatypeLattice, ModuleKind, TerminalRef, WorkflowGraph};
//!
//! let lattice = Arc::new(DatatypeLattice::new().with_extension("bam", "Bam"));
//! let mut graph = WorkflowGraph::new("Mapping", lattice);
//! let reads = graph.add_node(ModuleKind::DataInput, None);
//! let bwa = graph.add_node(ModuleKind::Tool, Some("bwa".to_string()));
//! // ... apply module definitions, then:
//! graph.create_connection(TerminalRef::output(reads, "output"), TerminalRef::input(bwa, "reads"))?;
//! ```

pub mod builder;
pub mod codec;
pub mod datatypes;
pub mod document;
pub mod error;
pub mod events;
pub mod graph;
pub mod layout;
pub mod outputs;
pub mod parameters;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::DocumentBuilder;
pub use codec::{deserialize, format_upgrade_report, serialize, DocumentLoad, UpgradeDiagnostic};
pub use datatypes::{DatatypeLattice, WILDCARD_TYPE};
pub use document::{CodecError, InputConnection, StepIndex, StepOutputRef, StepRecord, WorkflowDocument};
pub use error::{GraphError, Result};
pub use events::{EventError, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use graph::{RevalidationReport, WorkflowGraph};
pub use outputs::{PostActionChanges, HIDE_DATASET_ACTION};
pub use types::{
    Capabilities, ConfigValues, Connection, ConnectionId, Direction, InputTerminal,
    InputTerminalDef, ModuleDefinition, ModuleKind, Node, NodeId, OutputTerminal,
    OutputTerminalDef, PostJobAction, Position, TerminalRef, WorkflowOutput,
};
pub use undo::UndoStack;
pub use validation::{validate_workflow, GraphDiagnostic};
