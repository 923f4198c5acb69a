//! Workflow Editor - Editing sessions backed by a workflow service
//!
//! This crate wraps a [`workflow_graph::WorkflowGraph`] in an
//! [`EditorSession`] that talks to the workflow service:
//!
//! - Module resolution with per-node single-flight semantics
//! - The active node's form and its deferred flush
//! - Save, save-as and load, with dirty tracking across in-flight saves
//! - Diagnostics the host shows without interrupting the user
//!
//! # Architecture
//!
//! - `WorkflowService`: async trait at the network seam; `HttpWorkflowService`
//!   is the reqwest implementation
//! - `EditorSession`: single-threaded owner of the graph. Long operations
//!   are split into `begin_*` / `complete_*` halves so responses can be
//!   applied after the fact and stale ones dropped
//! - `EditorConfig`: JSON file plus environment overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use workflow_editor::{EditorConfig, EditorSession, HttpWorkflowService};
//!
//! let config = EditorConfig::from_json_file("editor.json")?;
//! let service = Arc::new(HttpWorkflowService::new(&config)?);
//! let mut session = EditorSession::new(service, config);
//! session.refresh_datatypes().await?;
//! let diagnostics = session.load("f2db41e1fa331b3e").await?;
//! println!("{}", session.upgrade_report(&diagnostics));
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod resolution;
pub mod service;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

// Re-export key types
pub use config::EditorConfig;
pub use diagnostics::SessionDiagnostic;
pub use error::{ConfigError, Result, ServiceError, SessionError};
pub use http::HttpWorkflowService;
pub use resolution::{ResolutionOutcome, ResolutionTicket, ResolutionTracker};
pub use service::{BuildModuleRequest, SaveAsRequest, SaveRequest, SaveResponse, WorkflowService};
pub use session::{
    CloseDecision, EditorSession, FormEdits, SaveOutcome, SaveStart, SaveTicket, SessionState,
};
