//! Editor session
//!
//! [`EditorSession`] owns one workflow graph and everything around it: the
//! workflow service, the pending module resolutions, the active node's form
//! edits, undo snapshots and the diagnostics waiting to be shown.
//!
//! Network round trips are the only suspension points. Operations that
//! wait on the service come in two halves (`begin_*` / `complete_*` or
//! `finish_*`) so a host can keep editing while a request is in flight; the
//! async helpers simply compose both halves around the service call.

use std::sync::Arc;

use futures_util::future::join_all;
use workflow_graph::{
    format_upgrade_report, ConfigValues, DatatypeLattice, DocumentLoad, EventSink, GraphDiagnostic,
    GraphError, ModuleDefinition, ModuleKind, NodeId, RevalidationReport, UndoStack,
    UpgradeDiagnostic, WorkflowDocument, WorkflowGraph,
};

use crate::config::EditorConfig;
use crate::diagnostics::SessionDiagnostic;
use crate::error::{Result, ServiceError, SessionError};
use crate::resolution::{ResolutionOutcome, ResolutionTicket, ResolutionTracker};
use crate::service::{BuildModuleRequest, SaveAsRequest, SaveResponse, WorkflowService};

/// Prefix for the default name of a saved copy
const SAVED_AS_PREFIX: &str = "SavedAs_";

/// Save state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Matches what the service has stored
    Clean,
    /// Has unsaved modifications
    Dirty,
    /// A save request is in flight
    Saving,
}

/// What the host should do when the user closes the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Proceed,
    /// Unsaved changes exist; ask before discarding them
    ConfirmDiscard,
}

/// Pending, not yet applied edits of the active node's form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormEdits {
    /// Changed configuration fields
    pub values: ConfigValues,
    /// New label; an empty string clears it
    pub label: Option<String>,
    pub annotation: Option<String>,
}

impl FormEdits {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.label.is_none() && self.annotation.is_none()
    }
}

#[derive(Debug)]
struct ActiveForm {
    node: NodeId,
    edits: FormEdits,
}

/// First half of a save
#[derive(Debug)]
pub enum SaveStart {
    /// Nothing changed since the last save
    Unchanged,
    Started(SaveTicket),
}

/// A save in flight: the document to send and where to send it
#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub workflow_id: String,
    pub document: WorkflowDocument,
    /// Graph revision the document was taken at
    revision: u64,
}

/// Result of a completed save
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Unchanged,
    Saved {
        /// Canonical name returned by the service
        name: String,
        message: Option<String>,
        /// False when the graph was edited while the save was in flight
        clean: bool,
    },
}

/// An editing session on one workflow
pub struct EditorSession {
    service: Arc<dyn WorkflowService>,
    config: EditorConfig,
    workflow_id: Option<String>,
    graph: WorkflowGraph,
    resolutions: ResolutionTracker,
    active: Option<ActiveForm>,
    undo: UndoStack,
    diagnostics: Vec<SessionDiagnostic>,
    save_in_flight: bool,
}

impl EditorSession {
    /// Start a session on a new, empty workflow
    pub fn new(service: Arc<dyn WorkflowService>, config: EditorConfig) -> Self {
        let graph = WorkflowGraph::new(
            config.workflow_name.clone(),
            Arc::new(DatatypeLattice::new()),
        );
        let mut session = Self {
            service,
            undo: UndoStack::new(config.max_undo_snapshots),
            config,
            workflow_id: None,
            graph,
            resolutions: ResolutionTracker::new(),
            active: None,
            diagnostics: Vec::new(),
            save_in_flight: false,
        };
        session.reset_undo();
        session
    }

    pub fn with_datatypes(mut self, datatypes: DatatypeLattice) -> Self {
        self.graph.set_datatypes(Arc::new(datatypes));
        self
    }

    /// Route graph change events to the given sink
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.graph.set_event_sink(events);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Direct access for edits that need no session bookkeeping
    /// (connections, positions, post job actions...)
    pub fn graph_mut(&mut self) -> &mut WorkflowGraph {
        &mut self.graph
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    /// Attach the session to a stored workflow without loading it
    pub fn set_workflow_id(&mut self, id: impl Into<String>) {
        self.workflow_id = Some(id.into());
    }

    pub fn state(&self) -> SessionState {
        if self.save_in_flight {
            SessionState::Saving
        } else if self.is_dirty() {
            SessionState::Dirty
        } else {
            SessionState::Clean
        }
    }

    /// Whether unsaved changes exist, counting unflushed form edits
    pub fn is_dirty(&self) -> bool {
        self.graph.is_dirty() || self.active.as_ref().is_some_and(|a| !a.edits.is_empty())
    }

    pub fn diagnostics(&self) -> &[SessionDiagnostic] {
        &self.diagnostics
    }

    /// Hand the collected diagnostics to the host
    pub fn take_diagnostics(&mut self) -> Vec<SessionDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn validate(&self) -> Vec<GraphDiagnostic> {
        self.graph.validate()
    }

    fn report(&mut self, diagnostic: SessionDiagnostic) {
        log::info!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    // ------------------------------------------------------------------
    // Datatypes
    // ------------------------------------------------------------------

    /// Fetch the datatype mapping and re-check every connection against it
    pub async fn refresh_datatypes(&mut self) -> Result<()> {
        let lattice = self.service.datatypes_mapping().await?;
        let reports = self.graph.set_datatypes(Arc::new(lattice));
        for report in &reports {
            self.report_revalidation(report);
        }
        Ok(())
    }

    fn report_revalidation(&mut self, report: &RevalidationReport) {
        for connection_id in &report.invalid {
            self.report(SessionDiagnostic::StaleConnection {
                node_id: report.node,
                connection_id: *connection_id,
                removed: false,
            });
        }
        for conn in &report.removed {
            self.report(SessionDiagnostic::StaleConnection {
                node_id: report.node,
                connection_id: conn.id,
                removed: true,
            });
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node and resolve its module
    pub async fn add_node(&mut self, kind: ModuleKind, content_id: Option<String>) -> Result<NodeId> {
        let id = self.graph.add_node(kind, content_id);
        self.resolve_node(id).await?;
        Ok(id)
    }

    /// Remove a node. A resolution still in flight for it is ignored.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        self.graph.remove_node(id)?;
        self.resolutions.forget(id);
        if self.active.as_ref().is_some_and(|a| a.node == id) {
            self.active = None;
        }
        Ok(())
    }

    /// Change a node's label, reporting a clash as a diagnostic
    pub fn rename_label(&mut self, id: NodeId, label: Option<String>) -> Result<()> {
        match self.graph.rename_label(id, label) {
            Err(GraphError::DuplicateLabel { label, existing }) => {
                self.report(SessionDiagnostic::LabelRejected {
                    node_id: id,
                    label: label.clone(),
                    existing,
                });
                Err(GraphError::DuplicateLabel { label, existing }.into())
            }
            other => Ok(other?),
        }
    }

    // ------------------------------------------------------------------
    // Module resolution
    // ------------------------------------------------------------------

    /// Start resolving a node. Supersedes any pending resolution for it.
    pub fn begin_resolution(&mut self, id: NodeId) -> Result<(ResolutionTicket, BuildModuleRequest)> {
        let node = self.graph.node(id).ok_or(GraphError::UnknownNode(id))?;
        let request = BuildModuleRequest {
            kind: node.kind,
            content_id: node.content_id.clone(),
            inputs: node.config_values.clone(),
        };
        Ok((self.resolutions.begin(id), request))
    }

    /// Apply the result of a resolution, unless it was superseded or its
    /// node was deleted in the meantime
    pub fn complete_resolution(
        &mut self,
        ticket: ResolutionTicket,
        result: std::result::Result<ModuleDefinition, ServiceError>,
    ) -> ResolutionOutcome {
        let id = ticket.node;
        if !self.graph.contains_node(id) {
            self.resolutions.forget(id);
            log::debug!("Ignoring resolution for deleted node {}", id);
            return ResolutionOutcome::NodeGone;
        }
        if !self.resolutions.complete(&ticket) {
            log::debug!("Ignoring superseded resolution for node {}", id);
            return ResolutionOutcome::Superseded;
        }

        let message = match result {
            Ok(definition) => match self.graph.apply_module_definition(id, definition) {
                Ok(report) => {
                    self.report_revalidation(&report);
                    return ResolutionOutcome::Applied(report);
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        log::warn!("Resolution of node {} failed: {}", id, message);
        self.report(SessionDiagnostic::ResolutionFailure {
            node_id: id,
            message: message.clone(),
        });
        ResolutionOutcome::Failed(message)
    }

    /// Resolve one node against the service
    pub async fn resolve_node(&mut self, id: NodeId) -> Result<ResolutionOutcome> {
        let (ticket, request) = self.begin_resolution(id)?;
        let result = self.service.build_module(&request).await;
        Ok(self.complete_resolution(ticket, result))
    }

    /// Resolve every node still lacking a module definition, concurrently.
    /// Results are applied one by one in node order.
    pub async fn resolve_unresolved(&mut self) -> Vec<ResolutionOutcome> {
        let ids: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| !n.resolved && n.kind.capabilities().resolvable)
            .map(|n| n.id)
            .collect();
        let started: Vec<(ResolutionTicket, BuildModuleRequest)> = ids
            .into_iter()
            .filter_map(|id| self.begin_resolution(id).ok())
            .collect();
        if started.is_empty() {
            return Vec::new();
        }
        log::debug!("Resolving {} nodes", started.len());

        let service = Arc::clone(&self.service);
        let results = join_all(
            started
                .iter()
                .map(|(_, request)| service.build_module(request)),
        )
        .await;

        started
            .into_iter()
            .zip(results)
            .map(|((ticket, _), result)| self.complete_resolution(ticket, result))
            .collect()
    }

    // ------------------------------------------------------------------
    // Active form
    // ------------------------------------------------------------------

    /// Make a node the one whose form is being edited. Pending edits of the
    /// previously active node are flushed first.
    pub async fn activate_node(&mut self, id: NodeId) -> Result<()> {
        if !self.graph.contains_node(id) {
            return Err(GraphError::UnknownNode(id).into());
        }
        self.flush_active_form().await;
        self.active = Some(ActiveForm {
            node: id,
            edits: FormEdits::default(),
        });
        Ok(())
    }

    pub async fn clear_active_node(&mut self) {
        self.flush_active_form().await;
        self.active = None;
    }

    pub fn active_node(&self) -> Option<NodeId> {
        self.active.as_ref().map(|a| a.node)
    }

    /// Pending edits of the active node's form
    pub fn active_form_mut(&mut self) -> Option<&mut FormEdits> {
        self.active.as_mut().map(|a| &mut a.edits)
    }

    /// Apply the active form's pending edits to the graph.
    ///
    /// Returns the node when its configuration changed and it therefore
    /// needs to be resolved again.
    pub fn check_changes_in_active_form(&mut self) -> Option<NodeId> {
        let active = self.active.as_mut()?;
        let id = active.node;
        let edits = std::mem::take(&mut active.edits);
        if edits.is_empty() || !self.graph.contains_node(id) {
            return None;
        }

        let revision = self.graph.revision();
        if let Err(e) = self.graph.update_config_values(id, edits.values) {
            log::warn!("Failed to apply form values to node {}: {}", id, e);
        }
        let config_changed = self.graph.revision() != revision;

        if let Some(label) = edits.label {
            // Clashes are reported as diagnostics by rename_label
            let _ = self.rename_label(id, Some(label));
        }
        if let Some(annotation) = edits.annotation {
            if let Err(e) = self.graph.set_node_annotation(id, annotation) {
                log::warn!("Failed to apply annotation to node {}: {}", id, e);
            }
        }

        config_changed.then_some(id)
    }

    /// Flush the active form and re-resolve its node when needed
    pub async fn flush_active_form(&mut self) {
        if let Some(id) = self.check_changes_in_active_form() {
            if let Err(e) = self.resolve_node(id).await {
                log::warn!("Failed to re-resolve node {}: {}", id, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Prepare a save: flush the form and serialize with hidden outputs
    /// normalized. The graph itself is only normalized once the save
    /// succeeds. The session is `Saving` until [`Self::finish_save`].
    pub fn begin_save(&mut self) -> Result<SaveStart> {
        if self.save_in_flight {
            return Err(SessionError::SaveInProgress);
        }
        self.check_changes_in_active_form();
        if !self.graph.is_dirty() {
            return Ok(SaveStart::Unchanged);
        }
        let workflow_id = self.workflow_id.clone().ok_or(SessionError::NoWorkflowId)?;

        let document = self.graph.rectified_document();
        self.save_in_flight = true;
        log::debug!("Saving workflow {} ({} steps)", workflow_id, document.step_count());
        Ok(SaveStart::Started(SaveTicket {
            workflow_id,
            document,
            revision: self.graph.revision(),
        }))
    }

    /// Complete a save with the service's answer
    pub fn finish_save(
        &mut self,
        ticket: SaveTicket,
        result: std::result::Result<SaveResponse, ServiceError>,
    ) -> Result<SaveOutcome> {
        if !self.save_in_flight {
            return Err(SessionError::NoSaveInProgress);
        }
        self.save_in_flight = false;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.report(SessionDiagnostic::SaveFailure {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let clean = self.graph.revision() == ticket.revision;
        self.graph.rectify_workflow_outputs();
        if !response.name.is_empty() {
            self.graph.set_name(response.name.clone());
        }
        for message in response.errors.iter().flatten() {
            self.report(SessionDiagnostic::SaveWarning {
                message: message.clone(),
            });
        }
        if clean {
            self.graph.mark_saved();
        } else {
            log::info!("Workflow changed while saving; keeping it dirty");
        }
        if let Some(message) = &response.message {
            log::info!("{}", message);
        }
        Ok(SaveOutcome::Saved {
            name: response.name,
            message: response.message,
            clean,
        })
    }

    /// Save the workflow under its current id
    pub async fn save(&mut self) -> Result<SaveOutcome> {
        self.flush_active_form().await;
        let ticket = match self.begin_save()? {
            SaveStart::Unchanged => return Ok(SaveOutcome::Unchanged),
            SaveStart::Started(ticket) => ticket,
        };
        let result = self
            .service
            .save_workflow(&ticket.workflow_id, &ticket.document)
            .await;
        self.finish_save(ticket, result)
    }

    /// Store a copy under a new name and return its id. An empty name
    /// becomes `SavedAs_<current name>`. The session keeps editing the
    /// original workflow.
    pub async fn save_as(&mut self, name: &str, annotation: &str) -> Result<String> {
        self.flush_active_form().await;
        let workflow_name = if name.is_empty() {
            format!("{}{}", SAVED_AS_PREFIX, self.graph.name())
        } else {
            name.to_string()
        };
        let request = SaveAsRequest {
            workflow_name,
            workflow_annotation: annotation.to_string(),
            workflow_data: self.graph.rectified_document(),
        };
        match self.service.save_workflow_as(&request).await {
            Ok(id) => {
                self.graph.rectify_workflow_outputs();
                log::info!("Saved copy '{}' as {}", request.workflow_name, id);
                Ok(id)
            }
            Err(e) => {
                self.report(SessionDiagnostic::SaveFailure {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    async fn fetch_document(&self, id: &str) -> Result<WorkflowDocument> {
        let value = self.service.load_workflow(id).await?;
        Ok(WorkflowDocument::from_value(value)?)
    }

    /// Replace the graph with a stored workflow.
    ///
    /// A document that cannot be decoded leaves the session untouched.
    /// Per-step problems are returned and also queued as diagnostics; when
    /// there are any, the loaded workflow starts out dirty.
    pub async fn load(&mut self, id: &str) -> Result<Vec<UpgradeDiagnostic>> {
        let document = self.fetch_document(id).await?;

        self.active = None;
        self.resolutions.clear();
        let load = self.graph.from_document(&document, false);
        self.workflow_id = Some(id.to_string());
        if load.diagnostics.is_empty() {
            self.graph.mark_saved();
        }
        for diagnostic in &load.diagnostics {
            self.diagnostics.push(SessionDiagnostic::Upgrade(diagnostic.clone()));
        }
        self.reset_undo();
        log::info!(
            "Loaded workflow {} with {} steps",
            id,
            self.graph.node_count()
        );
        Ok(load.diagnostics)
    }

    /// Append the steps of another stored workflow to this one
    pub async fn copy_steps_from(&mut self, id: &str) -> Result<DocumentLoad> {
        let document = self.fetch_document(id).await?;
        let load = self.graph.from_document(&document, true);
        for diagnostic in &load.diagnostics {
            self.diagnostics.push(SessionDiagnostic::Upgrade(diagnostic.clone()));
        }
        log::info!("Copied {} steps from workflow {}", load.nodes.len(), id);
        Ok(load)
    }

    /// Render load diagnostics as "Step N: name" groups
    pub fn upgrade_report(&self, diagnostics: &[UpgradeDiagnostic]) -> String {
        format_upgrade_report(diagnostics, &self.graph)
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    pub fn request_close(&mut self) -> CloseDecision {
        self.check_changes_in_active_form();
        if self.graph.is_dirty() {
            CloseDecision::ConfirmDiscard
        } else {
            CloseDecision::Proceed
        }
    }

    // ------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------

    /// Record the current graph as an undo step. Returns false when
    /// nothing changed since the last checkpoint.
    pub fn checkpoint(&mut self) -> Result<bool> {
        Ok(self.undo.push(&self.graph)?)
    }

    /// Restore the previous checkpoint. Returns false when there is none.
    pub fn undo(&mut self) -> Result<bool> {
        match self.undo.undo() {
            Some(document) => {
                self.restore(&document?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply the next checkpoint. Returns false when there is none.
    pub fn redo(&mut self) -> Result<bool> {
        match self.undo.redo() {
            Some(document) => {
                self.restore(&document?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    fn restore(&mut self, document: &WorkflowDocument) {
        self.active = None;
        self.resolutions.clear();
        self.graph.from_document(document, false);
    }

    fn reset_undo(&mut self) {
        self.undo.clear();
        if let Err(e) = self.undo.push(&self.graph) {
            log::warn!("Failed to record undo snapshot: {}", e);
        }
    }
}
