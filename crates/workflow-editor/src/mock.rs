//! In-memory workflow service for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use workflow_graph::{
    DatatypeLattice, InputTerminalDef, ModuleDefinition, OutputTerminalDef, WorkflowDocument,
};

use crate::error::ServiceError;
use crate::service::{BuildModuleRequest, SaveAsRequest, SaveResponse, WorkflowService};

pub(crate) fn make_lattice() -> DatatypeLattice {
    let _ = env_logger::builder().is_test(true).try_init();
    DatatypeLattice::new()
        .with_extension("bam", "Bam")
        .with_extension("sam", "Sam")
        .with_extension("vcf", "Vcf")
        .with_extension("tabular", "Tabular")
        .with_ancestor("Sam", "Tabular")
}

pub(crate) fn definition(
    name: &str,
    inputs: Vec<InputTerminalDef>,
    outputs: Vec<OutputTerminalDef>,
) -> ModuleDefinition {
    ModuleDefinition {
        name: name.to_string(),
        data_inputs: inputs,
        data_outputs: outputs,
        ..Default::default()
    }
}

/// Modules are looked up by content id, or by kind for content-less modules
#[derive(Default)]
pub(crate) struct MockService {
    pub definitions: Mutex<HashMap<String, ModuleDefinition>>,
    pub workflows: Mutex<HashMap<String, serde_json::Value>>,
    pub saved: Mutex<Vec<(String, WorkflowDocument)>>,
    pub saved_as: Mutex<Vec<SaveAsRequest>>,
    pub save_errors: Mutex<Vec<String>>,
    pub fail_saves: AtomicBool,
    pub build_calls: AtomicUsize,
}

impl MockService {
    pub fn new() -> Self {
        let service = Self::default();
        service.define(
            "data_input",
            definition("Input dataset", vec![], vec![OutputTerminalDef::new("output", &["input"])]),
        );
        service.define(
            "align",
            definition("Align", vec![], vec![OutputTerminalDef::new("out", &["bam"])]),
        );
        service.define(
            "call",
            definition(
                "Call",
                vec![InputTerminalDef::new("input", &["bam", "sam"])],
                vec![OutputTerminalDef::new("calls", &["vcf"])],
            ),
        );
        service
    }

    pub fn define(&self, key: &str, definition: ModuleDefinition) {
        self.definitions
            .lock()
            .unwrap()
            .insert(key.to_string(), definition);
    }

    pub fn store(&self, id: &str, document: serde_json::Value) {
        self.workflows
            .lock()
            .unwrap()
            .insert(id.to_string(), document);
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkflowService for MockService {
    async fn build_module(&self, request: &BuildModuleRequest) -> Result<ModuleDefinition, ServiceError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let key = request
            .content_id
            .clone()
            .unwrap_or_else(|| request.kind.to_string());
        self.definitions
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ServiceError::Unavailable(format!("Unknown module '{}'", key)))
    }

    async fn load_workflow(&self, id: &str) -> Result<serde_json::Value, ServiceError> {
        self.workflows
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::Status {
                status: 404,
                body: format!("No workflow {}", id),
            })
    }

    async fn save_workflow(&self, id: &str, document: &WorkflowDocument) -> Result<SaveResponse, ServiceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ServiceError::Status {
                status: 500,
                body: "database is locked".to_string(),
            });
        }
        self.saved
            .lock()
            .unwrap()
            .push((id.to_string(), document.clone()));
        let errors = self.save_errors.lock().unwrap().clone();
        Ok(SaveResponse {
            name: format!("{} (stored)", document.name),
            message: Some(format!("Workflow '{}' saved", document.name)),
            errors: (!errors.is_empty()).then_some(errors),
        })
    }

    async fn save_workflow_as(&self, request: &SaveAsRequest) -> Result<String, ServiceError> {
        let mut saved_as = self.saved_as.lock().unwrap();
        saved_as.push(request.clone());
        Ok(format!("copy-{}", saved_as.len()))
    }

    async fn datatypes_mapping(&self) -> Result<DatatypeLattice, ServiceError> {
        Ok(make_lattice())
    }
}
