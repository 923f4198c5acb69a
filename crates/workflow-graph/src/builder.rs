//! Fluent builder for workflow documents
//!
//! Handy for assembling documents programmatically, e.g. as canned service
//! responses or as templates copied into an open workflow.

use crate::document::{InputConnection, StepIndex, StepOutputRef, StepRecord, WorkflowDocument};
use crate::types::{ConfigValues, InputTerminalDef, ModuleKind, OutputTerminalDef, Position};

/// Fluent builder for [`WorkflowDocument`]s
///
/// # Example
///
/// ```ignore
/// let doc = DocumentBuilder::new("Mapping")
///     .step(ModuleKind::DataInput, None)
///     .with_output("output", &["fastqsanger"])
///     .tool("bwa")
///     .with_input("reads", &["fastqsanger"])
///     .with_output("bam", &["bam"])
///     .connect(0, "output", 1, "reads")
///     .build();
/// ```
pub struct DocumentBuilder {
    doc: WorkflowDocument,
    last: Option<StepIndex>,
}

impl DocumentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            doc: WorkflowDocument {
                name: name.into(),
                ..Default::default()
            },
            last: None,
        }
    }

    pub fn annotation(mut self, annotation: impl Into<String>) -> Self {
        self.doc.annotation = annotation.into();
        self
    }

    /// Append a step; it gets the next free index
    pub fn step(mut self, kind: ModuleKind, content_id: Option<&str>) -> Self {
        let index = self.doc.steps.keys().next_back().map_or(0, |i| i + 1);
        let mut record = StepRecord::new(index, kind);
        if let Some(content_id) = content_id {
            record.content_id = Some(content_id.to_string());
            record.name = content_id.to_string();
        }
        record.position = Position::new(index as f64 * 220.0, 0.0);
        self.doc.steps.insert(index, record);
        self.last = Some(index);
        self
    }

    /// Append a tool step
    pub fn tool(self, tool_id: &str) -> Self {
        self.step(ModuleKind::Tool, Some(tool_id))
    }

    /// Add an input terminal to the most recently added step
    pub fn with_input(self, name: &str, extensions: &[&str]) -> Self {
        self.with_input_def(InputTerminalDef::new(name, extensions))
    }

    pub fn with_input_def(mut self, def: InputTerminalDef) -> Self {
        if let Some(step) = self.last_step() {
            step.data_inputs.push(def);
        }
        self
    }

    /// Add an output terminal to the most recently added step
    pub fn with_output(mut self, name: &str, extensions: &[&str]) -> Self {
        if let Some(step) = self.last_step() {
            step.data_outputs.push(OutputTerminalDef::new(name, extensions));
        }
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        if let Some(step) = self.last_step() {
            step.label = Some(label.to_string());
        }
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        if let Some(step) = self.last_step() {
            step.name = name.to_string();
        }
        self
    }

    pub fn with_tool_state(mut self, state: ConfigValues) -> Self {
        if let Some(step) = self.last_step() {
            step.tool_state = state;
        }
        self
    }

    /// Feed `target`'s input from `source`'s output. Repeated calls for the
    /// same input accumulate into a list.
    pub fn connect(
        mut self,
        source: StepIndex,
        output_name: &str,
        target: StepIndex,
        input_name: &str,
    ) -> Self {
        let source_ref = StepOutputRef {
            id: source,
            output_name: output_name.to_string(),
        };
        if let Some(step) = self.doc.steps.get_mut(&target) {
            let mut refs = step
                .input_connections
                .remove(input_name)
                .map(|c| c.refs().to_vec())
                .unwrap_or_default();
            refs.push(source_ref);
            if let Some(conn) = InputConnection::from_refs(refs) {
                step.input_connections.insert(input_name.to_string(), conn);
            }
        }
        self
    }

    /// Attach a service upgrade message to a step
    pub fn upgrade_message(mut self, step: StepIndex, message: impl Into<String>) -> Self {
        self.doc
            .upgrade_messages
            .entry(step)
            .or_default()
            .push(message.into());
        self
    }

    pub fn build(self) -> WorkflowDocument {
        self.doc
    }

    fn last_step(&mut self) -> Option<&mut StepRecord> {
        self.last.and_then(|i| self.doc.steps.get_mut(&i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::deserialize;
    use crate::graph::tests::make_lattice;

    #[test]
    fn test_build_document() {
        let doc = DocumentBuilder::new("Mapping")
            .annotation("reads to variants")
            .step(ModuleKind::DataInput, None)
            .with_output("output", &["bam"])
            .with_label("reads")
            .tool("merge")
            .with_input_def(InputTerminalDef::new("inputs", &["bam"]).multiple())
            .connect(0, "output", 1, "inputs")
            .connect(0, "output", 1, "inputs")
            .build();

        assert_eq!(doc.step_count(), 2);
        assert_eq!(doc.annotation, "reads to variants");
        assert_eq!(doc.steps[&0].label.as_deref(), Some("reads"));
        assert_eq!(doc.steps[&1].content_id.as_deref(), Some("merge"));
        assert_eq!(doc.steps[&1].input_connections["inputs"].refs().len(), 2);
    }

    #[test]
    fn test_built_document_loads() {
        let doc = DocumentBuilder::new("Calls")
            .step(ModuleKind::DataInput, None)
            .with_output("output", &["bam"])
            .tool("caller")
            .with_input("input", &["bam"])
            .with_output("calls", &["vcf"])
            .connect(0, "output", 1, "input")
            .build();

        let (graph, diagnostics) = deserialize(&doc, make_lattice());
        assert!(diagnostics.is_empty());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.connection_count(), 1);
        assert!(graph.nodes().all(|n| n.resolved));
    }
}
