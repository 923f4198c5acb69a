//! Workflow parameters
//!
//! A workflow parameter is a `${name}` placeholder inside a string
//! configuration value or a post job action argument. The runner asks for
//! a value for each one.

use std::collections::BTreeSet;

use crate::graph::WorkflowGraph;

impl WorkflowGraph {
    /// Names of all `${...}` parameters used anywhere in the graph, sorted
    /// and de-duplicated
    pub fn workflow_parameters(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for node in self.nodes() {
            for value in node.config_values.values() {
                collect_from_value(value, &mut names);
            }
            for action in node.post_job_actions.values() {
                for value in action.action_arguments.values() {
                    collect_from_value(value, &mut names);
                }
            }
        }
        names.into_iter().collect()
    }
}

fn collect_from_value(value: &serde_json::Value, names: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::String(s) => names.extend(scan_parameters(s)),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_from_value(item, names);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_from_value(item, names);
            }
        }
        _ => {}
    }
}

/// Find `${name}` placeholders in a string. The name runs to the first
/// closing brace and must not be empty.
pub fn scan_parameters(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        // The name is never empty, so the first character is never the end
        let Some(first) = after.chars().next() else {
            break;
        };
        let skip = first.len_utf8();
        let Some(end) = after[skip..].find('}').map(|i| i + skip) else {
            break;
        };
        found.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    found
}
