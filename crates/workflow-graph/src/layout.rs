//! Automatic layout
//!
//! Places nodes in columns by topological level: sources in the first
//! column, every other node one column right of its deepest predecessor.
//! Nodes that sit on or downstream of a cycle never get a level and are
//! stacked in one trailing column.

use std::collections::{BTreeMap, VecDeque};

use crate::graph::WorkflowGraph;
use crate::types::{NodeId, Position};

pub const COLUMN_WIDTH: f64 = 220.0;
pub const ROW_HEIGHT: f64 = 120.0;

impl WorkflowGraph {
    /// Reposition every node. Marks the graph dirty when anything moved.
    pub fn auto_layout(&mut self) {
        let columns = self.layout_columns();
        for (column, ids) in columns.iter().enumerate() {
            for (row, id) in ids.iter().enumerate() {
                let position = Position::new(column as f64 * COLUMN_WIDTH, row as f64 * ROW_HEIGHT);
                // Ids come from the node map itself
                let _ = self.set_position(*id, position);
            }
        }
        log::debug!("Laid out {} nodes in {} columns", self.node_count(), columns.len());
    }

    /// Group nodes into columns, each in step order
    fn layout_columns(&self) -> Vec<Vec<NodeId>> {
        let mut in_degree: BTreeMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        for conn in self.connections.values() {
            if let Some(deg) = in_degree.get_mut(&conn.target.node) {
                *deg += 1;
            }
        }

        let mut level: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        for id in &queue {
            level.insert(*id, 0);
        }

        while let Some(id) = queue.pop_front() {
            let next_level = level.get(&id).copied().unwrap_or(0) + 1;
            for conn in self.connections.values().filter(|c| c.source.node == id) {
                let target = conn.target.node;
                let entry = level.entry(target).or_insert(0);
                *entry = (*entry).max(next_level);
                if let Some(deg) = in_degree.get_mut(&target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }

        let mut columns: Vec<Vec<NodeId>> = Vec::new();
        let mut cyclic = Vec::new();
        for (id, deg) in &in_degree {
            if *deg > 0 {
                cyclic.push(*id);
                continue;
            }
            let column = level.get(id).copied().unwrap_or(0);
            if columns.len() <= column {
                columns.resize_with(column + 1, Vec::new);
            }
            columns[column].push(*id);
        }
        if !cyclic.is_empty() {
            columns.push(cyclic);
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{add_tool, make_lattice, tool_def};
    use crate::types::{InputTerminalDef, OutputTerminalDef, TerminalRef};

    fn passthrough() -> crate::types::ModuleDefinition {
        tool_def(
            "Pass",
            vec![InputTerminalDef::new("input", &["bam"])],
            vec![OutputTerminalDef::new("out", &["bam"])],
        )
    }

    fn connect(graph: &mut WorkflowGraph, from: NodeId, to: NodeId) {
        graph
            .create_connection(TerminalRef::output(from, "out"), TerminalRef::input(to, "input"))
            .unwrap();
    }

    #[test]
    fn test_layout_by_level() {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(&mut graph, passthrough());
        let b = add_tool(&mut graph, passthrough());
        let c = add_tool(&mut graph, passthrough());
        let d = add_tool(&mut graph, passthrough());
        connect(&mut graph, a, b);
        connect(&mut graph, b, c);
        graph.mark_saved();

        graph.auto_layout();

        let pos = |id| graph.node(id).unwrap().position;
        assert_eq!(pos(a), Position::new(0.0, 0.0));
        assert_eq!(pos(d), Position::new(0.0, ROW_HEIGHT));
        assert_eq!(pos(b), Position::new(COLUMN_WIDTH, 0.0));
        assert_eq!(pos(c), Position::new(2.0 * COLUMN_WIDTH, 0.0));
        assert!(graph.is_dirty());
    }

    #[test]
    fn test_cycle_members_go_last() {
        let mut graph = WorkflowGraph::new("test", make_lattice());
        let a = add_tool(&mut graph, passthrough());
        let x = add_tool(&mut graph, passthrough());
        let y = add_tool(&mut graph, passthrough());
        connect(&mut graph, x, y);
        connect(&mut graph, y, x);

        graph.auto_layout();

        let pos = |id| graph.node(id).unwrap().position;
        assert_eq!(pos(a), Position::new(0.0, 0.0));
        assert_eq!(pos(x), Position::new(COLUMN_WIDTH, 0.0));
        assert_eq!(pos(y), Position::new(COLUMN_WIDTH, ROW_HEIGHT));
    }
}
