//! Input terminal id -> network terminal.
//!
//! Only terminals of equipment that became network equipment are mapped. Switch
//! ends are not: switches are edges of the topology view and carry no terminals.

use std::collections::HashMap;

use gat_core::TerminalIdx;

#[derive(Debug, Default)]
pub struct TerminalMapping {
    terminals: HashMap<String, TerminalIdx>,
    /// First mapped terminal at each topological node
    by_topological_node: HashMap<String, TerminalIdx>,
}

impl TerminalMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cgmes_terminal: &str, terminal: TerminalIdx, topological_node: Option<&str>) {
        self.terminals.insert(cgmes_terminal.to_string(), terminal);
        if let Some(tn) = topological_node {
            self.by_topological_node
                .entry(tn.to_string())
                .or_insert(terminal);
        }
    }

    pub fn find(&self, cgmes_terminal: &str) -> Option<TerminalIdx> {
        self.terminals.get(cgmes_terminal).copied()
    }

    pub fn find_from_topological_node(&self, topological_node: &str) -> Option<TerminalIdx> {
        self.by_topological_node.get(topological_node).copied()
    }

    pub fn len(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }
}
