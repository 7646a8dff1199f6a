//! Node/terminal index allocation for node-breaker voltage levels.
//!
//! Every external id (a connectivity node or a terminal) gets one integer node
//! per voltage level, handed out on first request. The voltage level's topology
//! view grows in blocks as indices are handed out.
//!
//! [`NodeMapping::link`] attaches a terminal to its connectivity node. A connected
//! terminal gets an internal connection; a disconnected one gets a fictitious,
//! normally-open breaker so that "same place, but isolated" survives the
//! conversion.

use std::collections::HashMap;

use gat_core::{Diagnostics, Network, Switch, SwitchKind, VoltageLevelIdx};
use tracing::trace;

use crate::config::FictitiousSwitchesMode;
use crate::error::Result;

#[derive(Debug, Default)]
struct LevelNodes {
    by_id: HashMap<String, usize>,
    next: usize,
}

#[derive(Debug, Default)]
pub struct NodeMapping {
    levels: HashMap<VoltageLevelIdx, LevelNodes>,
}

/// How [`NodeMapping::link`] joined a terminal to its connectivity node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    InternalConnection,
    FictitiousSwitch,
}

impl NodeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node of `id` in `vl`, allocating the next free index on first use.
    pub fn allocate(&mut self, network: &mut Network, vl: VoltageLevelIdx, id: &str) -> Result<usize> {
        let level = self.levels.entry(vl).or_default();
        if let Some(&node) = level.by_id.get(id) {
            return Ok(node);
        }
        let node = level.next;
        network.ensure_node(vl, node)?;
        level.next += 1;
        level.by_id.insert(id.to_string(), node);
        trace!(voltage_level = vl.value(), id, node, "allocated node");
        Ok(node)
    }

    pub fn node(&self, vl: VoltageLevelIdx, id: &str) -> Option<usize> {
        self.levels.get(&vl)?.by_id.get(id).copied()
    }

    /// Number of nodes handed out in `vl`.
    pub fn allocated(&self, vl: VoltageLevelIdx) -> usize {
        self.levels.get(&vl).map_or(0, |l| l.next)
    }

    /// Attach `terminal_id` to `connectivity_id`; returns the terminal's node.
    #[allow(clippy::too_many_arguments)]
    pub fn link(
        &mut self,
        network: &mut Network,
        diagnostics: &mut Diagnostics,
        vl: VoltageLevelIdx,
        terminal_id: &str,
        connectivity_id: &str,
        connected: bool,
        mode: FictitiousSwitchesMode,
        terminal_of_switch: bool,
    ) -> Result<(usize, LinkKind)> {
        let terminal_node = self.allocate(network, vl, terminal_id)?;
        let cn_node = self.allocate(network, vl, connectivity_id)?;

        if !connected && mode.creates_switch(terminal_of_switch) {
            network.new_switch(Switch {
                id: format!("{}_FICT_SW", terminal_id),
                name: None,
                kind: SwitchKind::Breaker,
                voltage_level: vl,
                node1: cn_node,
                node2: terminal_node,
                open: true,
                retained: false,
                fictitious: true,
            })?;
            return Ok((terminal_node, LinkKind::FictitiousSwitch));
        }
        if !connected {
            diagnostics.ignored(
                format!("Terminal {}", terminal_id),
                "Disconnected terminal attached with an internal connection",
            );
        }
        network.new_internal_connection(vl, terminal_node, cn_node)?;
        Ok((terminal_node, LinkKind::InternalConnection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::{Kilovolts, TopologyKind, VoltageLevelParams, NODE_BLOCK};

    fn network_with_level() -> (Network, VoltageLevelIdx) {
        let mut network = Network::new("test");
        let vl = network
            .new_voltage_level(VoltageLevelParams {
                id: "VL".into(),
                name: None,
                substation: None,
                nominal_v: Kilovolts(110.0),
                low_voltage_limit: None,
                high_voltage_limit: None,
                topology_kind: TopologyKind::NodeBreaker,
            })
            .unwrap();
        (network, vl)
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let (mut network, vl) = network_with_level();
        let mut nodes = NodeMapping::new();
        let a = nodes.allocate(&mut network, vl, "CN1").unwrap();
        let b = nodes.allocate(&mut network, vl, "CN2").unwrap();
        assert_eq!(nodes.allocate(&mut network, vl, "CN1").unwrap(), a);
        assert_ne!(a, b);
        assert_eq!(nodes.allocated(vl), 2);
    }

    #[test]
    fn test_capacity_grows_in_blocks() {
        let (mut network, vl) = network_with_level();
        let mut nodes = NodeMapping::new();
        let mut last_count = 0;
        for i in 0..(NODE_BLOCK + 1) {
            nodes.allocate(&mut network, vl, &format!("N{i}")).unwrap();
            assert!(nodes.allocated(vl) >= last_count);
            last_count = nodes.allocated(vl);
        }
        let capacity = network.voltage_level(vl).unwrap().view.capacity();
        assert_eq!(capacity, 2 * NODE_BLOCK);
    }

    #[test]
    fn test_connected_terminal_gets_internal_connection() {
        let (mut network, vl) = network_with_level();
        let mut nodes = NodeMapping::new();
        let mut diag = Diagnostics::new();
        let (node, kind) = nodes
            .link(&mut network, &mut diag, vl, "T1", "CN1", true, FictitiousSwitchesMode::Always, false)
            .unwrap();
        assert_eq!(kind, LinkKind::InternalConnection);
        let view = &network.voltage_level(vl).unwrap().view;
        assert_eq!(view.internal_connection_count(), 1);
        assert!(view.has_link(node, nodes.node(vl, "CN1").unwrap(), gat_core::Link::Internal));
        assert_eq!(network.stats().num_switches, 0);
    }

    #[test]
    fn test_disconnected_terminal_gets_one_fictitious_open_switch() {
        let (mut network, vl) = network_with_level();
        let mut nodes = NodeMapping::new();
        let mut diag = Diagnostics::new();
        nodes.allocate(&mut network, vl, "CN1").unwrap();
        let (_, kind) = nodes
            .link(&mut network, &mut diag, vl, "T1", "CN1", false, FictitiousSwitchesMode::Always, false)
            .unwrap();
        assert_eq!(kind, LinkKind::FictitiousSwitch);

        let stats = network.stats();
        assert_eq!(stats.num_switches, 1);
        assert_eq!(stats.num_fictitious_switches, 1);
        assert_eq!(stats.num_internal_connections, 0);
        let sw = network.find_switch("T1_FICT_SW").unwrap();
        assert!(network.switch(sw).unwrap().open);
    }

    #[test]
    fn test_mode_never_falls_back_to_internal_connection() {
        let (mut network, vl) = network_with_level();
        let mut nodes = NodeMapping::new();
        let mut diag = Diagnostics::new();
        let (_, kind) = nodes
            .link(&mut network, &mut diag, vl, "T1", "CN1", false, FictitiousSwitchesMode::Never, false)
            .unwrap();
        assert_eq!(kind, LinkKind::InternalConnection);
        assert_eq!(diag.count(gat_core::IssueKind::Ignored), 1);
    }
}
