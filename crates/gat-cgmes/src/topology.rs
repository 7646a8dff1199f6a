//! Equivalent terminal lookup for regulating and tie-flow references.
//!
//! Input models often name the end of a switch as the point where a regulated
//! magnitude is measured. Switches carry no terminals in the network model, so
//! the reference has to be redirected to a real equipment terminal that measures
//! the same thing:
//!
//! - voltage: any terminal electrically co-located with the switch end,
//!   regardless of switch states
//! - flow: the single equipment terminal at the far end of a chain of switches,
//!   with a sign telling whether the flow direction is preserved
//! - tie flow: like flow, but only dangling line terminals qualify
//!
//! Searches expand over the voltage level's topology view with the iterative,
//! set-based traversal of [`gat_core::TopologyView::traverse`], so chains and
//! loops of any length terminate.

use std::collections::HashSet;

use gat_core::{
    EquipmentKind, Link, Network, SwitchIdx, TerminalIdx, TraverseResult, VoltageLevelIdx,
};
use tracing::trace;

use crate::model::CgmesModel;
use crate::terminals::TerminalMapping;

/// A substitute terminal and the sign to apply to flow targets measured at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalAndSign {
    pub terminal: TerminalIdx,
    pub sign: i32,
}

/// The switch an input terminal belongs to.
#[derive(Debug, Clone, Copy)]
struct SwitchEnd {
    voltage_level: VoltageLevelIdx,
    switch: SwitchIdx,
    node1: usize,
    node2: usize,
    /// Side of the switch the input terminal is on
    side: i32,
}

pub struct RegulatingTerminalMapper<'a> {
    model: &'a CgmesModel,
    network: &'a Network,
    terminals: &'a TerminalMapping,
}

impl<'a> RegulatingTerminalMapper<'a> {
    pub fn new(model: &'a CgmesModel, network: &'a Network, terminals: &'a TerminalMapping) -> Self {
        Self {
            model,
            network,
            terminals,
        }
    }

    /// Terminal measuring the voltage at `terminal_id`.
    ///
    /// Tries the direct mapping, then an equivalent terminal around the switch
    /// the id belongs to, then any mapped terminal sharing its topological node.
    pub fn map_for_voltage_control(&self, terminal_id: &str) -> Option<TerminalIdx> {
        self.terminals
            .find(terminal_id)
            .or_else(|| self.equivalent_for_voltage(terminal_id))
            .or_else(|| {
                let terminal = self.model.terminal(terminal_id)?;
                let tn = self.model.topological_node(terminal)?;
                self.terminals.find_from_topological_node(&tn)
            })
    }

    /// Terminal measuring the flow at `terminal_id`, with the sign to apply.
    pub fn map_for_flow_control(&self, terminal_id: &str) -> Option<TerminalAndSign> {
        match self.terminals.find(terminal_id) {
            Some(terminal) => Some(TerminalAndSign { terminal, sign: 1 }),
            None => self.equivalent_for_flow(terminal_id),
        }
    }

    /// Dangling line terminal measuring the tie flow at `terminal_id`.
    pub fn map_for_tie_flow(&self, terminal_id: &str) -> Option<TerminalIdx> {
        self.terminals
            .find(terminal_id)
            .or_else(|| self.equivalent_for_tie_flow(terminal_id))
    }

    // =========================================================================
    // Switch chains
    // =========================================================================

    fn switch_end(&self, terminal_id: &str) -> Option<SwitchEnd> {
        let terminal = self.model.terminal(terminal_id)?;
        if !terminal.is_switch_end() {
            return None;
        }
        let switch = self.network.find_switch(&terminal.conducting_equipment)?;
        let sw = self.network.switch(switch)?;
        Some(SwitchEnd {
            voltage_level: sw.voltage_level,
            switch,
            node1: sw.node1,
            node2: sw.node2,
            side: terminal.sequence_number,
        })
    }

    /// Vertices reachable from `start` across switches in any state and internal
    /// connections, never crossing `except`.
    fn reachable(&self, vl: VoltageLevelIdx, start: usize, except: Option<SwitchIdx>) -> HashSet<usize> {
        let mut nodes = HashSet::from([start]);
        if let Some(level) = self.network.voltage_level(vl) {
            level.view.traverse(start, |_, link, to| match link {
                Link::Switch(sw) if Some(sw) == except => TraverseResult::TerminatePath,
                _ => {
                    nodes.insert(to);
                    TraverseResult::Continue
                }
            });
        }
        nodes
    }

    fn kind(&self, terminal: TerminalIdx) -> Option<EquipmentKind> {
        self.network.terminal_kind(terminal)
    }

    fn equivalent_for_voltage(&self, terminal_id: &str) -> Option<TerminalIdx> {
        let end = self.switch_end(terminal_id)?;
        let nodes = self.reachable(end.voltage_level, end.node1, None);
        let candidates = self.network.terminals_at(end.voltage_level, &nodes);
        trace!(terminal = terminal_id, candidates = candidates.len(), "voltage equivalent");

        let is = |t: &&TerminalIdx, f: fn(EquipmentKind) -> bool| self.kind(**t).is_some_and(f);
        candidates
            .iter()
            .find(|t| is(t, |k| k == EquipmentKind::BusbarSection))
            .or_else(|| candidates.iter().find(|t| is(t, EquipmentKind::can_regulate_voltage)))
            .or_else(|| candidates.first())
            .copied()
    }

    /// The single non-busbar terminal reachable from `from` without crossing the
    /// originating switch. Reaching `other` means the switch is bypassed.
    fn find_for_flow(&self, end: &SwitchEnd, from: usize, other: usize) -> Option<TerminalIdx> {
        let nodes = self.reachable(end.voltage_level, from, Some(end.switch));
        if nodes.contains(&other) {
            return None;
        }
        let candidates: Vec<TerminalIdx> = self
            .network
            .terminals_at(end.voltage_level, &nodes)
            .into_iter()
            .filter(|t| self.kind(*t) != Some(EquipmentKind::BusbarSection))
            .collect();
        match candidates.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    fn equivalent_for_flow(&self, terminal_id: &str) -> Option<TerminalAndSign> {
        let end = self.switch_end(terminal_id)?;
        let at_end1 = self.find_for_flow(&end, end.node1, end.node2);
        let at_end2 = self.find_for_flow(&end, end.node2, end.node1);

        // A terminal found beyond the opposite end sees the flow in the same
        // direction as the switch end; one found behind it sees it reversed.
        let (opposite, same) = match end.side {
            1 => (at_end2, at_end1),
            2 => (at_end1, at_end2),
            _ => return None,
        };
        opposite
            .map(|terminal| TerminalAndSign { terminal, sign: 1 })
            .or_else(|| same.map(|terminal| TerminalAndSign { terminal, sign: -1 }))
    }

    fn equivalent_for_tie_flow(&self, terminal_id: &str) -> Option<TerminalIdx> {
        let end = self.switch_end(terminal_id)?;
        [
            self.find_for_flow(&end, end.node1, end.node2),
            self.find_for_flow(&end, end.node2, end.node1),
        ]
        .into_iter()
        .flatten()
        .find(|t| self.kind(*t) == Some(EquipmentKind::DanglingLine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRecords;
    use crate::records::PropertyBag;
    use gat_core::{
        Connection, DanglingLine, EquipmentData, Generator, Kilovolts, Load, Switch, SwitchKind,
        TopologyKind, VoltageLevelParams,
    };

    const CHAIN: usize = 50;

    struct Fixture {
        network: Network,
        terminals: TerminalMapping,
        vl: VoltageLevelIdx,
        records: Vec<PropertyBag>,
    }

    impl Fixture {
        /// Node-breaker level with switches SW0..SW49 chaining vertices 0..=50.
        fn chain() -> Self {
            let mut network = Network::new("chain");
            let vl = network
                .new_voltage_level(VoltageLevelParams {
                    id: "VL".into(),
                    name: None,
                    substation: None,
                    nominal_v: Kilovolts(225.0),
                    low_voltage_limit: None,
                    high_voltage_limit: None,
                    topology_kind: TopologyKind::NodeBreaker,
                })
                .unwrap();
            network.ensure_node(vl, CHAIN).unwrap();
            let mut records = Vec::new();
            for i in 0..CHAIN {
                let id = format!("SW{i}");
                network
                    .new_switch(Switch {
                        id: id.clone(),
                        name: None,
                        kind: SwitchKind::Breaker,
                        voltage_level: vl,
                        node1: i,
                        node2: i + 1,
                        open: i % 2 == 0,
                        retained: false,
                        fictitious: false,
                    })
                    .unwrap();
                for side in [1, 2] {
                    records.push(
                        PropertyBag::new()
                            .with("Terminal", format!("{id}_T{side}"))
                            .with("ConductingEquipment", &id)
                            .with("conductingEquipmentType", "Breaker")
                            .with("SequenceNumber", side),
                    );
                }
            }
            Self {
                network,
                terminals: TerminalMapping::new(),
                vl,
                records,
            }
        }

        fn attach(&mut self, id: &str, data: EquipmentData, node: usize) -> TerminalIdx {
            let connection = Connection {
                voltage_level: self.vl,
                node,
                connected: true,
            };
            let eq = self.network.new_equipment(id, None, data, &[connection]).unwrap();
            let terminal = self.network.equipment(eq).unwrap().terminals[0];
            self.terminals.add(&format!("{id}_T1"), terminal, None);
            self.records.push(
                PropertyBag::new()
                    .with("Terminal", format!("{id}_T1"))
                    .with("ConductingEquipment", id)
                    .with("conductingEquipmentType", "SynchronousMachine"),
            );
            terminal
        }

        fn model(&self) -> CgmesModel {
            CgmesModel::new(ModelRecords {
                terminals: self.records.clone(),
                ..ModelRecords::default()
            })
        }
    }

    fn generator() -> EquipmentData {
        EquipmentData::Generator(Generator::default())
    }

    #[test]
    fn test_direct_mapping_wins() {
        let mut f = Fixture::chain();
        let g = f.attach("G", generator(), CHAIN);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_voltage_control("G_T1"), Some(g));
        assert_eq!(
            mapper.map_for_flow_control("G_T1"),
            Some(TerminalAndSign { terminal: g, sign: 1 })
        );
    }

    #[test]
    fn test_voltage_lookup_crosses_long_chain_of_open_and_closed_switches() {
        let mut f = Fixture::chain();
        let g = f.attach("G", generator(), CHAIN);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_voltage_control("SW0_T1"), Some(g));
    }

    #[test]
    fn test_voltage_lookup_prefers_busbar_then_regulating_equipment() {
        let mut f = Fixture::chain();
        f.attach("LOAD", EquipmentData::Load(Load::default()), 2);
        let g = f.attach("G", generator(), 5);
        let model = f.model();
        {
            let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
            assert_eq!(mapper.map_for_voltage_control("SW3_T2"), Some(g));
        }
        let bbs = f.attach("BBS", EquipmentData::BusbarSection, 40);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_voltage_control("SW3_T2"), Some(bbs));
    }

    #[test]
    fn test_flow_sign_depends_on_side() {
        let mut f = Fixture::chain();
        let g = f.attach("G", generator(), CHAIN);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);

        // generator lies beyond end 2 of SW0
        assert_eq!(
            mapper.map_for_flow_control("SW0_T1"),
            Some(TerminalAndSign { terminal: g, sign: 1 })
        );
        assert_eq!(
            mapper.map_for_flow_control("SW0_T2"),
            Some(TerminalAndSign { terminal: g, sign: -1 })
        );
    }

    #[test]
    fn test_flow_bypass_yields_nothing() {
        let mut f = Fixture::chain();
        f.attach("G", generator(), CHAIN);
        f.network.new_internal_connection(f.vl, 0, 2).unwrap();
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_flow_control("SW0_T1"), None);
        assert_eq!(mapper.map_for_tie_flow("SW0_T1"), None);
    }

    #[test]
    fn test_flow_ambiguous_branch_yields_nothing() {
        let mut f = Fixture::chain();
        f.attach("G1", generator(), 30);
        f.attach("G2", generator(), CHAIN);
        f.attach("BBS", EquipmentData::BusbarSection, 10);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_flow_control("SW0_T1"), None);
    }

    #[test]
    fn test_busbars_do_not_make_flow_ambiguous() {
        let mut f = Fixture::chain();
        let g = f.attach("G", generator(), CHAIN);
        f.attach("BBS", EquipmentData::BusbarSection, 10);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_flow_control("SW0_T1").map(|t| t.terminal), Some(g));
    }

    #[test]
    fn test_tie_flow_accepts_only_dangling_lines() {
        let mut f = Fixture::chain();
        f.attach("G", generator(), CHAIN);
        let model = f.model();
        {
            let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
            assert_eq!(mapper.map_for_tie_flow("SW0_T1"), None);
        }

        let mut f = Fixture::chain();
        let dl = f.attach("DL", EquipmentData::DanglingLine(DanglingLine::default()), CHAIN);
        let model = f.model();
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_tie_flow("SW0_T1"), Some(dl));
    }

    #[test]
    fn test_non_switch_terminal_has_no_equivalent() {
        let f = Fixture::chain();
        let mut records = f.records.clone();
        records.push(
            PropertyBag::new()
                .with("Terminal", "X_T1")
                .with("ConductingEquipment", "X")
                .with("conductingEquipmentType", "ACLineSegment"),
        );
        let model = CgmesModel::new(ModelRecords {
            terminals: records,
            ..ModelRecords::default()
        });
        let mapper = RegulatingTerminalMapper::new(&model, &f.network, &f.terminals);
        assert_eq!(mapper.map_for_voltage_control("X_T1"), None);
        assert_eq!(mapper.map_for_flow_control("X_T1"), None);
        assert_eq!(mapper.map_for_tie_flow("X_T1"), None);
        assert_eq!(mapper.map_for_voltage_control("UNKNOWN"), None);
    }

    #[test]
    fn test_chain_traversal_visits_each_vertex_once() {
        let f = Fixture::chain();
        let view = &f.network.voltage_level(f.vl).unwrap().view;
        let mut seen = HashSet::new();
        let mut calls = 0;
        view.traverse(0, |_, _, to| {
            calls += 1;
            assert!(seen.insert(to), "vertex {to} visited twice");
            TraverseResult::Continue
        });
        assert_eq!(seen.len(), CHAIN);
        assert!(calls <= 2 * view.edge_count());
    }
}
