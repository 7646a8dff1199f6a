//! The network container: arenas of substations, voltage levels, equipment,
//! terminals and switches, plus a global identifier index.
//!
//! Objects are never moved once created, so the typed indices handed out by the
//! `new_*` constructors stay valid for the lifetime of the network. Equipment can
//! be retired with [`Network::remove_equipment`]; its slot is kept and skipped by
//! every iterator.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::diagnostics::Diagnostics;
use crate::equipment::{CurrentLimits, Equipment, EquipmentData, EquipmentKind};
use crate::topology::{Link, TopologyView};
use crate::units::{Kilovolts, Megawatts, Ohms};
use crate::{
    EquipmentIdx, GatError, GatResult, SubstationIdx, SwitchIdx, TerminalIdx, VoltageLevelIdx,
};

/// What a network-wide identifier points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifiable {
    Substation(SubstationIdx),
    VoltageLevel(VoltageLevelIdx),
    Bus(VoltageLevelIdx, usize),
    Equipment(EquipmentIdx),
    Switch(SwitchIdx),
    HvdcLine(usize),
    TieLine(usize),
    ControlArea(usize),
}

// ============================================================================
// Containers
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Substation {
    pub id: String,
    pub name: Option<String>,
    pub region: Option<String>,
    pub voltage_levels: Vec<VoltageLevelIdx>,
    /// Ids of input substations merged into this one
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TopologyKind {
    NodeBreaker,
    BusBreaker,
}

/// Arguments of [`Network::new_voltage_level`].
#[derive(Debug, Clone)]
pub struct VoltageLevelParams {
    pub id: String,
    pub name: Option<String>,
    pub substation: Option<SubstationIdx>,
    pub nominal_v: Kilovolts,
    pub low_voltage_limit: Option<Kilovolts>,
    pub high_voltage_limit: Option<Kilovolts>,
    pub topology_kind: TopologyKind,
}

#[derive(Debug, Clone)]
pub struct VoltageLevel {
    pub id: String,
    pub name: Option<String>,
    pub substation: Option<SubstationIdx>,
    pub nominal_v: Kilovolts,
    pub low_voltage_limit: Option<Kilovolts>,
    pub high_voltage_limit: Option<Kilovolts>,
    pub topology_kind: TopologyKind,
    pub view: TopologyView,
    /// Terminals attached to this voltage level in creation order
    pub terminals: Vec<TerminalIdx>,
    pub aliases: Vec<String>,
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Terminal {
    pub equipment: EquipmentIdx,
    /// 1-based side of the owning equipment
    pub side: usize,
    pub voltage_level: VoltageLevelIdx,
    /// Vertex of the voltage level's topology view
    pub node: usize,
    pub connected: bool,
    pub current_limits: Option<CurrentLimits>,
}

/// Where a new equipment side attaches.
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub voltage_level: VoltageLevelIdx,
    pub node: usize,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchKind {
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

#[derive(Debug, Clone, Serialize)]
pub struct Switch {
    pub id: String,
    pub name: Option<String>,
    pub kind: SwitchKind,
    pub voltage_level: VoltageLevelIdx,
    pub node1: usize,
    pub node2: usize,
    pub open: bool,
    pub retained: bool,
    /// Created by the conversion, not present in the input
    pub fictitious: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HvdcLine {
    pub id: String,
    pub name: Option<String>,
    pub converter1: EquipmentIdx,
    pub converter2: EquipmentIdx,
    pub r: Ohms,
    pub nominal_v: Kilovolts,
    pub max_p: Megawatts,
    pub active_power_setpoint: Megawatts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TieLine {
    pub id: String,
    pub name: Option<String>,
    pub dangling_line1: EquipmentIdx,
    pub dangling_line2: EquipmentIdx,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlArea {
    pub id: String,
    pub name: Option<String>,
    pub area_type: Option<String>,
    pub net_interchange: Megawatts,
    pub p_tolerance: Option<Megawatts>,
    /// Terminals whose flow defines the area interchange
    pub tie_flows: Vec<TerminalIdx>,
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Network {
    pub id: String,
    substations: Vec<Substation>,
    voltage_levels: Vec<VoltageLevel>,
    equipment: Vec<Equipment>,
    terminals: Vec<Terminal>,
    switches: Vec<Switch>,
    hvdc_lines: Vec<HvdcLine>,
    tie_lines: Vec<TieLine>,
    control_areas: Vec<ControlArea>,
    index: HashMap<String, Identifiable>,
}

impl Network {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn claim(&mut self, id: &str, what: Identifiable) -> GatResult<()> {
        if id.is_empty() {
            return Err(GatError::Network("empty identifier".into()));
        }
        if self.index.contains_key(id) {
            return Err(GatError::DuplicateId(id.to_string()));
        }
        self.index.insert(id.to_string(), what);
        Ok(())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    pub fn new_substation(
        &mut self,
        id: &str,
        name: Option<&str>,
        region: Option<&str>,
    ) -> GatResult<SubstationIdx> {
        let idx = SubstationIdx::new(self.substations.len());
        self.claim(id, Identifiable::Substation(idx))?;
        self.substations.push(Substation {
            id: id.to_string(),
            name: name.map(str::to_string),
            region: region.map(str::to_string),
            voltage_levels: Vec::new(),
            aliases: Vec::new(),
        });
        Ok(idx)
    }

    pub fn new_voltage_level(&mut self, params: VoltageLevelParams) -> GatResult<VoltageLevelIdx> {
        if let Some(s) = params.substation {
            if s.value() >= self.substations.len() {
                return Err(GatError::UnknownId(format!("substation #{}", s.value())));
            }
        }
        let idx = VoltageLevelIdx::new(self.voltage_levels.len());
        self.claim(&params.id, Identifiable::VoltageLevel(idx))?;
        if let Some(s) = params.substation {
            self.substations[s.value()].voltage_levels.push(idx);
        }
        self.voltage_levels.push(VoltageLevel {
            id: params.id,
            name: params.name,
            substation: params.substation,
            nominal_v: params.nominal_v,
            low_voltage_limit: params.low_voltage_limit,
            high_voltage_limit: params.high_voltage_limit,
            topology_kind: params.topology_kind,
            view: TopologyView::new(),
            terminals: Vec::new(),
            aliases: Vec::new(),
        });
        Ok(idx)
    }

    /// Add a bus to a bus-breaker voltage level; returns its vertex.
    pub fn new_bus(&mut self, vl: VoltageLevelIdx, id: &str) -> GatResult<usize> {
        let level = self.voltage_level_checked(vl)?;
        if level.topology_kind != TopologyKind::BusBreaker {
            return Err(GatError::Topology(format!(
                "bus {} added to node-breaker voltage level {}",
                id, level.id
            )));
        }
        if self.index.contains_key(id) {
            return Err(GatError::DuplicateId(id.to_string()));
        }
        let vertex = self.voltage_levels[vl.value()].view.add_bus(id)?;
        self.index
            .insert(id.to_string(), Identifiable::Bus(vl, vertex));
        Ok(vertex)
    }

    /// Make `node` addressable in a node-breaker voltage level.
    pub fn ensure_node(&mut self, vl: VoltageLevelIdx, node: usize) -> GatResult<usize> {
        self.voltage_level_checked(vl)?;
        Ok(self.voltage_levels[vl.value()].view.ensure_node(node))
    }

    pub fn new_internal_connection(
        &mut self,
        vl: VoltageLevelIdx,
        node1: usize,
        node2: usize,
    ) -> GatResult<()> {
        self.voltage_level_checked(vl)?;
        self.voltage_levels[vl.value()]
            .view
            .add_internal_connection(node1, node2)
    }

    pub fn new_switch(&mut self, switch: Switch) -> GatResult<SwitchIdx> {
        self.voltage_level_checked(switch.voltage_level)?;
        let idx = SwitchIdx::new(self.switches.len());
        let vl = switch.voltage_level.value();
        let view = &self.voltage_levels[vl].view;
        if switch.node1 >= view.capacity() || switch.node2 >= view.capacity() {
            return Err(GatError::Topology(format!(
                "switch {} references a vertex outside its voltage level",
                switch.id
            )));
        }
        self.claim(&switch.id, Identifiable::Switch(idx))?;
        self.voltage_levels[vl]
            .view
            .add_link(switch.node1, switch.node2, Link::Switch(idx))?;
        self.switches.push(switch);
        Ok(idx)
    }

    /// Create equipment and one terminal per connection, side 1 first.
    pub fn new_equipment(
        &mut self,
        id: &str,
        name: Option<&str>,
        data: EquipmentData,
        connections: &[Connection],
    ) -> GatResult<EquipmentIdx> {
        if connections.len() != data.side_count() {
            return Err(GatError::Network(format!(
                "{} {} needs {} terminals, got {}",
                data.kind().label(),
                id,
                data.side_count(),
                connections.len()
            )));
        }
        for c in connections {
            let level = self.voltage_level_checked(c.voltage_level)?;
            if c.node >= level.view.capacity() {
                return Err(GatError::Topology(format!(
                    "{} connects to vertex {} outside voltage level {}",
                    id, c.node, level.id
                )));
            }
        }
        let idx = EquipmentIdx::new(self.equipment.len());
        self.claim(id, Identifiable::Equipment(idx))?;

        let mut terminals = Vec::with_capacity(connections.len());
        for (i, c) in connections.iter().enumerate() {
            let t = TerminalIdx::new(self.terminals.len());
            self.terminals.push(Terminal {
                equipment: idx,
                side: i + 1,
                voltage_level: c.voltage_level,
                node: c.node,
                connected: c.connected,
                current_limits: None,
            });
            self.voltage_levels[c.voltage_level.value()].terminals.push(t);
            terminals.push(t);
        }
        self.equipment.push(Equipment {
            id: id.to_string(),
            name: name.map(str::to_string),
            data,
            terminals,
            properties: Default::default(),
            removed: false,
        });
        Ok(idx)
    }

    pub fn new_hvdc_line(&mut self, line: HvdcLine) -> GatResult<usize> {
        for c in [line.converter1, line.converter2] {
            match self.equipment(c).map(Equipment::kind) {
                Some(EquipmentKind::HvdcConverterStation) => {}
                _ => {
                    return Err(GatError::Network(format!(
                        "HVDC line {} references a non-converter equipment",
                        line.id
                    )))
                }
            }
        }
        let idx = self.hvdc_lines.len();
        self.claim(&line.id, Identifiable::HvdcLine(idx))?;
        for c in [line.converter1, line.converter2] {
            if let Some(EquipmentData::HvdcConverterStation(station)) =
                self.equipment.get_mut(c.value()).map(|e| &mut e.data)
            {
                station.hvdc_line = Some(line.id.clone());
            }
        }
        self.hvdc_lines.push(line);
        Ok(idx)
    }

    /// Pair two dangling lines into a tie line.
    pub fn new_tie_line(
        &mut self,
        id: &str,
        name: Option<&str>,
        dangling_line1: EquipmentIdx,
        dangling_line2: EquipmentIdx,
    ) -> GatResult<usize> {
        for dl in [dangling_line1, dangling_line2] {
            match self.equipment(dl).map(|e| &e.data) {
                Some(EquipmentData::DanglingLine(d)) if d.tie_line.is_none() => {}
                Some(EquipmentData::DanglingLine(_)) => {
                    return Err(GatError::Network(format!(
                        "dangling line #{} already paired",
                        dl.value()
                    )))
                }
                _ => return Err(GatError::UnknownId(format!("dangling line #{}", dl.value()))),
            }
        }
        let idx = self.tie_lines.len();
        self.claim(id, Identifiable::TieLine(idx))?;
        for dl in [dangling_line1, dangling_line2] {
            if let EquipmentData::DanglingLine(d) = &mut self.equipment[dl.value()].data {
                d.tie_line = Some(id.to_string());
            }
        }
        self.tie_lines.push(TieLine {
            id: id.to_string(),
            name: name.map(str::to_string),
            dangling_line1,
            dangling_line2,
        });
        Ok(idx)
    }

    pub fn new_control_area(&mut self, area: ControlArea) -> GatResult<usize> {
        let idx = self.control_areas.len();
        self.claim(&area.id, Identifiable::ControlArea(idx))?;
        self.control_areas.push(area);
        Ok(idx)
    }

    /// Retire equipment: frees its id and detaches its terminals.
    pub fn remove_equipment(&mut self, idx: EquipmentIdx) -> GatResult<()> {
        let eq = self
            .equipment
            .get_mut(idx.value())
            .filter(|e| !e.removed)
            .ok_or_else(|| GatError::UnknownId(format!("equipment #{}", idx.value())))?;
        eq.removed = true;
        let id = eq.id.clone();
        let terminals = eq.terminals.clone();
        self.index.remove(&id);
        for t in terminals {
            let vl = self.terminals[t.value()].voltage_level;
            self.voltage_levels[vl.value()].terminals.retain(|x| *x != t);
        }
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn lookup(&self, id: &str) -> Option<Identifiable> {
        self.index.get(id).copied()
    }

    pub fn find_substation(&self, id: &str) -> Option<SubstationIdx> {
        match self.lookup(id)? {
            Identifiable::Substation(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn find_voltage_level(&self, id: &str) -> Option<VoltageLevelIdx> {
        match self.lookup(id)? {
            Identifiable::VoltageLevel(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn find_equipment(&self, id: &str) -> Option<EquipmentIdx> {
        match self.lookup(id)? {
            Identifiable::Equipment(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn find_switch(&self, id: &str) -> Option<SwitchIdx> {
        match self.lookup(id)? {
            Identifiable::Switch(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn find_bus(&self, id: &str) -> Option<(VoltageLevelIdx, usize)> {
        match self.lookup(id)? {
            Identifiable::Bus(vl, vertex) => Some((vl, vertex)),
            _ => None,
        }
    }

    pub fn find_tie_line(&self, id: &str) -> Option<&TieLine> {
        match self.lookup(id)? {
            Identifiable::TieLine(idx) => self.tie_lines.get(idx),
            _ => None,
        }
    }

    fn voltage_level_checked(&self, vl: VoltageLevelIdx) -> GatResult<&VoltageLevel> {
        self.voltage_levels
            .get(vl.value())
            .ok_or_else(|| GatError::UnknownId(format!("voltage level #{}", vl.value())))
    }

    pub fn substation(&self, idx: SubstationIdx) -> Option<&Substation> {
        self.substations.get(idx.value())
    }

    pub fn substation_mut(&mut self, idx: SubstationIdx) -> Option<&mut Substation> {
        self.substations.get_mut(idx.value())
    }

    pub fn voltage_level(&self, idx: VoltageLevelIdx) -> Option<&VoltageLevel> {
        self.voltage_levels.get(idx.value())
    }

    pub fn voltage_level_mut(&mut self, idx: VoltageLevelIdx) -> Option<&mut VoltageLevel> {
        self.voltage_levels.get_mut(idx.value())
    }

    pub fn equipment(&self, idx: EquipmentIdx) -> Option<&Equipment> {
        self.equipment.get(idx.value()).filter(|e| !e.removed)
    }

    pub fn equipment_mut(&mut self, idx: EquipmentIdx) -> Option<&mut Equipment> {
        self.equipment.get_mut(idx.value()).filter(|e| !e.removed)
    }

    pub fn terminal(&self, idx: TerminalIdx) -> Option<&Terminal> {
        self.terminals.get(idx.value())
    }

    pub fn terminal_mut(&mut self, idx: TerminalIdx) -> Option<&mut Terminal> {
        self.terminals.get_mut(idx.value())
    }

    /// Kind of the equipment owning a terminal.
    pub fn terminal_kind(&self, idx: TerminalIdx) -> Option<EquipmentKind> {
        self.terminal(idx)
            .and_then(|t| self.equipment(t.equipment))
            .map(Equipment::kind)
    }

    /// Nominal voltage of the voltage level a terminal belongs to.
    pub fn terminal_nominal_v(&self, idx: TerminalIdx) -> Option<Kilovolts> {
        self.terminal(idx)
            .and_then(|t| self.voltage_level(t.voltage_level))
            .map(|vl| vl.nominal_v)
    }

    pub fn switch(&self, idx: SwitchIdx) -> Option<&Switch> {
        self.switches.get(idx.value())
    }

    pub fn switch_mut(&mut self, idx: SwitchIdx) -> Option<&mut Switch> {
        self.switches.get_mut(idx.value())
    }

    pub fn is_switch_open(&self, idx: SwitchIdx) -> bool {
        self.switch(idx).is_some_and(|s| s.open)
    }

    pub fn hvdc_line(&self, idx: usize) -> Option<&HvdcLine> {
        self.hvdc_lines.get(idx)
    }

    pub fn control_area(&self, idx: usize) -> Option<&ControlArea> {
        self.control_areas.get(idx)
    }

    pub fn control_area_mut(&mut self, idx: usize) -> Option<&mut ControlArea> {
        self.control_areas.get_mut(idx)
    }

    /// Terminals of `vl` sitting on any of `nodes`, in creation order.
    pub fn terminals_at(&self, vl: VoltageLevelIdx, nodes: &HashSet<usize>) -> Vec<TerminalIdx> {
        self.voltage_level(vl)
            .map(|level| {
                level
                    .terminals
                    .iter()
                    .copied()
                    .filter(|t| nodes.contains(&self.terminals[t.value()].node))
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    pub fn substations(&self) -> impl Iterator<Item = (SubstationIdx, &Substation)> {
        self.substations
            .iter()
            .enumerate()
            .map(|(i, s)| (SubstationIdx::new(i), s))
    }

    pub fn voltage_levels(&self) -> impl Iterator<Item = (VoltageLevelIdx, &VoltageLevel)> {
        self.voltage_levels
            .iter()
            .enumerate()
            .map(|(i, v)| (VoltageLevelIdx::new(i), v))
    }

    pub fn equipment_iter(&self) -> impl Iterator<Item = (EquipmentIdx, &Equipment)> {
        self.equipment
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed)
            .map(|(i, e)| (EquipmentIdx::new(i), e))
    }

    pub fn equipment_of_kind(
        &self,
        kind: EquipmentKind,
    ) -> impl Iterator<Item = (EquipmentIdx, &Equipment)> {
        self.equipment_iter().filter(move |(_, e)| e.kind() == kind)
    }

    pub fn switches(&self) -> impl Iterator<Item = (SwitchIdx, &Switch)> {
        self.switches
            .iter()
            .enumerate()
            .map(|(i, s)| (SwitchIdx::new(i), s))
    }

    pub fn hvdc_lines(&self) -> &[HvdcLine] {
        &self.hvdc_lines
    }

    pub fn tie_lines(&self) -> &[TieLine] {
        &self.tie_lines
    }

    pub fn control_areas(&self) -> &[ControlArea] {
        &self.control_areas
    }

    // =========================================================================
    // Summary
    // =========================================================================

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_substations: self.substations.len(),
            num_voltage_levels: self.voltage_levels.len(),
            num_hvdc_lines: self.hvdc_lines.len(),
            num_tie_lines: self.tie_lines.len(),
            ..NetworkStats::default()
        };
        for (_, sw) in self.switches() {
            stats.num_switches += 1;
            if sw.fictitious {
                stats.num_fictitious_switches += 1;
            }
        }
        for (_, vl) in self.voltage_levels() {
            stats.num_internal_connections += vl.view.internal_connection_count();
        }
        for (_, eq) in self.equipment_iter() {
            *stats.equipment.entry(eq.kind()).or_default() += 1;
        }
        stats
    }

    /// Check structural consistency: every terminal and switch points inside
    /// its voltage level, and node-breaker/bus-breaker views are not mixed.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        for (i, t) in self.terminals.iter().enumerate() {
            let Some(eq) = self.equipment(t.equipment) else {
                continue;
            };
            match self.voltage_level(t.voltage_level) {
                Some(vl) if t.node < vl.view.capacity() => {}
                Some(vl) => diag.invalid(
                    format!("Terminal #{} of {}", i, eq.id),
                    format!("vertex {} outside voltage level {}", t.node, vl.id),
                ),
                None => diag.missing(format!("Voltage level of terminal #{} of {}", i, eq.id)),
            }
        }
        for sw in &self.switches {
            if let Some(vl) = self.voltage_level(sw.voltage_level) {
                if sw.node1 >= vl.view.capacity() || sw.node2 >= vl.view.capacity() {
                    diag.invalid(
                        format!("Switch {}", sw.id),
                        format!("endpoint outside voltage level {}", vl.id),
                    );
                }
            }
        }
        for vl in &self.voltage_levels {
            let buses = vl.view.bus_ids().count();
            if vl.topology_kind == TopologyKind::NodeBreaker && buses > 0 {
                diag.invalid(
                    format!("VoltageLevel {}", vl.id),
                    "node-breaker voltage level holds named buses",
                );
            }
        }
    }
}

/// Counts of network objects
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_substations: usize,
    pub num_voltage_levels: usize,
    pub num_switches: usize,
    pub num_fictitious_switches: usize,
    pub num_internal_connections: usize,
    pub num_hvdc_lines: usize,
    pub num_tie_lines: usize,
    pub equipment: std::collections::BTreeMap<EquipmentKind, usize>,
}

impl NetworkStats {
    pub fn count(&self, kind: EquipmentKind) -> usize {
        self.equipment.get(&kind).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} substations, {} voltage levels, {} switches ({} fictitious), {} equipment, {} HVDC lines, {} tie lines",
            self.num_substations,
            self.num_voltage_levels,
            self.num_switches,
            self.num_fictitious_switches,
            self.equipment.values().sum::<usize>(),
            self.num_hvdc_lines,
            self.num_tie_lines
        )
    }
}
