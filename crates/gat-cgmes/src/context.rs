//! Per-run conversion state.
//!
//! A [`Context`] is created once per conversion and handed by `&mut` to every
//! pass. Its tables only grow during the run; the regulating control tables are
//! the one exception and are cleared by the apply pass.

use gat_core::{
    Connection, Diagnostics, EquipmentData, EquipmentIdx, Network, Switch, SwitchIdx,
    SwitchKind, TopologyKind, VoltageLevelIdx,
};
use tracing::trace;

use crate::boundary::Boundary;
use crate::config::ConversionConfig;
use crate::error::Result;
use crate::model::CgmesModel;
use crate::nodes::NodeMapping;
use crate::regulating::RegulatingControlMapping;
use crate::substations::SubstationIdMapping;
use crate::terminals::TerminalMapping;

/// Where one end of an element attaches to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPoint {
    pub terminal_id: String,
    /// Connectivity node (node-breaker) or topological node (bus-breaker)
    pub node_id: String,
    pub voltage_level: VoltageLevelIdx,
    pub vertex: usize,
    pub connected: bool,
}

impl EndPoint {
    pub fn connection(&self) -> Connection {
        Connection {
            voltage_level: self.voltage_level,
            node: self.vertex,
            connected: self.connected,
        }
    }
}

pub struct Context<'a> {
    pub model: &'a CgmesModel,
    pub config: &'a ConversionConfig,
    pub network: Network,
    pub diagnostics: Diagnostics,
    pub node_breaker: bool,
    pub substation_mapping: SubstationIdMapping,
    pub nodes: NodeMapping,
    pub terminals: TerminalMapping,
    pub regulating_controls: RegulatingControlMapping,
    pub boundary: Boundary<'a>,
}

impl<'a> Context<'a> {
    pub fn new(model: &'a CgmesModel, config: &'a ConversionConfig) -> Result<Self> {
        let substation_mapping = SubstationIdMapping::build(model, config)?;
        let mut regulating_controls = RegulatingControlMapping::new();
        regulating_controls.cache_all(&model.records().regulating_controls);
        Ok(Self {
            model,
            config,
            network: Network::new(model.model_id()),
            diagnostics: Diagnostics::new(),
            node_breaker: model.is_node_breaker(),
            substation_mapping,
            nodes: NodeMapping::new(),
            terminals: TerminalMapping::new(),
            regulating_controls,
            boundary: Boundary::new(model),
        })
    }

    pub fn topology_kind(&self) -> TopologyKind {
        if self.node_breaker {
            TopologyKind::NodeBreaker
        } else {
            TopologyKind::BusBreaker
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn missing(&mut self, what: impl Into<String>) {
        self.diagnostics.missing(what);
    }

    pub fn invalid(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.diagnostics.invalid(what, reason);
    }

    pub fn fixed(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.diagnostics.fixed(what, reason);
    }

    pub fn fixed_value(
        &mut self,
        what: impl Into<String>,
        reason: impl Into<String>,
        before: impl std::fmt::Display,
        after: impl std::fmt::Display,
    ) {
        self.diagnostics.fixed_value(what, reason, before, after);
    }

    pub fn ignored(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.diagnostics.ignored(what, reason);
    }

    pub fn pending(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.diagnostics.pending(what, reason);
    }

    // =========================================================================
    // Containers and nodes
    // =========================================================================

    /// Id of the fictitious voltage level created for a node outside any voltage level.
    pub fn fictitious_voltage_level_id(node: &str) -> String {
        format!("{}_VL", node)
    }

    /// Network voltage level holding a connectivity or topological node.
    pub fn voltage_level_of_node(&self, node: &str) -> Option<VoltageLevelIdx> {
        match self.model.node_container(node)?.voltage_level {
            Some(vl) => self
                .network
                .find_voltage_level(self.substation_mapping.voltage_level(&vl)),
            None => self
                .network
                .find_voltage_level(&Self::fictitious_voltage_level_id(node)),
        }
    }

    /// Boundary node touched by any of the given terminals.
    pub fn boundary_node(&self, terminal_ids: &[Option<String>]) -> Option<String> {
        terminal_ids
            .iter()
            .flatten()
            .filter_map(|t| self.model.terminal(t))
            .filter_map(|t| self.model.node(t, self.node_breaker))
            .find(|n| self.model.is_boundary_node(n))
    }

    /// Resolve where a terminal attaches, allocating and linking its vertex.
    ///
    /// Reports `missing` and returns `None` when the terminal, its node or the
    /// voltage level cannot be found.
    pub fn end_point(&mut self, terminal_id: &str) -> Result<Option<EndPoint>> {
        let model = self.model;
        let Some(terminal) = model.terminal(terminal_id) else {
            self.missing(format!("Terminal {}", terminal_id));
            return Ok(None);
        };
        let Some(node) = model.node(terminal, self.node_breaker) else {
            self.missing(format!("Node of terminal {}", terminal_id));
            return Ok(None);
        };
        let Some(vl) = self.voltage_level_of_node(&node) else {
            self.missing(format!("Voltage level of node {}", node));
            return Ok(None);
        };

        let vertex = if self.node_breaker {
            let (vertex, _) = self.nodes.link(
                &mut self.network,
                &mut self.diagnostics,
                vl,
                terminal_id,
                &node,
                terminal.connected,
                self.config.fictitious_switches_for_disconnected_terminals,
                terminal.is_switch_end(),
            )?;
            vertex
        } else {
            match self.network.find_bus(&node) {
                Some((_, vertex)) => vertex,
                None => {
                    self.missing(format!("Bus {}", node));
                    return Ok(None);
                }
            }
        };
        trace!(terminal = terminal_id, node = %node, vertex, "end point");
        Ok(Some(EndPoint {
            terminal_id: terminal_id.to_string(),
            node_id: node,
            voltage_level: vl,
            vertex,
            connected: terminal.connected,
        }))
    }

    /// Resolve every end; `None` if any of them fails.
    pub fn end_points(&mut self, terminal_ids: &[Option<String>]) -> Result<Option<Vec<EndPoint>>> {
        let mut ends = Vec::with_capacity(terminal_ids.len());
        for id in terminal_ids {
            let Some(id) = id else {
                return Ok(None);
            };
            match self.end_point(id)? {
                Some(end) => ends.push(end),
                None => return Ok(None),
            }
        }
        Ok(Some(ends))
    }

    // =========================================================================
    // Network creation
    // =========================================================================

    /// Create equipment attached at `ends` and map its terminals.
    pub fn new_equipment(
        &mut self,
        id: &str,
        name: Option<&str>,
        data: EquipmentData,
        ends: &[EndPoint],
    ) -> Result<EquipmentIdx> {
        let connections: Vec<Connection> = ends.iter().map(EndPoint::connection).collect();
        let idx = self.network.new_equipment(id, name, data, &connections)?;
        let terminals = self
            .network
            .equipment(idx)
            .map(|e| e.terminals.clone())
            .unwrap_or_default();
        for (end, terminal) in ends.iter().zip(terminals) {
            let tn = self
                .model
                .terminal(&end.terminal_id)
                .and_then(|t| self.model.topological_node(t));
            self.terminals.add(&end.terminal_id, terminal, tn.as_deref());
        }
        Ok(idx)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_switch(
        &mut self,
        id: &str,
        name: Option<&str>,
        kind: SwitchKind,
        open: bool,
        retained: bool,
        end1: &EndPoint,
        end2: &EndPoint,
    ) -> Result<SwitchIdx> {
        let idx = self.network.new_switch(Switch {
            id: id.to_string(),
            name: name.map(str::to_string),
            kind,
            voltage_level: end1.voltage_level,
            node1: end1.vertex,
            node2: end2.vertex,
            open,
            retained,
            fictitious: false,
        })?;
        Ok(idx)
    }
}
