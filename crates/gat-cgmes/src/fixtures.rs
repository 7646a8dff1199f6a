//! Programmatic record builders for tests.
//!
//! [`ModelBuilder`] writes records with the attribute keys the converters read.
//! Ids follow fixed conventions so that tests can name generated records:
//!
//! - terminal `n` of equipment `EQ` is `EQ_T{n}`
//! - end `n` of transformer `PT` is `PT_E{n}`
//! - base voltages are `BV_{kv}`
//! - in node-breaker models, connectivity node `CN` sits in topological node `CN_TN`

use crate::model::{CgmesModel, ModelRecords};
use crate::names;
use crate::records::PropertyBag;

const CIM: &str = "http://iec.ch/TC57/2013/CIM-schema-cim16#";

/// Container id used for boundary nodes.
pub const BOUNDARY_CONTAINER: &str = "BOUNDARY";

#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    records: ModelRecords,
    node_breaker: bool,
}

impl ModelBuilder {
    pub fn node_breaker() -> Self {
        Self {
            records: ModelRecords {
                model_id: "test".into(),
                ..ModelRecords::default()
            },
            node_breaker: true,
        }
    }

    pub fn bus_breaker() -> Self {
        Self {
            node_breaker: false,
            ..Self::node_breaker()
        }
    }

    pub fn build(self) -> CgmesModel {
        CgmesModel::new(self.records)
    }

    pub fn records(&self) -> &ModelRecords {
        &self.records
    }

    // =========================================================================
    // Containers and nodes
    // =========================================================================

    pub fn substation(&mut self, id: &str) -> &mut Self {
        self.records
            .substations
            .push(PropertyBag::new().with(names::SUBSTATION, id).with(names::NAME, id));
        self
    }

    pub fn substation_in_region(&mut self, id: &str, region: &str) -> &mut Self {
        self.records.substations.push(
            PropertyBag::new()
                .with(names::SUBSTATION, id)
                .with(names::REGION, region),
        );
        self
    }

    fn base_voltage(&mut self, kv: f64) -> String {
        let id = format!("BV_{}", kv);
        if !self
            .records
            .base_voltages
            .iter()
            .any(|bv| bv.get(names::BASE_VOLTAGE) == Some(id.as_str()))
        {
            self.records.base_voltages.push(
                PropertyBag::new()
                    .with(names::BASE_VOLTAGE, &id)
                    .with(names::NOMINAL_VOLTAGE, kv),
            );
        }
        id
    }

    pub fn voltage_level(&mut self, id: &str, substation: &str, kv: f64) -> &mut Self {
        let bv = self.base_voltage(kv);
        self.records.voltage_levels.push(
            PropertyBag::new()
                .with(names::VOLTAGE_LEVEL, id)
                .with(names::SUBSTATION, substation)
                .with(names::BASE_VOLTAGE, bv),
        );
        self
    }

    /// Connectivity node (node-breaker) or topological node (bus-breaker) in `vl`.
    pub fn node(&mut self, id: &str, vl: &str) -> &mut Self {
        let tn = format!("{}_TN", id);
        self.node_in_topological_node(id, vl, &tn)
    }

    /// Node-breaker only: connectivity node `id` inside topological node `tn`.
    pub fn node_in_topological_node(&mut self, id: &str, vl: &str, tn: &str) -> &mut Self {
        if self.node_breaker {
            self.records.connectivity_nodes.push(
                PropertyBag::new()
                    .with(names::CONNECTIVITY_NODE, id)
                    .with(names::CONTAINER, vl)
                    .with(names::TOPOLOGICAL_NODE, tn),
            );
        } else {
            self.records.topological_nodes.push(
                PropertyBag::new()
                    .with(names::TOPOLOGICAL_NODE, id)
                    .with(names::CONTAINER, vl),
            );
        }
        self
    }

    /// Node outside any voltage level, not on the boundary.
    pub fn detached_node(&mut self, id: &str, kv: f64) -> &mut Self {
        let bv = self.base_voltage(kv);
        let key = if self.node_breaker {
            names::CONNECTIVITY_NODE
        } else {
            names::TOPOLOGICAL_NODE
        };
        let bag = PropertyBag::new()
            .with(key, id)
            .with(names::CONTAINER, "LINE_CONTAINER")
            .with(names::BASE_VOLTAGE, bv);
        self.push_node(bag);
        self
    }

    pub fn boundary_node(&mut self, id: &str, pairing_key: &str) -> &mut Self {
        let bv = self.base_voltage(400.0);
        let key = if self.node_breaker {
            names::CONNECTIVITY_NODE
        } else {
            names::TOPOLOGICAL_NODE
        };
        let bag = PropertyBag::new()
            .with(key, id)
            .with(names::CONTAINER, BOUNDARY_CONTAINER)
            .with(names::BOUNDARY_POINT, true)
            .with(names::PAIRING_KEY, pairing_key)
            .with(names::BASE_VOLTAGE, bv);
        self.push_node(bag);
        self
    }

    fn push_node(&mut self, bag: PropertyBag) {
        if self.node_breaker {
            self.records.connectivity_nodes.push(bag);
        } else {
            self.records.topological_nodes.push(bag);
        }
    }

    // =========================================================================
    // Terminals
    // =========================================================================

    fn terminal(&mut self, equipment: &str, equipment_type: &str, seq: usize, node: &str) -> String {
        let id = format!("{}_T{}", equipment, seq);
        let node_key = if self.node_breaker {
            names::CONNECTIVITY_NODE
        } else {
            names::TOPOLOGICAL_NODE
        };
        self.records.terminals.push(
            PropertyBag::new()
                .with(names::TERMINAL, &id)
                .with(names::CONDUCTING_EQUIPMENT, equipment)
                .with(names::CONDUCTING_EQUIPMENT_TYPE, format!("cim:{}", equipment_type))
                .with(names::SEQUENCE_NUMBER, seq)
                .with(node_key, node)
                .with(names::CONNECTED, true),
        );
        id
    }

    pub fn disconnect(&mut self, terminal: &str) -> &mut Self {
        for bag in &mut self.records.terminals {
            if bag.get(names::TERMINAL) == Some(terminal) {
                bag.put(names::CONNECTED, false);
            }
        }
        self
    }

    // =========================================================================
    // Injections
    // =========================================================================

    pub fn busbar(&mut self, id: &str, node: &str) -> &mut Self {
        let t = self.terminal(id, "BusbarSection", 1, node);
        self.records.busbar_sections.push(
            PropertyBag::new()
                .with("BusbarSection", id)
                .with(names::TERMINAL, t),
        );
        self
    }

    pub fn load(&mut self, id: &str, node: &str, p: f64, q: f64) -> &mut Self {
        let t = self.terminal(id, "EnergyConsumer", 1, node);
        self.records.energy_consumers.push(
            PropertyBag::new()
                .with("EnergyConsumer", id)
                .with(names::TERMINAL, t)
                .with(names::P, p)
                .with(names::Q, q),
        );
        self
    }

    pub fn equivalent_injection(&mut self, id: &str, node: &str, p: f64, q: f64) -> &mut Self {
        let t = self.terminal(id, "EquivalentInjection", 1, node);
        self.records.equivalent_injections.push(
            PropertyBag::new()
                .with("EquivalentInjection", id)
                .with(names::TERMINAL, t)
                .with(names::P, p)
                .with(names::Q, q),
        );
        self
    }

    pub fn generator(&mut self, id: &str, node: &str, control: Option<&str>) -> &mut Self {
        let t = self.terminal(id, "SynchronousMachine", 1, node);
        let mut bag = PropertyBag::new()
            .with("SynchronousMachine", id)
            .with(names::TERMINAL, t)
            .with("minP", 0.0)
            .with("maxP", 200.0)
            .with(names::P, -50.0)
            .with(names::Q, -10.0)
            .with(names::CONTROL_ENABLED, true);
        if let Some(rc) = control {
            bag.put(names::REGULATING_CONTROL, rc);
        }
        self.records.synchronous_machines.push(bag);
        self
    }

    pub fn shunt(&mut self, id: &str, node: &str, control: Option<&str>) -> &mut Self {
        let t = self.terminal(id, "LinearShuntCompensator", 1, node);
        let mut bag = PropertyBag::new()
            .with("ShuntCompensator", id)
            .with(names::TERMINAL, t)
            .with("bPerSection", 0.001)
            .with("gPerSection", 0.0)
            .with("maximumSections", 2)
            .with("sections", 1)
            .with(names::CONTROL_ENABLED, true);
        if let Some(rc) = control {
            bag.put(names::REGULATING_CONTROL, rc);
        }
        self.records.shunt_compensators.push(bag);
        self
    }

    /// Static var compensator with `mode` as its record default (`voltage`,
    /// `reactivePower` or anything else for off).
    pub fn svc(&mut self, id: &str, node: &str, control: Option<&str>, mode: &str) -> &mut Self {
        let t = self.terminal(id, "StaticVarCompensator", 1, node);
        let mut bag = PropertyBag::new()
            .with("StaticVarCompensator", id)
            .with(names::TERMINAL, t)
            .with("inductiveRating", -100.0)
            .with("capacitiveRating", 50.0)
            .with("voltageSetPoint", 405.0)
            .with(names::Q, 12.0)
            .with("sVCControlMode", format!("{}SVCControlMode.{}", CIM, mode))
            .with(names::CONTROL_ENABLED, true);
        if let Some(rc) = control {
            bag.put(names::REGULATING_CONTROL, rc);
        }
        self.records.static_var_compensators.push(bag);
        self
    }

    pub fn regulating_control(
        &mut self,
        id: &str,
        mode: &str,
        terminal: &str,
        target: f64,
        enabled: bool,
    ) -> &mut Self {
        self.records.regulating_controls.push(
            PropertyBag::new()
                .with(names::REGULATING_CONTROL, id)
                .with("mode", format!("{}RegulatingControlModeKind.{}", CIM, mode))
                .with(names::TERMINAL, terminal)
                .with("targetValue", target)
                .with("enabled", enabled),
        );
        self
    }

    /// Set an attribute on the regulating control `id`.
    pub fn control_attribute(&mut self, id: &str, key: &str, value: impl ToString) -> &mut Self {
        if let Some(bag) = self
            .records
            .regulating_controls
            .iter_mut()
            .find(|b| b.get(names::REGULATING_CONTROL) == Some(id))
        {
            bag.put(key, value);
        }
        self
    }

    // =========================================================================
    // Branches
    // =========================================================================

    pub fn switch(&mut self, id: &str, node1: &str, node2: &str, open: bool) -> &mut Self {
        self.switch_of_kind(id, "Breaker", node1, node2, open)
    }

    pub fn switch_of_kind(
        &mut self,
        id: &str,
        kind: &str,
        node1: &str,
        node2: &str,
        open: bool,
    ) -> &mut Self {
        let t1 = self.terminal(id, kind, 1, node1);
        let t2 = self.terminal(id, kind, 2, node2);
        self.records.switches.push(
            PropertyBag::new()
                .with("Switch", id)
                .with("type", format!("cim:{}", kind))
                .with("open", open)
                .with(names::TERMINAL1, t1)
                .with(names::TERMINAL2, t2),
        );
        self
    }

    pub fn line(&mut self, id: &str, node1: &str, node2: &str) -> &mut Self {
        let t1 = self.terminal(id, "ACLineSegment", 1, node1);
        let t2 = self.terminal(id, "ACLineSegment", 2, node2);
        self.records.ac_line_segments.push(
            PropertyBag::new()
                .with("ACLineSegment", id)
                .with(names::TERMINAL1, t1)
                .with(names::TERMINAL2, t2)
                .with("r", 1.0)
                .with("x", 10.0)
                .with("gch", 0.0)
                .with("bch", 0.0002),
        );
        self
    }

    pub fn equivalent_branch(&mut self, id: &str, node1: &str, node2: &str) -> &mut Self {
        let t1 = self.terminal(id, "EquivalentBranch", 1, node1);
        let t2 = self.terminal(id, "EquivalentBranch", 2, node2);
        self.records.equivalent_branches.push(
            PropertyBag::new()
                .with("EquivalentBranch", id)
                .with(names::TERMINAL1, t1)
                .with(names::TERMINAL2, t2)
                .with("r", 0.5)
                .with("x", 5.0),
        );
        self
    }

    /// Transformer with one end per node. Rated voltages are 400, 220 and 20 kV
    /// by end number.
    pub fn transformer(&mut self, id: &str, nodes: &[&str]) -> &mut Self {
        const RATED_U: [f64; 3] = [400.0, 220.0, 20.0];
        for (i, node) in nodes.iter().enumerate() {
            let n = i + 1;
            let t = self.terminal(id, "PowerTransformer", n, node);
            self.records.transformer_ends.push(
                PropertyBag::new()
                    .with(names::TRANSFORMER_END, format!("{}_E{}", id, n))
                    .with(names::POWER_TRANSFORMER, id)
                    .with(names::END_NUMBER, n)
                    .with(names::TERMINAL, t)
                    .with("r", if n == 1 { 0.2 } else { 0.0 })
                    .with("x", if n == 1 { 12.0 } else { 0.0 })
                    .with("g", 0.0)
                    .with("b", 0.0)
                    .with("ratedU", RATED_U.get(i).copied().unwrap_or(10.0)),
            );
        }
        self
    }

    pub fn ratio_tap_changer(&mut self, id: &str, end: &str, control: Option<&str>) -> &mut Self {
        let mut bag = PropertyBag::new()
            .with("RatioTapChanger", id)
            .with(names::TRANSFORMER_END, end)
            .with("lowStep", 1)
            .with("highStep", 21)
            .with("neutralStep", 11)
            .with("step", 11)
            .with("stepVoltageIncrement", 1.25)
            .with("ltcFlag", true)
            .with(names::CONTROL_ENABLED, true);
        if let Some(rc) = control {
            bag.put(names::TAP_CHANGER_CONTROL, rc);
        }
        self.records.ratio_tap_changers.push(bag);
        self
    }

    pub fn phase_tap_changer(&mut self, id: &str, end: &str, control: Option<&str>) -> &mut Self {
        let mut bag = PropertyBag::new()
            .with("PhaseTapChanger", id)
            .with(names::TRANSFORMER_END, end)
            .with("lowStep", -10)
            .with("highStep", 10)
            .with("neutralStep", 0)
            .with("step", 0)
            .with("stepPhaseShiftIncrement", 1.5)
            .with(names::CONTROL_ENABLED, true);
        if let Some(rc) = control {
            bag.put(names::TAP_CHANGER_CONTROL, rc);
        }
        self.records.phase_tap_changers.push(bag);
        self
    }

    /// Set an attribute on any record with `key_attribute == id`, across all sets.
    pub fn attribute(&mut self, key_attribute: &str, id: &str, key: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        for bags in self.record_sets_mut() {
            for bag in bags.iter_mut() {
                if bag.get(key_attribute) == Some(id) {
                    bag.put(key, &value);
                }
            }
        }
        self
    }

    fn record_sets_mut(&mut self) -> [&mut Vec<PropertyBag>; 14] {
        let r = &mut self.records;
        [
            &mut r.substations,
            &mut r.voltage_levels,
            &mut r.busbar_sections,
            &mut r.energy_consumers,
            &mut r.equivalent_injections,
            &mut r.synchronous_machines,
            &mut r.shunt_compensators,
            &mut r.static_var_compensators,
            &mut r.switches,
            &mut r.ac_line_segments,
            &mut r.transformer_ends,
            &mut r.ratio_tap_changers,
            &mut r.phase_tap_changers,
            &mut r.acdc_converters,
        ]
    }

    // =========================================================================
    // DC, limits, areas
    // =========================================================================

    /// AC/DC converter; `kind` is `vsc` or `lcc`.
    pub fn converter(&mut self, id: &str, node: &str, kind: &str, control: Option<&str>) -> &mut Self {
        let equipment_type = if kind == "lcc" { "CsConverter" } else { "VsConverter" };
        let t = self.terminal(id, equipment_type, 1, node);
        let mut bag = PropertyBag::new()
            .with("ACDCConverter", id)
            .with(names::TERMINAL, t)
            .with("converterType", kind)
            .with("lossFactor", 1.1)
            .with("qPccControl", format!("{}VsQpccControlKind.voltagePcc", CIM))
            .with("targetUpcc", 398.0)
            .with("targetQpcc", 0.0);
        if let Some(rc) = control {
            bag.put(names::REGULATING_CONTROL, rc);
        }
        self.records.acdc_converters.push(bag);
        self
    }

    pub fn dc_line(&mut self, id: &str, converter1: &str, converter2: &str) -> &mut Self {
        self.records.dc_line_segments.push(
            PropertyBag::new()
                .with("DCLineSegment", id)
                .with("ACDCConverter1", converter1)
                .with("ACDCConverter2", converter2)
                .with("r", 0.5)
                .with("ratedUdc", 320.0)
                .with("maxP", 1000.0)
                .with("activePowerSetpoint", 300.0),
        );
        self
    }

    /// Current limit on a terminal; `limit_type` is `patl` or `tatl`.
    pub fn current_limit(
        &mut self,
        id: &str,
        terminal: &str,
        limit_type: &str,
        value: f64,
        acceptable_duration: Option<u32>,
    ) -> &mut Self {
        let mut bag = PropertyBag::new()
            .with("OperationalLimit", id)
            .with("limitKind", "current")
            .with("limitType", format!("{}LimitTypeKind.{}", CIM, limit_type))
            .with(names::TERMINAL, terminal)
            .with("value", value)
            .with(names::NAME, id);
        if let Some(d) = acceptable_duration {
            bag.put("acceptableDuration", d);
        }
        self.records.operational_limits.push(bag);
        self
    }

    /// Current limit set on the equipment `equipment` instead of one terminal.
    pub fn equipment_current_limit(&mut self, id: &str, equipment: &str, limit_type: &str, value: f64) -> &mut Self {
        self.records.operational_limits.push(
            PropertyBag::new()
                .with("OperationalLimit", id)
                .with("limitKind", "current")
                .with("limitType", format!("{}LimitTypeKind.{}", CIM, limit_type))
                .with("Equipment", equipment)
                .with("value", value),
        );
        self
    }

    /// Voltage limit on the equipment `equipment`; `limit_type` is `highVoltage` or `lowVoltage`.
    pub fn voltage_limit(&mut self, id: &str, equipment: &str, limit_type: &str, value: f64) -> &mut Self {
        self.records.operational_limits.push(
            PropertyBag::new()
                .with("OperationalLimit", id)
                .with("limitKind", "voltage")
                .with("limitType", format!("{}LimitTypeKind.{}", CIM, limit_type))
                .with("Equipment", equipment)
                .with("value", value),
        );
        self
    }

    pub fn control_area(&mut self, id: &str, net_interchange: f64) -> &mut Self {
        self.records.control_areas.push(
            PropertyBag::new()
                .with("ControlArea", id)
                .with(names::NAME, id)
                .with("type", format!("{}ControlAreaTypeKind.Interchange", CIM))
                .with("netInterchange", net_interchange)
                .with("pTolerance", 10.0),
        );
        self
    }

    pub fn tie_flow(&mut self, area: &str, terminal: &str) -> &mut Self {
        self.records.tie_flows.push(
            PropertyBag::new()
                .with("ControlArea", area)
                .with(names::TERMINAL, terminal),
        );
        self
    }
}
