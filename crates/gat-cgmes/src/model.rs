//! The upstream record provider.
//!
//! [`ModelRecords`] holds one record set per class, exactly as the query layer
//! produced them. [`CgmesModel`] wraps it with the indices every conversion pass
//! needs: terminals by id, node containers, base voltages and boundary nodes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::Result;
use crate::names;
use crate::records::{PropertyBag, PropertyBags};

/// Raw record sets, one per class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelRecords {
    pub model_id: String,
    pub base_voltages: PropertyBags,
    pub substations: PropertyBags,
    pub voltage_levels: PropertyBags,
    pub connectivity_nodes: PropertyBags,
    pub topological_nodes: PropertyBags,
    pub terminals: PropertyBags,
    pub busbar_sections: PropertyBags,
    pub energy_consumers: PropertyBags,
    pub equivalent_injections: PropertyBags,
    pub synchronous_machines: PropertyBags,
    pub shunt_compensators: PropertyBags,
    pub static_var_compensators: PropertyBags,
    pub switches: PropertyBags,
    pub ac_line_segments: PropertyBags,
    pub equivalent_branches: PropertyBags,
    pub transformer_ends: PropertyBags,
    pub ratio_tap_changers: PropertyBags,
    pub phase_tap_changers: PropertyBags,
    pub regulating_controls: PropertyBags,
    pub acdc_converters: PropertyBags,
    pub dc_line_segments: PropertyBags,
    pub operational_limits: PropertyBags,
    pub control_areas: PropertyBags,
    pub tie_flows: PropertyBags,
}

/// A terminal record, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CgmesTerminal {
    pub id: String,
    pub conducting_equipment: String,
    pub conducting_equipment_type: String,
    pub sequence_number: i32,
    pub connectivity_node: Option<String>,
    pub topological_node: Option<String>,
    pub connected: bool,
}

impl CgmesTerminal {
    fn from_bag(bag: &PropertyBag) -> Option<Self> {
        Some(Self {
            id: bag.id(names::TERMINAL)?,
            conducting_equipment: bag.id(names::CONDUCTING_EQUIPMENT).unwrap_or_default(),
            conducting_equipment_type: bag
                .local(names::CONDUCTING_EQUIPMENT_TYPE)
                .unwrap_or_default()
                .to_string(),
            sequence_number: bag.as_i32(names::SEQUENCE_NUMBER, 1),
            connectivity_node: bag.id(names::CONNECTIVITY_NODE),
            topological_node: bag.id(names::TOPOLOGICAL_NODE),
            connected: bag.as_bool(names::CONNECTED, true),
        })
    }

    pub fn is_switch_end(&self) -> bool {
        names::is_switch_type(&self.conducting_equipment_type)
    }
}

/// Voltage level and substation holding a connectivity or topological node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgmesContainer {
    pub voltage_level: Option<String>,
    pub substation: Option<String>,
}

#[derive(Debug, Clone)]
struct NodeInfo {
    container: Option<String>,
    topological_node: Option<String>,
    boundary: bool,
    pairing_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CgmesModel {
    records: ModelRecords,
    terminals: HashMap<String, CgmesTerminal>,
    nodes: HashMap<String, NodeInfo>,
    voltage_level_substation: HashMap<String, Option<String>>,
    base_voltages: HashMap<String, f64>,
}

impl CgmesModel {
    pub fn new(records: ModelRecords) -> Self {
        let terminals = records
            .terminals
            .iter()
            .filter_map(CgmesTerminal::from_bag)
            .map(|t| (t.id.clone(), t))
            .collect();

        let mut nodes = HashMap::new();
        for (bags, key) in [
            (&records.connectivity_nodes, names::CONNECTIVITY_NODE),
            (&records.topological_nodes, names::TOPOLOGICAL_NODE),
        ] {
            for bag in bags {
                let Some(id) = bag.id(key) else { continue };
                nodes.insert(
                    id,
                    NodeInfo {
                        container: bag.id(names::CONTAINER),
                        topological_node: if key == names::CONNECTIVITY_NODE {
                            bag.id(names::TOPOLOGICAL_NODE)
                        } else {
                            None
                        },
                        boundary: bag.as_bool(names::BOUNDARY_POINT, false),
                        pairing_key: bag.get(names::PAIRING_KEY).map(str::to_string),
                    },
                );
            }
        }

        let voltage_level_substation = records
            .voltage_levels
            .iter()
            .filter_map(|vl| Some((vl.id(names::VOLTAGE_LEVEL)?, vl.id(names::SUBSTATION))))
            .collect();

        let base_voltages = records
            .base_voltages
            .iter()
            .filter_map(|bv| {
                Some((
                    bv.id(names::BASE_VOLTAGE)?,
                    bv.as_f64_opt(names::NOMINAL_VOLTAGE)?,
                ))
            })
            .collect();

        Self {
            records,
            terminals,
            nodes,
            voltage_level_substation,
            base_voltages,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: ModelRecords = serde_json::from_str(json)?;
        Ok(Self::new(records))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn records(&self) -> &ModelRecords {
        &self.records
    }

    pub fn model_id(&self) -> &str {
        if self.records.model_id.is_empty() {
            "network"
        } else {
            &self.records.model_id
        }
    }

    /// Detailed topology is available when connectivity nodes are present.
    pub fn is_node_breaker(&self) -> bool {
        !self.records.connectivity_nodes.is_empty()
    }

    pub fn has_equipment_core(&self) -> bool {
        !self.records.voltage_levels.is_empty()
    }

    pub fn terminal(&self, id: &str) -> Option<&CgmesTerminal> {
        self.terminals.get(id)
    }

    /// Node a terminal connects to in the chosen topology detail.
    pub fn node(&self, terminal: &CgmesTerminal, node_breaker: bool) -> Option<String> {
        if node_breaker {
            terminal
                .connectivity_node
                .clone()
                .or_else(|| terminal.topological_node.clone())
        } else {
            self.topological_node(terminal)
        }
    }

    /// Topological node of a terminal, directly or through its connectivity node.
    pub fn topological_node(&self, terminal: &CgmesTerminal) -> Option<String> {
        terminal.topological_node.clone().or_else(|| {
            terminal
                .connectivity_node
                .as_ref()
                .and_then(|cn| self.nodes.get(cn))
                .and_then(|info| info.topological_node.clone())
        })
    }

    pub fn node_container(&self, node: &str) -> Option<CgmesContainer> {
        let container = self.nodes.get(node)?.container.as_ref()?;
        match self.voltage_level_substation.get(container) {
            Some(substation) => Some(CgmesContainer {
                voltage_level: Some(container.clone()),
                substation: substation.clone(),
            }),
            None => Some(CgmesContainer::default()),
        }
    }

    pub fn substation_of_voltage_level(&self, vl: &str) -> Option<&str> {
        self.voltage_level_substation.get(vl)?.as_deref()
    }

    pub fn is_boundary_node(&self, node: &str) -> bool {
        self.nodes.get(node).is_some_and(|n| n.boundary)
    }

    pub fn boundary_pairing_key(&self, node: &str) -> Option<&str> {
        self.nodes.get(node)?.pairing_key.as_deref()
    }

    pub fn base_voltage(&self, id: &str) -> Option<f64> {
        self.base_voltages.get(id).copied()
    }

    /// Transformer ends grouped by transformer id, each group ordered by end number.
    pub fn grouped_transformer_ends(&self) -> BTreeMap<String, Vec<&PropertyBag>> {
        let mut groups: BTreeMap<String, Vec<&PropertyBag>> = BTreeMap::new();
        for end in &self.records.transformer_ends {
            if let Some(id) = end.id(names::POWER_TRANSFORMER) {
                groups.entry(id).or_default().push(end);
            }
        }
        for ends in groups.values_mut() {
            ends.sort_by_key(|e| e.as_i32(names::END_NUMBER, 0));
        }
        groups
    }

    /// Ratio and phase tap changers keyed by the transformer end they sit on.
    pub fn tap_changers_by_end(&self) -> TapChangersByEnd<'_> {
        fn index_by_end(bags: &PropertyBags) -> HashMap<String, &PropertyBag> {
            bags.iter()
                .filter_map(|b| Some((b.id(names::TRANSFORMER_END)?, b)))
                .collect()
        }
        TapChangersByEnd {
            ratio: index_by_end(&self.records.ratio_tap_changers),
            phase: index_by_end(&self.records.phase_tap_changers),
        }
    }
}

pub struct TapChangersByEnd<'a> {
    pub ratio: HashMap<String, &'a PropertyBag>,
    pub phase: HashMap<String, &'a PropertyBag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> PropertyBag {
        pairs.iter().copied().collect()
    }

    fn sample() -> CgmesModel {
        let records = ModelRecords {
            substations: vec![bag(&[("Substation", "S1")])],
            voltage_levels: vec![bag(&[("VoltageLevel", "VL1"), ("Substation", "S1")])],
            connectivity_nodes: vec![
                bag(&[
                    ("ConnectivityNode", "CN1"),
                    ("ConnectivityNodeContainer", "VL1"),
                    ("TopologicalNode", "TN1"),
                ]),
                bag(&[
                    ("ConnectivityNode", "XN"),
                    ("ConnectivityNodeContainer", "LINE_CONTAINER"),
                    ("boundaryPoint", "true"),
                    ("pairingKey", "XNODE_A"),
                ]),
            ],
            terminals: vec![bag(&[
                ("Terminal", "#_T1"),
                ("ConductingEquipment", "BRK1"),
                ("conductingEquipmentType", "cim:Breaker"),
                ("SequenceNumber", "2"),
                ("ConnectivityNode", "CN1"),
            ])],
            transformer_ends: vec![
                bag(&[("TransformerEnd", "E2"), ("PowerTransformer", "PT"), ("endNumber", "2")]),
                bag(&[("TransformerEnd", "E1"), ("PowerTransformer", "PT"), ("endNumber", "1")]),
            ],
            ..ModelRecords::default()
        };
        CgmesModel::new(records)
    }

    #[test]
    fn test_terminal_index() {
        let model = sample();
        let t = model.terminal("T1").unwrap();
        assert_eq!(t.conducting_equipment, "BRK1");
        assert_eq!(t.sequence_number, 2);
        assert!(t.connected);
        assert!(t.is_switch_end());
    }

    #[test]
    fn test_node_resolution_by_detail() {
        let model = sample();
        let t = model.terminal("T1").unwrap();
        assert_eq!(model.node(t, true).as_deref(), Some("CN1"));
        assert_eq!(model.node(t, false).as_deref(), Some("TN1"));
    }

    #[test]
    fn test_containers_and_boundary() {
        let model = sample();
        let c = model.node_container("CN1").unwrap();
        assert_eq!(c.voltage_level.as_deref(), Some("VL1"));
        assert_eq!(c.substation.as_deref(), Some("S1"));
        assert_eq!(model.node_container("XN"), Some(CgmesContainer::default()));
        assert!(model.is_boundary_node("XN"));
        assert_eq!(model.boundary_pairing_key("XN"), Some("XNODE_A"));
        assert!(!model.is_boundary_node("CN1"));
    }

    #[test]
    fn test_transformer_ends_sorted() {
        let model = sample();
        let groups = model.grouped_transformer_ends();
        let ends: Vec<_> = groups["PT"]
            .iter()
            .map(|e| e.id("TransformerEnd").unwrap())
            .collect();
        assert_eq!(ends, vec!["E1", "E2"]);
    }

    #[test]
    fn test_json_loading() {
        let json = r#"{
            "modelId": "grid",
            "voltageLevels": [{"VoltageLevel": "VL1"}],
            "terminals": [{"Terminal": "T1", "ConductingEquipment": "G1", "connected": "false"}]
        }"#;
        let model = CgmesModel::from_json_str(json).unwrap();
        assert_eq!(model.model_id(), "grid");
        assert!(model.has_equipment_core());
        assert!(!model.is_node_breaker());
        assert!(!model.terminal("T1").unwrap().connected);
    }
}
