//! Attribute keys shared by several record classes.
//!
//! Class-specific attributes are spelled inline where they are read; the keys
//! here are the ones every converter touches.

pub const NAME: &str = "name";

pub const BASE_VOLTAGE: &str = "BaseVoltage";
pub const SUBSTATION: &str = "Substation";
pub const VOLTAGE_LEVEL: &str = "VoltageLevel";
pub const CONNECTIVITY_NODE: &str = "ConnectivityNode";
pub const TOPOLOGICAL_NODE: &str = "TopologicalNode";
pub const CONTAINER: &str = "ConnectivityNodeContainer";
pub const REGION: &str = "regionName";
pub const NOMINAL_VOLTAGE: &str = "nominalVoltage";

pub const TERMINAL: &str = "Terminal";
pub const TERMINAL1: &str = "Terminal1";
pub const TERMINAL2: &str = "Terminal2";
pub const CONDUCTING_EQUIPMENT: &str = "ConductingEquipment";
pub const CONDUCTING_EQUIPMENT_TYPE: &str = "conductingEquipmentType";
pub const SEQUENCE_NUMBER: &str = "SequenceNumber";
pub const CONNECTED: &str = "connected";

pub const BOUNDARY_POINT: &str = "boundaryPoint";
pub const PAIRING_KEY: &str = "pairingKey";

pub const REGULATING_CONTROL: &str = "RegulatingControl";
pub const CONTROL_ENABLED: &str = "controlEnabled";
pub const TAP_CHANGER_CONTROL: &str = "TapChangerControl";

pub const POWER_TRANSFORMER: &str = "PowerTransformer";
pub const TRANSFORMER_END: &str = "TransformerEnd";
pub const END_NUMBER: &str = "endNumber";

pub const P: &str = "p";
pub const Q: &str = "q";

/// Conducting equipment type of switch records.
pub const SWITCH_TYPES: &[&str] = &[
    "Switch",
    "Breaker",
    "Disconnector",
    "LoadBreakSwitch",
    "ProtectedSwitch",
    "GroundDisconnector",
    "Jumper",
];

pub fn is_switch_type(equipment_type: &str) -> bool {
    SWITCH_TYPES.contains(&equipment_type)
}
