//! Equipment attached to the network through terminals.
//!
//! Each [`Equipment`] carries its identity, its terminals (one per side) and a
//! kind-specific payload in [`EquipmentData`]. Regulation settings (regulating
//! terminal, targets, enabled flags) live on the payloads and are filled in after
//! all equipment exists, once remote terminals can be resolved.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::units::{
    Amperes, Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, Ohms, Siemens,
};
use crate::TerminalIdx;

/// Discriminant of [`EquipmentData`], used for type checks during lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EquipmentKind {
    BusbarSection,
    Load,
    Generator,
    ShuntCompensator,
    StaticVarCompensator,
    HvdcConverterStation,
    Line,
    DanglingLine,
    TwoWindingsTransformer,
    ThreeWindingsTransformer,
}

impl EquipmentKind {
    /// Equipment able to hold a voltage target at its own terminal.
    pub fn can_regulate_voltage(self) -> bool {
        matches!(
            self,
            EquipmentKind::Generator
                | EquipmentKind::ShuntCompensator
                | EquipmentKind::StaticVarCompensator
                | EquipmentKind::HvdcConverterStation
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            EquipmentKind::BusbarSection => "busbar section",
            EquipmentKind::Load => "load",
            EquipmentKind::Generator => "generator",
            EquipmentKind::ShuntCompensator => "shunt compensator",
            EquipmentKind::StaticVarCompensator => "static var compensator",
            EquipmentKind::HvdcConverterStation => "HVDC converter station",
            EquipmentKind::Line => "line",
            EquipmentKind::DanglingLine => "dangling line",
            EquipmentKind::TwoWindingsTransformer => "two-winding transformer",
            EquipmentKind::ThreeWindingsTransformer => "three-winding transformer",
        }
    }
}

// ============================================================================
// Injections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Load {
    pub p0: Megawatts,
    pub q0: Megavars,
}

/// Remote reactive power control of a generator, measured at another terminal.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteReactivePowerControl {
    pub target_q: Megavars,
    pub regulating_terminal: TerminalIdx,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generator {
    pub min_p: Megawatts,
    pub max_p: Megawatts,
    pub target_p: Megawatts,
    pub target_q: Megavars,
    pub rated_s: Option<MegavoltAmperes>,
    pub target_v: Option<Kilovolts>,
    pub voltage_regulator_on: bool,
    pub regulating_terminal: Option<TerminalIdx>,
    /// Share of the reactive support provided to a shared regulated bus
    pub q_percent: Option<f64>,
    pub remote_reactive_power_control: Option<RemoteReactivePowerControl>,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            min_p: Megawatts(0.0),
            max_p: Megawatts(f64::MAX),
            target_p: Megawatts(0.0),
            target_q: Megavars(0.0),
            rated_s: None,
            target_v: None,
            voltage_regulator_on: false,
            regulating_terminal: None,
            q_percent: None,
            remote_reactive_power_control: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShuntCompensator {
    pub b_per_section: Siemens,
    pub g_per_section: Siemens,
    pub maximum_section_count: u32,
    pub section_count: u32,
    pub target_v: Option<Kilovolts>,
    pub target_deadband: Option<Kilovolts>,
    pub voltage_regulator_on: bool,
    pub regulating_terminal: Option<TerminalIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SvcRegulationMode {
    Voltage,
    ReactivePower,
    #[default]
    Off,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StaticVarCompensator {
    pub b_min: Siemens,
    pub b_max: Siemens,
    pub voltage_setpoint: Option<Kilovolts>,
    pub reactive_power_setpoint: Option<Megavars>,
    pub regulation_mode: SvcRegulationMode,
    pub regulating_terminal: Option<TerminalIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConverterKind {
    /// Voltage source converter
    Vsc,
    /// Line commutated converter
    Lcc,
}

#[derive(Debug, Clone, Serialize)]
pub struct HvdcConverterStation {
    pub kind: ConverterKind,
    pub loss_factor: f64,
    pub voltage_regulator_on: bool,
    pub voltage_setpoint: Option<Kilovolts>,
    pub reactive_power_setpoint: Option<Megavars>,
    pub regulating_terminal: Option<TerminalIdx>,
    /// Id of the HVDC line the station belongs to, once known
    pub hvdc_line: Option<String>,
}

// ============================================================================
// Branches
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Line {
    pub r: Ohms,
    pub x: Ohms,
    pub g1: Siemens,
    pub b1: Siemens,
    pub g2: Siemens,
    pub b2: Siemens,
}

/// A line cut at the boundary: the boundary side is represented by a constant
/// injection (p0, q0) and a pairing key used to build tie lines.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DanglingLine {
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
    pub p0: Megawatts,
    pub q0: Megavars,
    pub pairing_key: Option<String>,
    /// Boundary node the line was cut at
    pub boundary_node: Option<String>,
    pub boundary_connected: bool,
    /// Tie line this dangling line is part of, once paired
    pub tie_line: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseRegulationMode {
    CurrentLimiter,
    ActivePowerControl,
    FixedTap,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatioTapChanger {
    pub id: String,
    pub low_tap: i32,
    pub tap_position: i32,
    /// Ratio per step, `low_tap` first
    pub steps: Vec<f64>,
    pub load_tap_changing_capabilities: bool,
    pub regulating: bool,
    pub target_v: Option<Kilovolts>,
    pub target_deadband: Option<Kilovolts>,
    pub regulating_terminal: Option<TerminalIdx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTapChanger {
    pub id: String,
    pub low_tap: i32,
    pub tap_position: i32,
    /// Phase shift per step, `low_tap` first
    pub steps: Vec<Degrees>,
    pub regulation_mode: PhaseRegulationMode,
    pub regulating: bool,
    pub regulation_value: Option<f64>,
    pub target_deadband: Option<f64>,
    pub regulating_terminal: Option<TerminalIdx>,
}

/// Series parameters of one winding, referred to its own rated voltage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Winding {
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
    pub rated_u: Kilovolts,
    pub rated_s: Option<MegavoltAmperes>,
    pub ratio_tap_changer: Option<RatioTapChanger>,
    pub phase_tap_changer: Option<PhaseTapChanger>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TwoWindingsTransformer {
    /// Series and magnetizing parameters, referred to side 2
    pub r: Ohms,
    pub x: Ohms,
    pub g: Siemens,
    pub b: Siemens,
    pub rated_u1: Kilovolts,
    pub rated_u2: Kilovolts,
    pub rated_s: Option<MegavoltAmperes>,
    pub ratio_tap_changer: Option<RatioTapChanger>,
    pub phase_tap_changer: Option<PhaseTapChanger>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreeWindingsTransformer {
    pub legs: [Winding; 3],
    pub rated_u0: Kilovolts,
}

// ============================================================================
// Container
// ============================================================================

/// Current limits attached to one terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentLimits {
    pub permanent: Option<Amperes>,
    /// Longest acceptable duration first
    pub temporary: Vec<TemporaryLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporaryLimit {
    pub name: String,
    pub acceptable_duration: Option<u32>,
    pub value: Amperes,
}

#[derive(Debug, Clone, Serialize)]
pub enum EquipmentData {
    BusbarSection,
    Load(Load),
    Generator(Generator),
    ShuntCompensator(ShuntCompensator),
    StaticVarCompensator(StaticVarCompensator),
    HvdcConverterStation(HvdcConverterStation),
    Line(Line),
    DanglingLine(DanglingLine),
    TwoWindingsTransformer(TwoWindingsTransformer),
    ThreeWindingsTransformer(ThreeWindingsTransformer),
}

impl EquipmentData {
    pub fn kind(&self) -> EquipmentKind {
        match self {
            EquipmentData::BusbarSection => EquipmentKind::BusbarSection,
            EquipmentData::Load(_) => EquipmentKind::Load,
            EquipmentData::Generator(_) => EquipmentKind::Generator,
            EquipmentData::ShuntCompensator(_) => EquipmentKind::ShuntCompensator,
            EquipmentData::StaticVarCompensator(_) => EquipmentKind::StaticVarCompensator,
            EquipmentData::HvdcConverterStation(_) => EquipmentKind::HvdcConverterStation,
            EquipmentData::Line(_) => EquipmentKind::Line,
            EquipmentData::DanglingLine(_) => EquipmentKind::DanglingLine,
            EquipmentData::TwoWindingsTransformer(_) => EquipmentKind::TwoWindingsTransformer,
            EquipmentData::ThreeWindingsTransformer(_) => EquipmentKind::ThreeWindingsTransformer,
        }
    }

    /// Number of terminals the equipment must be created with.
    pub fn side_count(&self) -> usize {
        match self {
            EquipmentData::Line(_) | EquipmentData::TwoWindingsTransformer(_) => 2,
            EquipmentData::ThreeWindingsTransformer(_) => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Equipment {
    pub id: String,
    pub name: Option<String>,
    pub data: EquipmentData,
    /// Terminals ordered by side (side 1 first)
    pub terminals: Vec<TerminalIdx>,
    /// Free-form properties carried over from the input (aliases, regions)
    pub properties: BTreeMap<String, String>,
    pub(crate) removed: bool,
}

impl Equipment {
    pub fn kind(&self) -> EquipmentKind {
        self.data.kind()
    }

    /// Terminal on `side` (1-based).
    pub fn terminal(&self, side: usize) -> Option<TerminalIdx> {
        side.checked_sub(1)
            .and_then(|i| self.terminals.get(i))
            .copied()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_capable_kinds() {
        assert!(EquipmentKind::Generator.can_regulate_voltage());
        assert!(EquipmentKind::HvdcConverterStation.can_regulate_voltage());
        assert!(!EquipmentKind::BusbarSection.can_regulate_voltage());
        assert!(!EquipmentKind::Line.can_regulate_voltage());
    }

    #[test]
    fn test_side_count() {
        assert_eq!(EquipmentData::Line(Line::default()).side_count(), 2);
        assert_eq!(
            EquipmentData::ThreeWindingsTransformer(ThreeWindingsTransformer::default())
                .side_count(),
            3
        );
        assert_eq!(EquipmentData::BusbarSection.side_count(), 1);
    }

    #[test]
    fn test_terminal_by_side() {
        let eq = Equipment {
            id: "L1".into(),
            name: None,
            data: EquipmentData::Line(Line::default()),
            terminals: vec![TerminalIdx::new(4), TerminalIdx::new(5)],
            properties: BTreeMap::new(),
            removed: false,
        };
        assert_eq!(eq.terminal(1), Some(TerminalIdx::new(4)));
        assert_eq!(eq.terminal(2), Some(TerminalIdx::new(5)));
        assert_eq!(eq.terminal(0), None);
        assert_eq!(eq.terminal(3), None);
        assert_eq!(eq.label(), "L1");
    }
}
