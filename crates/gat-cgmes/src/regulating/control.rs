//! Cached regulating control records.

use std::fmt;

use crate::names;
use crate::records::PropertyBag;

/// Regulated magnitude of a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMode {
    Voltage,
    ReactivePower,
    /// Tap changers held at their current step
    Fixed,
    CurrentFlow,
    ActivePower,
    Other(String),
}

impl ControlMode {
    /// Parse the local name of a mode kind (`RegulatingControlModeKind.voltage` -> `voltage`).
    pub fn parse(kind: &str) -> Self {
        match kind {
            "voltage" => ControlMode::Voltage,
            "reactivePower" => ControlMode::ReactivePower,
            "fixed" => ControlMode::Fixed,
            "currentFlow" => ControlMode::CurrentFlow,
            "activePower" => ControlMode::ActivePower,
            other => ControlMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Voltage => write!(f, "voltage"),
            ControlMode::ReactivePower => write!(f, "reactivePower"),
            ControlMode::Fixed => write!(f, "fixed"),
            ControlMode::CurrentFlow => write!(f, "currentFlow"),
            ControlMode::ActivePower => write!(f, "activePower"),
            ControlMode::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Whether a control has been applied to the equipment referencing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Correctness {
    #[default]
    Unresolved,
    CorrectlySet,
    /// Applied with a substitute terminal or target, or skipped
    InconsistentlySet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatingControl {
    pub id: String,
    pub mode: ControlMode,
    pub enabled: bool,
    /// NaN when absent
    pub target_value: f64,
    /// 0 when absent
    pub target_deadband: f64,
    /// Terminal where the regulated magnitude is measured
    pub terminal: Option<String>,
    pub discrete: bool,
    correctness: Correctness,
}

impl RegulatingControl {
    pub fn from_bag(bag: &PropertyBag) -> Option<Self> {
        Some(Self {
            id: bag.id(names::REGULATING_CONTROL)?,
            mode: ControlMode::parse(bag.local("mode").unwrap_or_default()),
            enabled: bag.as_bool("enabled", true),
            target_value: bag.as_f64("targetValue", f64::NAN),
            target_deadband: bag.as_f64("targetDeadband", 0.0),
            terminal: bag.id(names::TERMINAL),
            discrete: bag.as_bool("discrete", false),
            correctness: Correctness::Unresolved,
        })
    }

    pub fn correctness(&self) -> Correctness {
        self.correctness
    }

    pub fn is_correctly_set(&self) -> bool {
        self.correctness == Correctness::CorrectlySet
    }

    pub fn mark_set(&mut self) {
        self.correctness = Correctness::CorrectlySet;
    }

    /// Record a failed or substituted apply. Never downgrades a control
    /// another equipment already applied correctly.
    pub fn mark_inconsistent(&mut self) {
        if self.correctness != Correctness::CorrectlySet {
            self.correctness = Correctness::InconsistentlySet;
        }
    }

    /// Target usable as a voltage setpoint.
    pub fn has_valid_voltage_target(&self) -> bool {
        self.target_value > 0.0
    }
}
