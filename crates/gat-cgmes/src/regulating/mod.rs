//! Regulating controls: cache, register, apply.
//!
//! Equipment is converted before the equipment holding its regulated terminal
//! may exist, so regulation is resolved in two steps over tables owned by the
//! run's [`Context`](crate::context::Context):
//!
//! 1. every regulating control record is cached by id when the context is built,
//!    and each converted equipment registers a [`PendingControl`] naming the
//!    control it refers to
//! 2. [`apply::apply_all`] runs once after all equipment exists, resolves every
//!    pending record, reports controls that could not be fully applied and tears
//!    both tables down

pub mod apply;
mod control;

use std::collections::{BTreeMap, HashMap};

use gat_core::{HvdcConverterStation, Kilovolts, Megavars, SvcRegulationMode};
use tracing::debug;

use crate::error::{ConversionError, Result};
use crate::records::PropertyBag;

pub use control::{ControlMode, Correctness, RegulatingControl};

/// Which tap changer of a transformer a control belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapChangerKind {
    Ratio,
    Phase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TapChangerControl {
    pub tap_changer: String,
    pub kind: TapChangerKind,
    /// Winding index: 0 for two-winding transformers, 0..3 for three-winding ones
    pub leg: usize,
    pub control_id: String,
    /// Ratio tap changer able to change taps under load
    pub ltc_flag: bool,
    pub control_enabled: bool,
}

/// Default regulation of a converter station when its control cannot be used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConverterDefault {
    Voltage(f64),
    ReactivePower(f64),
    None,
}

impl ConverterDefault {
    /// Set the station's regulation from the record defaults.
    pub fn apply(self, station: &mut HvdcConverterStation) {
        match self {
            ConverterDefault::Voltage(v) => {
                station.voltage_setpoint = Some(Kilovolts(v));
                station.voltage_regulator_on = v > 0.0;
            }
            ConverterDefault::ReactivePower(q) => {
                station.reactive_power_setpoint = Some(Megavars(q));
                station.voltage_regulator_on = false;
            }
            ConverterDefault::None => {}
        }
    }
}

/// Per-equipment staging entry, one variant per equipment category.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingControl {
    Generator {
        control_id: String,
        control_enabled: bool,
        q_percent: Option<f64>,
    },
    Shunt {
        control_id: String,
        control_enabled: bool,
    },
    StaticVarCompensator {
        control_id: String,
        control_enabled: bool,
        default_mode: SvcRegulationMode,
        default_voltage: Option<f64>,
        default_q: Option<f64>,
    },
    Transformer {
        tap_changers: Vec<TapChangerControl>,
    },
    Converter {
        control_id: String,
        default: ConverterDefault,
    },
}

/// Apply order of the equipment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControlCategory {
    Generator,
    Shunt,
    StaticVarCompensator,
    Transformer,
    Converter,
}

impl PendingControl {
    pub fn category(&self) -> ControlCategory {
        match self {
            PendingControl::Generator { .. } => ControlCategory::Generator,
            PendingControl::Shunt { .. } => ControlCategory::Shunt,
            PendingControl::StaticVarCompensator { .. } => ControlCategory::StaticVarCompensator,
            PendingControl::Transformer { .. } => ControlCategory::Transformer,
            PendingControl::Converter { .. } => ControlCategory::Converter,
        }
    }

    /// Ids of the regulating controls this record refers to.
    pub fn control_ids(&self) -> Vec<&str> {
        match self {
            PendingControl::Generator { control_id, .. }
            | PendingControl::Shunt { control_id, .. }
            | PendingControl::StaticVarCompensator { control_id, .. }
            | PendingControl::Converter { control_id, .. } => vec![control_id.as_str()],
            PendingControl::Transformer { tap_changers } => {
                tap_changers.iter().map(|tc| tc.control_id.as_str()).collect()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RegulatingControlMapping {
    cached: HashMap<String, RegulatingControl>,
    pending: BTreeMap<String, PendingControl>,
}

impl RegulatingControlMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache one control record; later records with the same id are ignored.
    pub fn cache(&mut self, bag: &PropertyBag) {
        if let Some(control) = RegulatingControl::from_bag(bag) {
            self.cached.entry(control.id.clone()).or_insert(control);
        }
    }

    pub fn cache_all(&mut self, bags: &[PropertyBag]) {
        for bag in bags {
            self.cache(bag);
        }
        debug!(controls = self.cached.len(), "regulating controls cached");
    }

    /// Stage the control of `equipment_id`. Registering an equipment twice is an error.
    pub fn register(&mut self, equipment_id: &str, pending: PendingControl) -> Result<()> {
        if self.pending.contains_key(equipment_id) {
            return Err(ConversionError::DuplicateRegistration {
                equipment: equipment_id.to_string(),
            });
        }
        self.pending.insert(equipment_id.to_string(), pending);
        Ok(())
    }

    /// Drop the staged control of equipment removed before the apply pass.
    pub fn unregister(&mut self, equipment_id: &str) -> Option<PendingControl> {
        self.pending.remove(equipment_id)
    }

    pub fn pending(&self, equipment_id: &str) -> Option<&PendingControl> {
        self.pending.get(equipment_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn control(&self, id: &str) -> Option<&RegulatingControl> {
        self.cached.get(id)
    }

    pub fn control_mut(&mut self, id: &str) -> Option<&mut RegulatingControl> {
        self.cached.get_mut(id)
    }

    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }

    /// Pending records in apply order: by category, then by equipment id.
    pub fn take_pending(&mut self) -> Vec<(String, PendingControl)> {
        let mut pending: Vec<_> = std::mem::take(&mut self.pending).into_iter().collect();
        pending.sort_by(|(a_id, a), (b_id, b)| {
            a.category().cmp(&b.category()).then_with(|| a_id.cmp(b_id))
        });
        pending
    }

    /// Controls not applied correctly, ordered by id.
    pub fn not_correctly_set(&self) -> Vec<&RegulatingControl> {
        let mut controls: Vec<_> = self
            .cached
            .values()
            .filter(|c| !c.is_correctly_set())
            .collect();
        controls.sort_by(|a, b| a.id.cmp(&b.id));
        controls
    }

    /// Release both tables at the end of the apply pass.
    pub fn teardown(&mut self) {
        self.cached.clear();
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty() && self.pending.is_empty()
    }
}
