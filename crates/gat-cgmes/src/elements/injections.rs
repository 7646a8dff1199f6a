//! Loads, equivalent injections, shunts, static var compensators and generators.
//!
//! Equipment referring to a regulating control registers a pending record; its
//! regulation is left off here and set by the apply pass.

use gat_core::{
    EquipmentData, Generator, Kilovolts, Load, Megavars, MegavoltAmperes, Megawatts,
    ShuntCompensator, Siemens, StaticVarCompensator, SvcRegulationMode,
};
use tracing::debug;

use super::injection_end;
use crate::context::Context;
use crate::error::Result;
use crate::names;
use crate::records::PropertyBag;
use crate::regulating::PendingControl;

pub fn convert_loads(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().energy_consumers {
        let Some(id) = bag.id("EnergyConsumer") else {
            continue;
        };
        let what = format!("EnergyConsumer {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };
        let load = Load {
            p0: Megawatts(bag.as_f64(names::P, 0.0)),
            q0: Megavars(bag.as_f64(names::Q, 0.0)),
        };
        ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::Load(load), &[end])?;
    }
    Ok(())
}

/// Equivalent injections become generators. Those at boundary nodes feed the
/// dangling lines cut there and are skipped unless boundary conversion is on.
pub fn convert_equivalent_injections(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().equivalent_injections {
        let Some(id) = bag.id("EquivalentInjection") else {
            continue;
        };
        if !ctx.config.convert_boundary && ctx.boundary.is_boundary_injection(&id) {
            debug!(injection = %id, "kept as boundary injection");
            continue;
        }
        let what = format!("EquivalentInjection {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };

        let regulating = bag.as_bool("regulationStatus", false);
        let target_v = bag
            .as_f64_opt("regulationTarget")
            .filter(|v| *v > 0.0)
            .map(Kilovolts);
        if regulating && target_v.is_none() {
            ctx.ignored(&what, "Regulation without a valid target voltage");
        }
        let generator = Generator {
            min_p: Megawatts(bag.as_f64("minP", -f64::MAX)),
            max_p: Megawatts(bag.as_f64("maxP", f64::MAX)),
            target_p: Megawatts(-bag.as_f64(names::P, 0.0)),
            target_q: Megavars(-bag.as_f64(names::Q, 0.0)),
            target_v,
            voltage_regulator_on: regulating && target_v.is_some(),
            ..Generator::default()
        };
        let idx = ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::Generator(generator), &[end])?;
        let own = ctx.network.equipment(idx).and_then(|e| e.terminal(1));
        if let Some(eq) = ctx.network.equipment_mut(idx) {
            if let EquipmentData::Generator(g) = &mut eq.data {
                g.regulating_terminal = own;
            }
        }
    }
    Ok(())
}

fn control_id(bag: &PropertyBag) -> Option<String> {
    bag.id(names::REGULATING_CONTROL)
}

pub fn convert_shunt_compensators(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().shunt_compensators {
        let Some(id) = bag.id("ShuntCompensator") else {
            continue;
        };
        let what = format!("ShuntCompensator {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };

        let maximum = bag.as_i32("maximumSections", 1).max(0) as u32;
        let mut sections = bag.as_i32("sections", maximum as i32).max(0) as u32;
        if sections > maximum {
            ctx.fixed_value(&what, "Section count above maximum", sections, maximum);
            sections = maximum;
        }
        let shunt = ShuntCompensator {
            b_per_section: Siemens(bag.as_f64("bPerSection", 0.0)),
            g_per_section: Siemens(bag.as_f64("gPerSection", 0.0)),
            maximum_section_count: maximum,
            section_count: sections,
            ..ShuntCompensator::default()
        };
        ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::ShuntCompensator(shunt), &[end])?;

        if let Some(control_id) = control_id(bag) {
            ctx.regulating_controls.register(
                &id,
                PendingControl::Shunt {
                    control_id,
                    control_enabled: bag.as_bool(names::CONTROL_ENABLED, false),
                },
            )?;
        }
    }
    Ok(())
}

/// Record-level regulation of a static var compensator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvcDefaults {
    pub mode: SvcRegulationMode,
    pub voltage: Option<f64>,
    pub q: Option<f64>,
}

impl SvcDefaults {
    /// Read from the record. Voltage mode without a positive setpoint is off.
    pub fn from_bag(bag: &PropertyBag) -> Self {
        let voltage = bag.as_f64_opt("voltageSetPoint");
        let q = bag.as_f64_opt(names::Q);
        let mode = match bag.local("sVCControlMode") {
            Some("voltage") if voltage.is_some_and(|v| v > 0.0) => SvcRegulationMode::Voltage,
            Some("reactivePower") if q.is_some() => SvcRegulationMode::ReactivePower,
            _ => SvcRegulationMode::Off,
        };
        Self { mode, voltage, q }
    }

    pub fn apply(&self, svc: &mut StaticVarCompensator) {
        svc.regulation_mode = self.mode;
        svc.voltage_setpoint = self.voltage.map(Kilovolts);
        svc.reactive_power_setpoint = self.q.map(Megavars);
        svc.regulating_terminal = None;
    }
}

fn susceptance(rating: f64) -> Siemens {
    if rating == 0.0 || rating.is_nan() {
        Siemens(0.0)
    } else {
        Siemens(1.0 / rating)
    }
}

pub fn convert_static_var_compensators(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().static_var_compensators {
        let Some(id) = bag.id("StaticVarCompensator") else {
            continue;
        };
        let what = format!("StaticVarCompensator {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };

        let defaults = SvcDefaults::from_bag(bag);
        let mut svc = StaticVarCompensator {
            b_min: susceptance(bag.as_f64("inductiveRating", 0.0)),
            b_max: susceptance(bag.as_f64("capacitiveRating", 0.0)),
            ..StaticVarCompensator::default()
        };
        let control = control_id(bag);
        if control.is_none() {
            defaults.apply(&mut svc);
        }
        ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::StaticVarCompensator(svc), &[end])?;

        if let Some(control_id) = control {
            ctx.regulating_controls.register(
                &id,
                PendingControl::StaticVarCompensator {
                    control_id,
                    control_enabled: bag.as_bool(names::CONTROL_ENABLED, false),
                    default_mode: defaults.mode,
                    default_voltage: defaults.voltage,
                    default_q: defaults.q,
                },
            )?;
        }
    }
    Ok(())
}

pub fn convert_generators(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().synchronous_machines {
        let Some(id) = bag.id("SynchronousMachine") else {
            continue;
        };
        let what = format!("SynchronousMachine {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };

        let mut min_p = bag.as_f64("minP", 0.0);
        let mut max_p = bag.as_f64("maxP", f64::MAX);
        if min_p > max_p {
            ctx.fixed(&what, format!("minP {} above maxP {}, limits swapped", min_p, max_p));
            std::mem::swap(&mut min_p, &mut max_p);
        }
        let generator = Generator {
            min_p: Megawatts(min_p),
            max_p: Megawatts(max_p),
            target_p: Megawatts(-bag.as_f64(names::P, 0.0)),
            target_q: Megavars(-bag.as_f64(names::Q, 0.0)),
            rated_s: bag
                .as_f64_opt("ratedS")
                .filter(|s| *s > 0.0)
                .map(MegavoltAmperes),
            ..Generator::default()
        };
        ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::Generator(generator), &[end])?;

        if let Some(control_id) = control_id(bag) {
            ctx.regulating_controls.register(
                &id,
                PendingControl::Generator {
                    control_id,
                    control_enabled: bag.as_bool(names::CONTROL_ENABLED, false),
                    q_percent: bag.as_f64_opt("qPercent"),
                },
            )?;
        }
    }
    Ok(())
}
