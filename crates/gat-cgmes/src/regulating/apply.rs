//! Resolution of pending regulating controls.
//!
//! One pass, after all equipment exists. Each pending record goes through
//! [`apply_pending`], which picks the resolver of its equipment category. The
//! resolvers share the cached control lookup and the terminal mapper and differ
//! only in the payload fields they set.

use gat_core::{
    EquipmentData, EquipmentIdx, Kilovolts, Megavars, PhaseRegulationMode,
    PhaseTapChanger, RatioTapChanger, RemoteReactivePowerControl, SvcRegulationMode,
    TerminalIdx,
};
use tracing::{debug, info};

use super::{
    ControlMode, ConverterDefault, PendingControl, RegulatingControl, TapChangerControl,
    TapChangerKind,
};
use crate::context::Context;
use crate::elements::injections::SvcDefaults;
use crate::topology::RegulatingTerminalMapper;

/// Apply every pending control, report the ones left unset and tear the tables down.
pub fn apply_all(ctx: &mut Context) {
    let pending = ctx.regulating_controls.take_pending();
    info!(
        pending = pending.len(),
        cached = ctx.regulating_controls.cached_count(),
        "Applying regulating controls"
    );
    for (equipment_id, control) in pending {
        apply_pending(ctx, &equipment_id, control);
    }

    let unset: Vec<(String, ControlMode)> = ctx
        .regulating_controls
        .not_correctly_set()
        .into_iter()
        .map(|rc| (rc.id.clone(), rc.mode.clone()))
        .collect();
    for (id, mode) in unset {
        ctx.pending(
            format!("Regulating control {}", id),
            format!("{} control not entirely handled", mode),
        );
    }
    ctx.regulating_controls.teardown();
}

/// Resolve one pending record against the cached controls.
pub fn apply_pending(ctx: &mut Context, equipment_id: &str, pending: PendingControl) {
    let Some(idx) = ctx.network.find_equipment(equipment_id) else {
        ctx.missing(format!("Equipment {} with pending regulating control", equipment_id));
        return;
    };
    debug!(equipment = equipment_id, category = ?pending.category(), "apply control");
    match pending {
        PendingControl::Generator {
            control_id,
            control_enabled,
            q_percent,
        } => apply_generator(ctx, idx, equipment_id, &control_id, control_enabled, q_percent),
        PendingControl::Shunt {
            control_id,
            control_enabled,
        } => apply_shunt(ctx, idx, equipment_id, &control_id, control_enabled),
        PendingControl::StaticVarCompensator {
            control_id,
            control_enabled,
            default_mode,
            default_voltage,
            default_q,
        } => {
            let defaults = SvcDefaults {
                mode: default_mode,
                voltage: default_voltage,
                q: default_q,
            };
            apply_svc(ctx, idx, equipment_id, &control_id, control_enabled, defaults)
        }
        PendingControl::Transformer { tap_changers } => {
            for tc in &tap_changers {
                apply_tap_changer(ctx, idx, equipment_id, tc);
            }
            resolve_tap_changer_conflicts(ctx, idx, equipment_id);
        }
        PendingControl::Converter {
            control_id,
            default,
        } => apply_converter(ctx, idx, equipment_id, &control_id, default),
    }
}

// ============================================================================
// Shared resolution
// ============================================================================

/// Outcome of resolving a voltage control for one equipment.
#[derive(Debug, Clone, Copy)]
struct VoltageResolution {
    terminal: TerminalIdx,
    target: Option<f64>,
    /// The control's own terminal was used
    correct: bool,
}

fn cached(ctx: &mut Context, control_id: &str) -> Option<RegulatingControl> {
    let control = ctx.regulating_controls.control(control_id).cloned();
    if control.is_none() {
        ctx.missing(format!("Regulating control {}", control_id));
    }
    control
}

fn mark(ctx: &mut Context, control_id: &str, correct: bool) {
    if let Some(rc) = ctx.regulating_controls.control_mut(control_id) {
        if correct {
            rc.mark_set();
        } else {
            rc.mark_inconsistent();
        }
    }
}

fn own_terminal(ctx: &Context, idx: EquipmentIdx) -> Option<TerminalIdx> {
    ctx.network.equipment(idx)?.terminals.first().copied()
}

fn data_mut<'c>(ctx: &'c mut Context, idx: EquipmentIdx) -> Option<&'c mut EquipmentData> {
    ctx.network.equipment_mut(idx).map(|e| &mut e.data)
}

fn nominal_v(ctx: &Context, terminal: TerminalIdx) -> Option<f64> {
    ctx.network.terminal_nominal_v(terminal).map(|v| v.value())
}

fn describe(target: Option<f64>) -> String {
    target.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Regulated terminal and voltage target for a voltage control.
///
/// An unmapped terminal falls back to `own` with its nominal voltage. A target
/// that is not strictly positive is replaced by the nominal voltage of the
/// regulated terminal while regulating, and dropped otherwise.
fn resolve_voltage(
    ctx: &mut Context,
    what: &str,
    rc: &RegulatingControl,
    own: TerminalIdx,
    regulating: bool,
) -> VoltageResolution {
    let mapped = {
        let mapper = RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals);
        rc.terminal
            .as_deref()
            .and_then(|t| mapper.map_for_voltage_control(t))
    };

    match mapped {
        None => {
            let nominal = nominal_v(ctx, own);
            let reason = format!(
                "Regulating terminal {} of control {} not mapped, regulating at own terminal",
                rc.terminal.as_deref().unwrap_or("(none)"),
                rc.id
            );
            if regulating {
                ctx.fixed_value(what, reason, rc.target_value, describe(nominal));
            } else {
                ctx.ignored(what, reason);
            }
            VoltageResolution {
                terminal: own,
                target: nominal,
                correct: false,
            }
        }
        Some(terminal) if rc.has_valid_voltage_target() => VoltageResolution {
            terminal,
            target: Some(rc.target_value),
            correct: true,
        },
        Some(terminal) if regulating => {
            let nominal = nominal_v(ctx, terminal);
            ctx.fixed_value(
                what,
                format!(
                    "Invalid voltage target of control {}, nominal voltage of regulated terminal used",
                    rc.id
                ),
                rc.target_value,
                describe(nominal),
            );
            VoltageResolution {
                terminal,
                target: nominal,
                correct: true,
            }
        }
        Some(terminal) => {
            ctx.ignored(
                what,
                format!("Invalid voltage target of control {} not regulating", rc.id),
            );
            VoltageResolution {
                terminal,
                target: None,
                correct: true,
            }
        }
    }
}

/// Deadband, 0 when negative or NaN.
fn valid_deadband(ctx: &mut Context, what: &str, rc: &RegulatingControl) -> f64 {
    if rc.target_deadband >= 0.0 {
        return rc.target_deadband;
    }
    ctx.fixed_value(
        what,
        format!("Invalid target deadband of control {}", rc.id),
        rc.target_deadband,
        0.0,
    );
    0.0
}

fn unsupported(ctx: &mut Context, what: &str, rc: &RegulatingControl) {
    ctx.ignored(
        what,
        format!("Unsupported regulation mode {} of control {}", rc.mode, rc.id),
    );
    mark(ctx, &rc.id, false);
}

// ============================================================================
// Generators
// ============================================================================

fn apply_generator(
    ctx: &mut Context,
    idx: EquipmentIdx,
    equipment_id: &str,
    control_id: &str,
    control_enabled: bool,
    q_percent: Option<f64>,
) {
    let Some(rc) = cached(ctx, control_id) else {
        return;
    };
    let what = format!("Generator {}", equipment_id);
    let regulating = rc.enabled && control_enabled;

    match rc.mode {
        ControlMode::Voltage => {
            let Some(own) = own_terminal(ctx, idx) else {
                return;
            };
            let resolution = resolve_voltage(ctx, &what, &rc, own, regulating);
            if let Some(EquipmentData::Generator(g)) = data_mut(ctx, idx) {
                g.regulating_terminal = Some(resolution.terminal);
                g.target_v = resolution.target.map(Kilovolts);
                g.voltage_regulator_on = regulating && resolution.target.is_some();
                g.q_percent = q_percent;
            }
            mark(ctx, control_id, resolution.correct);
        }
        ControlMode::ReactivePower => {
            let mapped = {
                let mapper =
                    RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals);
                rc.terminal
                    .as_deref()
                    .and_then(|t| mapper.map_for_flow_control(t))
            };
            match mapped {
                Some(ts) if rc.target_value.is_finite() => {
                    if let Some(EquipmentData::Generator(g)) = data_mut(ctx, idx) {
                        g.remote_reactive_power_control = Some(RemoteReactivePowerControl {
                            target_q: Megavars(rc.target_value * f64::from(ts.sign)),
                            regulating_terminal: ts.terminal,
                            enabled: regulating,
                        });
                    }
                    mark(ctx, control_id, true);
                }
                Some(_) => {
                    ctx.ignored(
                        what,
                        format!("Reactive power control {} has no target value", rc.id),
                    );
                    mark(ctx, control_id, false);
                }
                None => {
                    ctx.ignored(
                        what,
                        format!(
                            "Reactive power control {}: regulating terminal not mapped or mapped only to a switch",
                            rc.id
                        ),
                    );
                    mark(ctx, control_id, false);
                }
            }
        }
        _ => unsupported(ctx, &what, &rc),
    }
}

// ============================================================================
// Shunt compensators
// ============================================================================

fn apply_shunt(
    ctx: &mut Context,
    idx: EquipmentIdx,
    equipment_id: &str,
    control_id: &str,
    control_enabled: bool,
) {
    let Some(rc) = cached(ctx, control_id) else {
        return;
    };
    let what = format!("ShuntCompensator {}", equipment_id);
    if rc.mode != ControlMode::Voltage {
        unsupported(ctx, &what, &rc);
        return;
    }
    let Some(own) = own_terminal(ctx, idx) else {
        return;
    };
    let regulating = rc.enabled && control_enabled;
    let resolution = resolve_voltage(ctx, &what, &rc, own, regulating);
    let deadband = valid_deadband(ctx, &what, &rc);
    if let Some(EquipmentData::ShuntCompensator(sh)) = data_mut(ctx, idx) {
        sh.regulating_terminal = Some(resolution.terminal);
        sh.target_v = resolution.target.map(Kilovolts);
        sh.target_deadband = Some(Kilovolts(deadband));
        sh.voltage_regulator_on = regulating && resolution.target.is_some();
    }
    mark(ctx, control_id, resolution.correct);
}

// ============================================================================
// Static var compensators
// ============================================================================

fn apply_svc_defaults(ctx: &mut Context, idx: EquipmentIdx, defaults: SvcDefaults) {
    if let Some(EquipmentData::StaticVarCompensator(svc)) = data_mut(ctx, idx) {
        defaults.apply(svc);
    }
}

fn apply_svc(
    ctx: &mut Context,
    idx: EquipmentIdx,
    equipment_id: &str,
    control_id: &str,
    control_enabled: bool,
    defaults: SvcDefaults,
) {
    let Some(rc) = cached(ctx, control_id) else {
        apply_svc_defaults(ctx, idx, defaults);
        return;
    };
    let what = format!("StaticVarCompensator {}", equipment_id);
    let regulating = rc.enabled && control_enabled;
    let Some(own) = own_terminal(ctx, idx) else {
        return;
    };

    match rc.mode {
        ControlMode::Voltage => {
            let resolution = resolve_voltage(ctx, &what, &rc, own, regulating);
            if let Some(EquipmentData::StaticVarCompensator(svc)) = data_mut(ctx, idx) {
                svc.regulating_terminal = Some(resolution.terminal);
                svc.voltage_setpoint = resolution.target.map(Kilovolts);
                svc.regulation_mode = if regulating && resolution.target.is_some() {
                    SvcRegulationMode::Voltage
                } else {
                    SvcRegulationMode::Off
                };
            }
            mark(ctx, control_id, resolution.correct);
        }
        ControlMode::ReactivePower => {
            let mapped = {
                let mapper =
                    RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals);
                rc.terminal
                    .as_deref()
                    .and_then(|t| mapper.map_for_voltage_control(t))
            };
            match mapped {
                Some(terminal) if rc.target_value.is_finite() => {
                    if let Some(EquipmentData::StaticVarCompensator(svc)) = data_mut(ctx, idx) {
                        svc.regulating_terminal = Some(terminal);
                        svc.reactive_power_setpoint = Some(Megavars(rc.target_value));
                        svc.regulation_mode = if regulating {
                            SvcRegulationMode::ReactivePower
                        } else {
                            SvcRegulationMode::Off
                        };
                    }
                    mark(ctx, control_id, true);
                }
                _ => {
                    ctx.ignored(
                        what,
                        format!(
                            "Reactive power control {}: regulating terminal not mapped or no target, record defaults kept",
                            rc.id
                        ),
                    );
                    apply_svc_defaults(ctx, idx, defaults);
                    mark(ctx, control_id, false);
                }
            }
        }
        _ => unsupported(ctx, &what, &rc),
    }
}

// ============================================================================
// Converter stations
// ============================================================================

fn apply_converter_default(ctx: &mut Context, idx: EquipmentIdx, default: ConverterDefault) {
    if let Some(EquipmentData::HvdcConverterStation(station)) = data_mut(ctx, idx) {
        default.apply(station);
    }
}

fn apply_converter(
    ctx: &mut Context,
    idx: EquipmentIdx,
    equipment_id: &str,
    control_id: &str,
    default: ConverterDefault,
) {
    let Some(rc) = cached(ctx, control_id) else {
        apply_converter_default(ctx, idx, default);
        return;
    };
    let what = format!("ACDCConverter {}", equipment_id);
    let Some(own) = own_terminal(ctx, idx) else {
        return;
    };

    match rc.mode {
        ControlMode::Voltage => {
            let resolution = resolve_voltage(ctx, &what, &rc, own, rc.enabled);
            if let Some(EquipmentData::HvdcConverterStation(station)) = data_mut(ctx, idx) {
                station.regulating_terminal = Some(resolution.terminal);
                station.voltage_setpoint = resolution.target.map(Kilovolts);
                station.voltage_regulator_on = rc.enabled && resolution.target.is_some();
            }
            mark(ctx, control_id, resolution.correct);
        }
        ControlMode::ReactivePower => {
            let mapped = {
                let mapper =
                    RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals);
                rc.terminal
                    .as_deref()
                    .and_then(|t| mapper.map_for_voltage_control(t))
            };
            match mapped {
                Some(terminal) if rc.target_value.is_finite() => {
                    if let Some(EquipmentData::HvdcConverterStation(station)) = data_mut(ctx, idx) {
                        station.regulating_terminal = Some(terminal);
                        station.reactive_power_setpoint = Some(Megavars(rc.target_value));
                        station.voltage_regulator_on = false;
                    }
                    mark(ctx, control_id, true);
                }
                _ => {
                    ctx.ignored(
                        what,
                        format!(
                            "Reactive power control {}: regulating terminal not mapped or no target, record defaults kept",
                            rc.id
                        ),
                    );
                    apply_converter_default(ctx, idx, default);
                    mark(ctx, control_id, false);
                }
            }
        }
        _ => unsupported(ctx, &what, &rc),
    }
}

// ============================================================================
// Tap changers
// ============================================================================

fn ratio_tap_changer(data: &mut EquipmentData, leg: usize) -> Option<&mut RatioTapChanger> {
    match data {
        EquipmentData::TwoWindingsTransformer(t) => t.ratio_tap_changer.as_mut(),
        EquipmentData::ThreeWindingsTransformer(t) => t.legs.get_mut(leg)?.ratio_tap_changer.as_mut(),
        _ => None,
    }
}

fn phase_tap_changer(data: &mut EquipmentData, leg: usize) -> Option<&mut PhaseTapChanger> {
    match data {
        EquipmentData::TwoWindingsTransformer(t) => t.phase_tap_changer.as_mut(),
        EquipmentData::ThreeWindingsTransformer(t) => t.legs.get_mut(leg)?.phase_tap_changer.as_mut(),
        _ => None,
    }
}

fn apply_tap_changer(ctx: &mut Context, idx: EquipmentIdx, equipment_id: &str, tc: &TapChangerControl) {
    let Some(rc) = cached(ctx, &tc.control_id) else {
        return;
    };
    let what = format!("TapChanger {} of {}", tc.tap_changer, equipment_id);
    match tc.kind {
        TapChangerKind::Ratio => apply_ratio_tap_changer(ctx, idx, &what, tc, &rc),
        TapChangerKind::Phase => apply_phase_tap_changer(ctx, idx, &what, tc, &rc),
    }
}

fn apply_ratio_tap_changer(
    ctx: &mut Context,
    idx: EquipmentIdx,
    what: &str,
    tc: &TapChangerControl,
    rc: &RegulatingControl,
) {
    match rc.mode {
        ControlMode::Voltage => {
            let Some(own) = own_terminal(ctx, idx) else {
                return;
            };
            let mut regulating = rc.enabled && tc.control_enabled;
            if regulating && !tc.ltc_flag {
                ctx.ignored(
                    what,
                    "Tap changer without load tap changing capability cannot regulate",
                );
                regulating = false;
            }
            let resolution = resolve_voltage(ctx, what, rc, own, regulating);
            let deadband = valid_deadband(ctx, what, rc);
            if let Some(rtc) = data_mut(ctx, idx).and_then(|d| ratio_tap_changer(d, tc.leg)) {
                rtc.regulating_terminal = Some(resolution.terminal);
                rtc.target_v = resolution.target.map(Kilovolts);
                rtc.target_deadband = Some(Kilovolts(deadband));
                rtc.regulating = regulating && resolution.target.is_some();
            }
            mark(ctx, &rc.id, resolution.correct);
        }
        ControlMode::Fixed => {
            if let Some(rtc) = data_mut(ctx, idx).and_then(|d| ratio_tap_changer(d, tc.leg)) {
                rtc.regulating = false;
            }
            mark(ctx, &rc.id, true);
        }
        _ => unsupported(ctx, what, rc),
    }
}

fn apply_phase_tap_changer(
    ctx: &mut Context,
    idx: EquipmentIdx,
    what: &str,
    tc: &TapChangerControl,
    rc: &RegulatingControl,
) {
    let regulating = rc.enabled && tc.control_enabled;
    let mode = match rc.mode {
        ControlMode::ActivePower => PhaseRegulationMode::ActivePowerControl,
        ControlMode::CurrentFlow => PhaseRegulationMode::CurrentLimiter,
        ControlMode::Fixed => {
            if let Some(ptc) = data_mut(ctx, idx).and_then(|d| phase_tap_changer(d, tc.leg)) {
                ptc.regulation_mode = PhaseRegulationMode::FixedTap;
                ptc.regulating = false;
            }
            mark(ctx, &rc.id, true);
            return;
        }
        _ => {
            unsupported(ctx, what, rc);
            return;
        }
    };

    let mapped = {
        let mapper = RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals);
        rc.terminal
            .as_deref()
            .and_then(|t| mapper.map_for_flow_control(t))
    };
    let Some(ts) = mapped else {
        ctx.ignored(
            what,
            format!(
                "{} control {}: regulating terminal not mapped or mapped only to a switch",
                rc.mode, rc.id
            ),
        );
        mark(ctx, &rc.id, false);
        return;
    };
    let value = match mode {
        PhaseRegulationMode::ActivePowerControl => rc.target_value * f64::from(ts.sign),
        _ => rc.target_value.abs(),
    };
    let deadband = valid_deadband(ctx, what, rc);
    if let Some(ptc) = data_mut(ctx, idx).and_then(|d| phase_tap_changer(d, tc.leg)) {
        ptc.regulating_terminal = Some(ts.terminal);
        ptc.regulation_mode = mode;
        ptc.regulation_value = value.is_finite().then_some(value);
        ptc.target_deadband = Some(deadband);
        ptc.regulating = regulating && value.is_finite();
    }
    mark(ctx, &rc.id, true);
}

/// At most one tap changer of a transformer regulates.
///
/// Two windings: the phase tap changer wins over the ratio one. Three windings:
/// the first regulating phase tap changer by leg wins, else the first ratio one.
fn resolve_tap_changer_conflicts(ctx: &mut Context, idx: EquipmentIdx, equipment_id: &str) {
    let mut forced_off: Vec<String> = Vec::new();
    match data_mut(ctx, idx) {
        Some(EquipmentData::TwoWindingsTransformer(t)) => {
            if let (Some(rtc), Some(ptc)) = (&mut t.ratio_tap_changer, &t.phase_tap_changer) {
                if rtc.regulating && ptc.regulating {
                    rtc.regulating = false;
                    forced_off.push(rtc.id.clone());
                }
            }
        }
        Some(EquipmentData::ThreeWindingsTransformer(t)) => {
            let mut kept = false;
            for leg in t.legs.iter_mut() {
                if let Some(ptc) = leg.phase_tap_changer.as_mut().filter(|p| p.regulating) {
                    if kept {
                        ptc.regulating = false;
                        forced_off.push(ptc.id.clone());
                    }
                    kept = true;
                }
            }
            for leg in t.legs.iter_mut() {
                if let Some(rtc) = leg.ratio_tap_changer.as_mut().filter(|r| r.regulating) {
                    if kept {
                        rtc.regulating = false;
                        forced_off.push(rtc.id.clone());
                    }
                    kept = true;
                }
            }
        }
        _ => {}
    }
    for tap_changer in forced_off {
        ctx.fixed_value(
            format!("TapChanger {} of {}", tap_changer, equipment_id),
            "Another tap changer of the transformer is already regulating, regulation disabled",
            true,
            false,
        );
    }
}
