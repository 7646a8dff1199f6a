//! Operational limits: current limits on terminals, voltage limits on voltage levels.

use std::collections::BTreeSet;

use gat_core::{Amperes, CurrentLimits, Identifiable, Kilovolts, TemporaryLimit, TerminalIdx, VoltageLevelIdx};
use tracing::debug;

use crate::context::Context;
use crate::names;
use crate::records::PropertyBag;

/// Convert every operational limit record, then complete current limits that
/// only have temporary values.
pub fn convert_operational_limits(ctx: &mut Context) {
    let model = ctx.model;
    let mut touched = BTreeSet::new();
    for bag in &model.records().operational_limits {
        let Some(id) = bag.id("OperationalLimit") else {
            continue;
        };
        let what = format!("OperationalLimit {}", id);
        let Some(value) = bag.as_f64_opt("value").filter(|v| *v > 0.0) else {
            ctx.invalid(what, "Limit value missing or not positive");
            continue;
        };
        match bag.local("limitKind") {
            Some("current") => {
                for t in current_limit(ctx, &what, &id, bag, value) {
                    touched.insert(t);
                }
            }
            Some("voltage") => voltage_limit(ctx, &what, bag, value),
            other => ctx.ignored(what, format!("Unsupported limit kind {}", other.unwrap_or("none"))),
        }
    }
    complete_permanent_limits(ctx, touched);
}

/// Terminals a limit record applies to: its own terminal, or every terminal of
/// its equipment.
fn limited_terminals(ctx: &Context, bag: &PropertyBag) -> Vec<TerminalIdx> {
    if let Some(t) = bag.id(names::TERMINAL) {
        return ctx.terminals.find(&t).into_iter().collect();
    }
    bag.id("Equipment")
        .and_then(|e| ctx.network.find_equipment(&e))
        .and_then(|idx| ctx.network.equipment(idx))
        .map(|eq| eq.terminals.clone())
        .unwrap_or_default()
}

fn current_limit(
    ctx: &mut Context,
    what: &str,
    id: &str,
    bag: &PropertyBag,
    value: f64,
) -> Vec<TerminalIdx> {
    let terminals = limited_terminals(ctx, bag);
    if terminals.is_empty() {
        ctx.missing(format!("Terminal or equipment of {}", what));
        return terminals;
    }
    let limit_type = bag.local("limitType").unwrap_or_default().to_string();
    if limit_type != "patl" && limit_type != "tatl" {
        ctx.ignored(what, format!("Unsupported current limit type {}", limit_type));
        return Vec::new();
    }

    let mut duplicates = Vec::new();
    for &t in &terminals {
        let Some(terminal) = ctx.network.terminal_mut(t) else {
            continue;
        };
        let limits = terminal.current_limits.get_or_insert_with(CurrentLimits::default);
        if limit_type == "patl" {
            if let Some(existing) = limits.permanent {
                duplicates.push(existing.value());
            }
            let lowest = limits.permanent.map_or(value, |p| p.value().min(value));
            limits.permanent = Some(Amperes(lowest));
        } else {
            limits.temporary.push(TemporaryLimit {
                name: bag.get(names::NAME).unwrap_or(id).to_string(),
                acceptable_duration: bag
                    .as_f64_opt("acceptableDuration")
                    .filter(|d| *d >= 0.0)
                    .map(|d| d as u32),
                value: Amperes(value),
            });
            limits
                .temporary
                .sort_by_key(|l| std::cmp::Reverse(l.acceptable_duration.unwrap_or(u32::MAX)));
        }
    }
    for existing in duplicates {
        ctx.fixed(
            what,
            format!("Several permanent limits ({} and {}), the lowest is kept", existing, value),
        );
    }
    terminals
}

fn limited_voltage_level(ctx: &Context, bag: &PropertyBag) -> Option<VoltageLevelIdx> {
    if let Some(t) = bag.id(names::TERMINAL) {
        let t = ctx.terminals.find(&t)?;
        return ctx.network.terminal(t).map(|t| t.voltage_level);
    }
    let equipment = bag.id("Equipment")?;
    match ctx.network.lookup(&equipment)? {
        Identifiable::VoltageLevel(vl) => Some(vl),
        Identifiable::Bus(vl, _) => Some(vl),
        Identifiable::Equipment(idx) => {
            let t = ctx.network.equipment(idx)?.terminal(1)?;
            ctx.network.terminal(t).map(|t| t.voltage_level)
        }
        _ => None,
    }
}

fn voltage_limit(ctx: &mut Context, what: &str, bag: &PropertyBag, value: f64) {
    let Some(vl) = limited_voltage_level(ctx, bag) else {
        ctx.missing(format!("Voltage level of {}", what));
        return;
    };
    let high = match bag.local("limitType").unwrap_or_default() {
        "highVoltage" => true,
        "lowVoltage" => false,
        other => {
            ctx.ignored(what, format!("Unsupported voltage limit type {}", other));
            return;
        }
    };
    let Some(level) = ctx.network.voltage_level_mut(vl) else {
        return;
    };
    if high {
        level.high_voltage_limit = Some(Kilovolts(value));
    } else {
        level.low_voltage_limit = Some(Kilovolts(value));
    }
    debug!(voltage_level = %level.id, high, value, "voltage limit");
}

/// A terminal with temporary limits but no permanent one gets a permanent limit
/// derived from its smallest temporary limit.
fn complete_permanent_limits(ctx: &mut Context, terminals: BTreeSet<TerminalIdx>) {
    let percentage = ctx.config.missing_permanent_limit_percentage;
    for t in terminals {
        let Some(terminal) = ctx.network.terminal_mut(t) else {
            continue;
        };
        let equipment = terminal.equipment;
        let side = terminal.side;
        let Some(limits) = terminal.current_limits.as_mut().filter(|l| l.permanent.is_none()) else {
            continue;
        };
        let Some(smallest) = limits
            .temporary
            .iter()
            .map(|l| l.value.value())
            .min_by(f64::total_cmp)
        else {
            continue;
        };
        let permanent = smallest * percentage / 100.0;
        limits.permanent = Some(Amperes(permanent));

        let owner = ctx
            .network
            .equipment(equipment)
            .map(|e| e.id.clone())
            .unwrap_or_default();
        ctx.fixed_value(
            format!("Current limits of {} side {}", owner, side),
            format!("No permanent limit, {}% of the smallest temporary limit", percentage),
            "none",
            permanent,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::fixtures::ModelBuilder;
    use crate::model::CgmesModel;
    use gat_core::IssueKind;

    fn line_model() -> ModelBuilder {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL1", "S", 400.0).voltage_level("VL2", "S", 400.0);
        b.node("CN1", "VL1").node("CN2", "VL2");
        b.line("L", "CN1", "CN2");
        b
    }

    fn converted<'a>(model: &'a CgmesModel, config: &'a ConversionConfig) -> Context<'a> {
        let mut ctx = Context::new(model, config).unwrap();
        crate::conversion::convert_elements(&mut ctx).unwrap();
        convert_operational_limits(&mut ctx);
        ctx
    }

    fn limits(ctx: &Context, terminal: &str) -> CurrentLimits {
        let t = ctx.terminals.find(terminal).unwrap();
        ctx.network.terminal(t).unwrap().current_limits.clone().unwrap()
    }

    #[test]
    fn test_permanent_and_temporary_limits() {
        let mut b = line_model();
        b.current_limit("PATL", "L_T1", "patl", 1000.0, None);
        b.current_limit("TATL_60", "L_T1", "tatl", 1500.0, Some(60));
        b.current_limit("TATL_600", "L_T1", "tatl", 1200.0, Some(600));
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let l = limits(&ctx, "L_T1");
        assert_eq!(l.permanent, Some(Amperes(1000.0)));
        let durations: Vec<_> = l.temporary.iter().map(|t| t.acceptable_duration).collect();
        assert_eq!(durations, vec![Some(600), Some(60)]);
        assert!(ctx.terminals.find("L_T2").is_some());
        let t2 = ctx.terminals.find("L_T2").unwrap();
        assert!(ctx.network.terminal(t2).unwrap().current_limits.is_none());
    }

    #[test]
    fn test_duplicate_permanent_keeps_lowest() {
        let mut b = line_model();
        b.current_limit("PATL_A", "L_T1", "patl", 900.0, None);
        b.current_limit("PATL_B", "L_T1", "patl", 800.0, None);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        assert_eq!(limits(&ctx, "L_T1").permanent, Some(Amperes(800.0)));
        assert_eq!(ctx.diagnostics.count(IssueKind::Fixed), 1);
    }

    #[test]
    fn test_missing_permanent_from_temporary() {
        let mut b = line_model();
        b.current_limit("TATL_A", "L_T2", "tatl", 1500.0, Some(60));
        b.current_limit("TATL_B", "L_T2", "tatl", 1200.0, Some(600));
        let model = b.build();
        let config = ConversionConfig {
            missing_permanent_limit_percentage: 80.0,
            ..ConversionConfig::default()
        };
        let ctx = converted(&model, &config);

        assert_eq!(limits(&ctx, "L_T2").permanent, Some(Amperes(960.0)));
        assert_eq!(ctx.diagnostics.about("Current limits of L side 2").count(), 1);
    }

    #[test]
    fn test_equipment_limit_applies_to_all_terminals() {
        let mut b = line_model();
        b.equipment_current_limit("PATL", "L", "patl", 700.0);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        assert_eq!(limits(&ctx, "L_T1").permanent, Some(Amperes(700.0)));
        assert_eq!(limits(&ctx, "L_T2").permanent, Some(Amperes(700.0)));
    }

    #[test]
    fn test_voltage_limits_on_voltage_level() {
        let mut b = line_model();
        b.busbar("BBS", "CN1");
        b.voltage_limit("HV", "BBS", "highVoltage", 420.0);
        b.voltage_limit("LV", "BBS", "lowVoltage", 380.0);
        b.voltage_limit("XV", "BBS", "nominal", 400.0);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let vl = ctx.network.find_voltage_level("VL1").unwrap();
        let level = ctx.network.voltage_level(vl).unwrap();
        assert_eq!(level.high_voltage_limit, Some(Kilovolts(420.0)));
        assert_eq!(level.low_voltage_limit, Some(Kilovolts(380.0)));
        assert_eq!(ctx.diagnostics.count(IssueKind::Ignored), 1);
    }
}
