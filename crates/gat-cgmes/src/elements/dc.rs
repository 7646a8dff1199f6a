//! AC/DC converters and the DC line segments joining them.
//!
//! Each DC line segment becomes an HVDC line between its two converter
//! stations. A converter that ends up on no HVDC line is removed again.

use gat_core::{
    ConverterKind, EquipmentData, EquipmentIdx, EquipmentKind, HvdcConverterStation, HvdcLine,
    Kilovolts, Megawatts, Ohms,
};
use tracing::{debug, info};

use super::injection_end;
use crate::context::Context;
use crate::error::Result;
use crate::names;
use crate::records::PropertyBag;
use crate::regulating::{ConverterDefault, PendingControl};

/// Regulation a converter record asks for at its point of common coupling.
pub fn converter_default(bag: &PropertyBag) -> ConverterDefault {
    match bag.local("qPccControl") {
        Some("voltagePcc") => ConverterDefault::Voltage(bag.as_f64("targetUpcc", 0.0)),
        Some("reactivePcc") => ConverterDefault::ReactivePower(bag.as_f64("targetQpcc", 0.0)),
        _ => ConverterDefault::None,
    }
}

pub fn converter_kind(bag: &PropertyBag) -> ConverterKind {
    match bag.local("converterType") {
        Some("lcc") | Some("CsConverter") => ConverterKind::Lcc,
        _ => ConverterKind::Vsc,
    }
}

pub fn convert_converters(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().acdc_converters {
        let Some(id) = bag.id("ACDCConverter") else {
            continue;
        };
        let what = format!("ACDCConverter {}", id);
        let Some(end) = injection_end(ctx, &what, bag)? else {
            continue;
        };

        let kind = converter_kind(bag);
        let default = converter_default(bag);
        let mut station = HvdcConverterStation {
            kind,
            loss_factor: bag.as_f64("lossFactor", 0.0),
            voltage_regulator_on: false,
            voltage_setpoint: None,
            reactive_power_setpoint: None,
            regulating_terminal: None,
            hvdc_line: None,
        };
        let control = bag.id(names::REGULATING_CONTROL);
        match (kind, &control) {
            (ConverterKind::Vsc, None) => default.apply(&mut station),
            (ConverterKind::Lcc, Some(rc)) => ctx.ignored(
                &what,
                format!("Regulating control {} on a line commutated converter", rc),
            ),
            _ => {}
        }

        ctx.new_equipment(
            &id,
            bag.get(names::NAME),
            EquipmentData::HvdcConverterStation(station),
            &[end],
        )?;
        if let (ConverterKind::Vsc, Some(control_id)) = (kind, control) {
            ctx.regulating_controls
                .register(&id, PendingControl::Converter { control_id, default })?;
        }
    }
    Ok(())
}

/// Converter station at `id` not yet on any HVDC line.
fn free_station(ctx: &Context, id: &str) -> Option<EquipmentIdx> {
    let idx = ctx.network.find_equipment(id)?;
    match &ctx.network.equipment(idx)?.data {
        EquipmentData::HvdcConverterStation(s) if s.hvdc_line.is_none() => Some(idx),
        _ => None,
    }
}

pub fn convert_dc_lines(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().dc_line_segments {
        let Some(id) = bag.id("DCLineSegment") else {
            continue;
        };
        let what = format!("DCLineSegment {}", id);
        let converters = (bag.id("ACDCConverter1"), bag.id("ACDCConverter2"));
        let (Some(c1), Some(c2)) = converters else {
            ctx.missing(format!("Converters of {}", what));
            continue;
        };
        let (Some(converter1), Some(converter2)) = (free_station(ctx, &c1), free_station(ctx, &c2))
        else {
            ctx.missing(format!("Free converter stations {} and {} of {}", c1, c2, what));
            continue;
        };
        ctx.network.new_hvdc_line(HvdcLine {
            id: id.clone(),
            name: bag.get(names::NAME).map(str::to_string),
            converter1,
            converter2,
            r: Ohms(bag.as_f64("r", 0.0)),
            nominal_v: Kilovolts(bag.as_f64("ratedUdc", 0.0)),
            max_p: Megawatts(bag.as_f64("maxP", 0.0)),
            active_power_setpoint: Megawatts(bag.as_f64("activePowerSetpoint", 0.0)),
        })?;
        debug!(hvdc_line = %id, converter1 = %c1, converter2 = %c2, "HVDC line");
    }
    remove_unpaired_converters(ctx)
}

/// Converter stations belong to exactly one HVDC line.
fn remove_unpaired_converters(ctx: &mut Context) -> Result<()> {
    let unpaired: Vec<(EquipmentIdx, String)> = ctx
        .network
        .equipment_of_kind(EquipmentKind::HvdcConverterStation)
        .filter(|(_, eq)| {
            matches!(&eq.data, EquipmentData::HvdcConverterStation(s) if s.hvdc_line.is_none())
        })
        .map(|(idx, eq)| (idx, eq.id.clone()))
        .collect();
    if unpaired.is_empty() {
        return Ok(());
    }
    info!(count = unpaired.len(), "Removing converter stations without HVDC line");
    for (idx, id) in unpaired {
        ctx.network.remove_equipment(idx)?;
        ctx.regulating_controls.unregister(&id);
        ctx.ignored(format!("ACDCConverter {}", id), "Not part of any DC line, removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::elements::containers;
    use crate::fixtures::ModelBuilder;
    use crate::model::CgmesModel;
    use gat_core::{IssueKind, Megavars};

    fn prepared<'a>(model: &'a CgmesModel, config: &'a ConversionConfig) -> Context<'a> {
        let mut ctx = Context::new(model, config).unwrap();
        containers::convert_substations(&mut ctx).unwrap();
        containers::convert_voltage_levels(&mut ctx).unwrap();
        containers::convert_nodes(&mut ctx).unwrap();
        ctx
    }

    fn station<'c>(ctx: &'c Context, id: &str) -> &'c HvdcConverterStation {
        let idx = ctx.network.find_equipment(id).unwrap();
        match &ctx.network.equipment(idx).unwrap().data {
            EquipmentData::HvdcConverterStation(s) => s,
            _ => panic!("{} is not a converter station", id),
        }
    }

    fn two_ends() -> ModelBuilder {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S1").substation("S2");
        b.voltage_level("VL1", "S1", 400.0).voltage_level("VL2", "S2", 400.0);
        b.node("CN1", "VL1").node("CN2", "VL2");
        b
    }

    #[test]
    fn test_dc_line_joins_converters() {
        let mut b = two_ends();
        b.converter("C1", "CN1", "vsc", None).converter("C2", "CN2", "vsc", None);
        b.dc_line("DC", "C1", "C2");
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = prepared(&model, &config);
        convert_converters(&mut ctx).unwrap();
        convert_dc_lines(&mut ctx).unwrap();

        let line = &ctx.network.hvdc_lines()[0];
        assert_eq!(line.nominal_v, Kilovolts(320.0));
        assert_eq!(line.converter1, ctx.network.find_equipment("C1").unwrap());
        let c2 = station(&ctx, "C2");
        assert_eq!(c2.hvdc_line.as_deref(), Some("DC"));
        // no control: the record's own setpoint applies
        assert!(c2.voltage_regulator_on);
        assert_eq!(c2.voltage_setpoint, Some(Kilovolts(398.0)));
    }

    #[test]
    fn test_reactive_power_default() {
        let mut b = two_ends();
        b.converter("C1", "CN1", "vsc", None);
        b.attribute("ACDCConverter", "C1", "qPccControl", "cim:VsQpccControlKind.reactivePcc");
        b.attribute("ACDCConverter", "C1", "targetQpcc", 15.0);
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = prepared(&model, &config);
        convert_converters(&mut ctx).unwrap();

        let c1 = station(&ctx, "C1");
        assert!(!c1.voltage_regulator_on);
        assert_eq!(c1.reactive_power_setpoint, Some(Megavars(15.0)));
    }

    #[test]
    fn test_controls_registered_for_vsc_only() {
        let mut b = two_ends();
        b.converter("C1", "CN1", "vsc", Some("RC1"));
        b.converter("C2", "CN2", "lcc", Some("RC2"));
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = prepared(&model, &config);
        convert_converters(&mut ctx).unwrap();

        assert_eq!(station(&ctx, "C2").kind, ConverterKind::Lcc);
        assert!(matches!(
            ctx.regulating_controls.pending("C1"),
            Some(PendingControl::Converter { control_id, default: ConverterDefault::Voltage(_) }) if control_id == "RC1"
        ));
        assert!(ctx.regulating_controls.pending("C2").is_none());
        assert_eq!(ctx.diagnostics.about("ACDCConverter C2").count(), 1);
    }

    #[test]
    fn test_converter_without_line_removed() {
        let mut b = two_ends();
        b.converter("C1", "CN1", "vsc", Some("RC1"));
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = prepared(&model, &config);
        convert_converters(&mut ctx).unwrap();
        convert_dc_lines(&mut ctx).unwrap();

        assert!(ctx.network.find_equipment("C1").is_none());
        assert!(ctx.regulating_controls.pending("C1").is_none());
        assert_eq!(ctx.diagnostics.count(IssueKind::Ignored), 1);
    }

    #[test]
    fn test_dc_line_with_unknown_converter() {
        let mut b = two_ends();
        b.converter("C1", "CN1", "vsc", None);
        b.dc_line("DC", "C1", "C9");
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = prepared(&model, &config);
        convert_converters(&mut ctx).unwrap();
        convert_dc_lines(&mut ctx).unwrap();

        assert!(ctx.network.hvdc_lines().is_empty());
        assert_eq!(ctx.diagnostics.count(IssueKind::Missing), 1);
        assert!(ctx.network.find_equipment("C1").is_none());
    }
}
