//! Control areas and the tie flows defining their interchange.

use gat_core::{ControlArea, Identifiable, Megawatts};
use tracing::info;

use crate::context::Context;
use crate::error::Result;
use crate::names;
use crate::topology::RegulatingTerminalMapper;

pub fn convert_control_areas(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let records = model.records();
    if !ctx.config.import_control_areas {
        if !records.control_areas.is_empty() {
            info!(count = records.control_areas.len(), "Control areas not imported");
        }
        return Ok(());
    }

    for bag in &records.control_areas {
        let Some(id) = bag.id("ControlArea") else {
            continue;
        };
        ctx.network.new_control_area(ControlArea {
            id: id.clone(),
            name: bag.get(names::NAME).map(str::to_string),
            area_type: bag.local("type").map(str::to_string),
            net_interchange: Megawatts(bag.as_f64("netInterchange", 0.0)),
            p_tolerance: bag.as_f64_opt("pTolerance").map(Megawatts),
            tie_flows: Vec::new(),
        })?;
    }

    for bag in &records.tie_flows {
        let Some(area_id) = bag.id("ControlArea") else {
            continue;
        };
        let Some(Identifiable::ControlArea(area)) = ctx.network.lookup(&area_id) else {
            ctx.missing(format!("ControlArea {}", area_id));
            continue;
        };
        let Some(terminal_id) = bag.id(names::TERMINAL) else {
            ctx.missing(format!("Terminal of tie flow of ControlArea {}", area_id));
            continue;
        };
        let mapped = RegulatingTerminalMapper::new(ctx.model, &ctx.network, &ctx.terminals)
            .map_for_tie_flow(&terminal_id);
        let Some(terminal) = mapped else {
            ctx.ignored(
                format!("Tie flow {} of ControlArea {}", terminal_id, area_id),
                "Terminal not mapped to any converted equipment",
            );
            continue;
        };
        if let Some(area) = ctx.network.control_area_mut(area) {
            area.tie_flows.push(terminal);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::fixtures::ModelBuilder;
    use crate::model::CgmesModel;
    use gat_core::IssueKind;

    fn model() -> CgmesModel {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 400.0);
        b.node("CN", "VL");
        b.boundary_node("XN", "XKEY");
        b.line("L", "CN", "XN");
        b.control_area("CA", -250.0);
        // measured at the boundary side, which only exists through the dangling line
        b.tie_flow("CA", "L_T2");
        b.tie_flow("CA", "UNKNOWN_T1");
        b.build()
    }

    fn converted<'a>(model: &'a CgmesModel, config: &'a ConversionConfig) -> Context<'a> {
        let mut ctx = Context::new(model, config).unwrap();
        crate::conversion::convert_elements(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_tie_flows_mapped_to_dangling_line() {
        let model = model();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let area = &ctx.network.control_areas()[0];
        assert_eq!(area.net_interchange, Megawatts(-250.0));
        assert_eq!(area.area_type.as_deref(), Some("Interchange"));
        assert_eq!(area.tie_flows, vec![ctx.terminals.find("L_T1").unwrap()]);
        assert_eq!(ctx.diagnostics.count(IssueKind::Ignored), 1);
    }

    #[test]
    fn test_not_imported_when_disabled() {
        let model = model();
        let config = ConversionConfig {
            import_control_areas: false,
            ..ConversionConfig::default()
        };
        let ctx = converted(&model, &config);
        assert!(ctx.network.control_areas().is_empty());
    }
}
