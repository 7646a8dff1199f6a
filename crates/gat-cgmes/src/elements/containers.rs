//! Substations, voltage levels, nodes and busbar sections.
//!
//! Merged substations and voltage levels are created once, under their
//! representative id; the ids merged into them are kept as aliases.

use gat_core::{EquipmentData, Kilovolts, VoltageLevelParams};
use tracing::{debug, info};

use crate::context::Context;
use crate::error::Result;
use crate::model::CgmesModel;
use crate::names;
use crate::records::PropertyBag;

pub fn convert_substations(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().substations {
        let Some(id) = bag.id(names::SUBSTATION) else {
            ctx.invalid("Substation", "Record without id");
            continue;
        };
        if ctx.substation_mapping.is_substation_mapped(&id) {
            debug!(substation = %id, into = ctx.substation_mapping.substation(&id), "merged");
            continue;
        }
        let idx = ctx
            .network
            .new_substation(&id, bag.get(names::NAME), bag.get(names::REGION))?;
        let aliases: Vec<String> = ctx
            .substation_mapping
            .merged_substations(&id)
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(substation) = ctx.network.substation_mut(idx) {
            substation.aliases = aliases;
        }
    }
    Ok(())
}

pub fn convert_voltage_levels(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let topology_kind = ctx.topology_kind();
    for bag in &model.records().voltage_levels {
        let Some(id) = bag.id(names::VOLTAGE_LEVEL) else {
            ctx.invalid("VoltageLevel", "Record without id");
            continue;
        };
        if ctx.substation_mapping.is_voltage_level_mapped(&id) {
            debug!(voltage_level = %id, into = ctx.substation_mapping.voltage_level(&id), "merged");
            continue;
        }
        let what = format!("VoltageLevel {}", id);

        let substation = bag.id(names::SUBSTATION).and_then(|s| {
            ctx.network
                .find_substation(ctx.substation_mapping.substation(&s))
        });
        if substation.is_none() {
            ctx.missing(format!("Substation of voltage level {}", id));
        }
        let nominal = bag
            .id(names::BASE_VOLTAGE)
            .and_then(|bv| model.base_voltage(&bv))
            .or_else(|| bag.as_f64_opt(names::NOMINAL_VOLTAGE))
            .filter(|v| *v > 0.0);
        let Some(nominal) = nominal else {
            ctx.invalid(what, "No valid nominal voltage, voltage level not converted");
            continue;
        };

        let idx = ctx.network.new_voltage_level(VoltageLevelParams {
            id: id.clone(),
            name: bag.get(names::NAME).map(str::to_string),
            substation,
            nominal_v: Kilovolts(nominal),
            low_voltage_limit: bag.as_f64_opt("lowVoltageLimit").map(Kilovolts),
            high_voltage_limit: bag.as_f64_opt("highVoltageLimit").map(Kilovolts),
            topology_kind,
        })?;
        let aliases: Vec<String> = ctx
            .substation_mapping
            .merged_voltage_levels(&id)
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(vl) = ctx.network.voltage_level_mut(idx) {
            vl.aliases = aliases;
        }
    }
    Ok(())
}

/// Node records of the model's topology detail.
fn node_records(model: &CgmesModel, node_breaker: bool) -> (&'static str, &[PropertyBag]) {
    let records = model.records();
    if node_breaker {
        (names::CONNECTIVITY_NODE, &records.connectivity_nodes)
    } else {
        (names::TOPOLOGICAL_NODE, &records.topological_nodes)
    }
}

/// One voltage level, without substation, for each node outside any voltage level.
///
/// Boundary nodes only get one when boundary conversion is enabled.
pub fn convert_fictitious_voltage_levels(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let (key, bags) = node_records(model, ctx.node_breaker);
    let topology_kind = ctx.topology_kind();
    let mut created = 0;
    for bag in bags {
        let Some(node) = bag.id(key) else { continue };
        let inside_voltage_level = model
            .node_container(&node)
            .is_some_and(|c| c.voltage_level.is_some());
        if inside_voltage_level || (model.is_boundary_node(&node) && !ctx.config.convert_boundary) {
            continue;
        }

        let id = Context::fictitious_voltage_level_id(&node);
        let nominal = match bag
            .id(names::BASE_VOLTAGE)
            .and_then(|bv| model.base_voltage(&bv))
        {
            Some(v) => v,
            None => {
                ctx.fixed_value(
                    format!("VoltageLevel {}", id),
                    "No base voltage for node outside any voltage level",
                    "none",
                    1.0,
                );
                1.0
            }
        };
        ctx.network.new_voltage_level(VoltageLevelParams {
            id,
            name: None,
            substation: None,
            nominal_v: Kilovolts(nominal),
            low_voltage_limit: None,
            high_voltage_limit: None,
            topology_kind,
        })?;
        created += 1;
    }
    if created > 0 {
        info!(created, "Fictitious voltage levels for nodes outside voltage levels");
    }
    Ok(())
}

/// Node-breaker: hand out a vertex per connectivity node. Bus-breaker: one bus
/// per topological node.
pub fn convert_nodes(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let (key, bags) = node_records(model, ctx.node_breaker);
    for bag in bags {
        let Some(node) = bag.id(key) else {
            ctx.invalid(key, "Record without id");
            continue;
        };
        let Some(vl) = ctx.voltage_level_of_node(&node) else {
            if !model.is_boundary_node(&node) || ctx.config.convert_boundary {
                ctx.missing(format!("Voltage level of node {}", node));
            }
            continue;
        };
        if ctx.node_breaker {
            ctx.nodes.allocate(&mut ctx.network, vl, &node)?;
        } else {
            ctx.network.new_bus(vl, &node)?;
        }
    }
    Ok(())
}

/// Busbar sections only exist in node-breaker models.
pub fn convert_busbar_sections(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    if !ctx.node_breaker {
        if !model.records().busbar_sections.is_empty() {
            debug!(
                count = model.records().busbar_sections.len(),
                "busbar sections skipped in bus-breaker model"
            );
        }
        return Ok(());
    }
    for bag in &model.records().busbar_sections {
        let Some(id) = bag.id("BusbarSection") else {
            continue;
        };
        let what = format!("BusbarSection {}", id);
        let Some(end) = super::injection_end(ctx, &what, bag)? else {
            continue;
        };
        ctx.new_equipment(&id, bag.get(names::NAME), EquipmentData::BusbarSection, &[end])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::fixtures::ModelBuilder;
    use gat_core::{IssueKind, TopologyKind};

    fn containers(ctx: &mut Context) {
        convert_substations(ctx).unwrap();
        convert_voltage_levels(ctx).unwrap();
        convert_fictitious_voltage_levels(ctx).unwrap();
        convert_nodes(ctx).unwrap();
        convert_busbar_sections(ctx).unwrap();
    }

    #[test]
    fn test_merged_substations_created_once() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S1").substation("S2");
        b.voltage_level("VL1", "S1", 400.0).voltage_level("VL2", "S2", 220.0);
        b.node("CN1", "VL1").node("CN2", "VL2");
        b.transformer("PT", &["CN1", "CN2"]);
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);

        assert!(ctx.network.find_substation("S2").is_none());
        let s1 = ctx.network.find_substation("S1").unwrap();
        let substation = ctx.network.substation(s1).unwrap();
        assert_eq!(substation.aliases, vec!["S2".to_string()]);
        assert_eq!(substation.voltage_levels.len(), 2);
    }

    #[test]
    fn test_fictitious_voltage_level_for_detached_node() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 400.0);
        b.node("CN", "VL");
        b.detached_node("CN_X", 110.0);
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);

        let vl = ctx.network.find_voltage_level("CN_X_VL").unwrap();
        let level = ctx.network.voltage_level(vl).unwrap();
        assert_eq!(level.nominal_v, Kilovolts(110.0));
        assert!(level.substation.is_none());
        assert_eq!(ctx.voltage_level_of_node("CN_X"), Some(vl));
    }

    #[test]
    fn test_boundary_node_gets_level_only_when_converted() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 400.0);
        b.boundary_node("XN", "XKEY");
        let model = b.build();

        let config = ConversionConfig::default();
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);
        assert!(ctx.network.find_voltage_level("XN_VL").is_none());
        assert_eq!(ctx.diagnostics.count(IssueKind::Missing), 0);

        let config = ConversionConfig {
            convert_boundary: true,
            ..ConversionConfig::default()
        };
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);
        assert!(ctx.network.find_voltage_level("XN_VL").is_some());
    }

    #[test]
    fn test_bus_breaker_nodes_become_buses() {
        let mut b = ModelBuilder::bus_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 220.0);
        b.node("TN1", "VL").node("TN2", "VL");
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);

        let (vl, _) = ctx.network.find_bus("TN2").unwrap();
        let level = ctx.network.voltage_level(vl).unwrap();
        assert_eq!(level.topology_kind, TopologyKind::BusBreaker);
        assert_eq!(level.view.bus_ids().count(), 2);
    }

    #[test]
    fn test_voltage_level_without_base_voltage_is_invalid() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 400.0);
        b.attribute("VoltageLevel", "VL", "BaseVoltage", "UNKNOWN");
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = Context::new(&model, &config).unwrap();
        containers(&mut ctx);

        assert!(ctx.network.find_voltage_level("VL").is_none());
        assert_eq!(ctx.diagnostics.count(IssueKind::Invalid), 1);
    }
}
