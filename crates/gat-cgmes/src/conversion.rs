//! The conversion pipeline.
//!
//! A [`Conversion`] runs the passes in a fixed order over one [`Context`]:
//!
//! 1. containers: substations, voltage levels, nodes, busbar sections
//! 2. injections: loads, equivalent injections, shunts, SVCs, generators
//! 3. branches: switches, lines, equivalent branches, transformers; anything
//!    touching a boundary node is deferred
//! 4. deferred boundary equipment, as dangling lines and tie lines
//! 5. converters and DC lines
//! 6. control areas
//! 7. regulating controls, once every equipment exists
//! 8. operational limits
//! 9. dangling line post-processing

use gat_core::{Diagnostics, Network};
use tracing::{debug, info};

use crate::config::ConversionConfig;
use crate::context::Context;
use crate::elements::{containers, control_areas, dc, injections, limits, lines, switches, transformers};
use crate::error::{ConversionError, Result};
use crate::model::CgmesModel;
use crate::regulating::apply;

/// Output of one conversion run.
#[derive(Debug)]
pub struct ConversionResult {
    pub network: Network,
    pub diagnostics: Diagnostics,
}

pub struct Conversion<'a> {
    model: &'a CgmesModel,
    config: &'a ConversionConfig,
}

impl<'a> Conversion<'a> {
    pub fn new(model: &'a CgmesModel, config: &'a ConversionConfig) -> Self {
        Self { model, config }
    }

    pub fn convert(&self) -> Result<ConversionResult> {
        if self.model.records().voltage_levels.is_empty() {
            return Err(ConversionError::MissingEquipmentCore(
                self.model.model_id().to_string(),
            ));
        }
        info!(
            model = self.model.model_id(),
            node_breaker = self.model.is_node_breaker(),
            "Converting CGMES model"
        );

        let mut ctx = Context::new(self.model, self.config)?;
        convert_elements(&mut ctx)?;

        apply::apply_all(&mut ctx);

        limits::convert_operational_limits(&mut ctx);
        lines::post_process_dangling_lines(&mut ctx);

        let Context {
            network,
            mut diagnostics,
            ..
        } = ctx;
        network.validate_into(&mut diagnostics);

        let stats = network.stats();
        info!(
            substations = stats.num_substations,
            voltage_levels = stats.num_voltage_levels,
            switches = stats.num_switches,
            tie_lines = stats.num_tie_lines,
            hvdc_lines = stats.num_hvdc_lines,
            "Conversion complete: {}",
            diagnostics.summary()
        );
        Ok(ConversionResult {
            network,
            diagnostics,
        })
    }
}

/// Every pass that creates network objects, up to and excluding the regulating
/// control pass.
pub fn convert_elements(ctx: &mut Context) -> Result<()> {
    debug!("containers");
    containers::convert_substations(ctx)?;
    containers::convert_voltage_levels(ctx)?;
    containers::convert_fictitious_voltage_levels(ctx)?;
    containers::convert_nodes(ctx)?;
    containers::convert_busbar_sections(ctx)?;

    debug!("injections");
    injections::convert_loads(ctx)?;
    injections::convert_equivalent_injections(ctx)?;
    injections::convert_shunt_compensators(ctx)?;
    injections::convert_static_var_compensators(ctx)?;
    injections::convert_generators(ctx)?;

    debug!("branches");
    switches::convert_switches(ctx)?;
    lines::convert_lines(ctx)?;
    lines::convert_equivalent_branches(ctx)?;
    transformers::convert_transformers(ctx)?;

    lines::convert_boundary_equipment(ctx)?;

    debug!("dc");
    dc::convert_converters(ctx)?;
    dc::convert_dc_lines(ctx)?;

    control_areas::convert_control_areas(ctx)?;
    Ok(())
}
