//! Switches become edges of their voltage level's topology view.

use gat_core::SwitchKind;

use super::{branch_terminals, deferral_node};
use crate::boundary::BoundaryEquipment;
use crate::context::Context;
use crate::error::Result;
use crate::names;
use crate::records::PropertyBag;

pub fn switch_kind(kind: Option<&str>) -> SwitchKind {
    match kind {
        Some("Disconnector") | Some("GroundDisconnector") | Some("Jumper") => {
            SwitchKind::Disconnector
        }
        Some("LoadBreakSwitch") => SwitchKind::LoadBreakSwitch,
        _ => SwitchKind::Breaker,
    }
}

pub fn convert_switches(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().switches {
        if let Some(node) = deferral_node(ctx, &branch_terminals(bag)) {
            ctx.boundary.defer(&node, BoundaryEquipment::Switch(bag));
            continue;
        }
        convert_switch(ctx, bag)?;
    }
    Ok(())
}

pub fn convert_switch(ctx: &mut Context, bag: &PropertyBag) -> Result<()> {
    let Some(id) = bag.id("Switch") else {
        ctx.invalid("Switch", "Record without id");
        return Ok(());
    };
    let what = format!("Switch {}", id);
    let Some(ends) = ctx.end_points(&branch_terminals(bag))? else {
        ctx.missing(format!("Ends of {}", what));
        return Ok(());
    };
    let [end1, end2] = ends.as_slice() else {
        return Ok(());
    };
    if end1.voltage_level != end2.voltage_level {
        ctx.invalid(what, "Ends in different voltage levels");
        return Ok(());
    }

    let mut open = bag.as_bool("open", false);
    // bus-breaker terminals have no fictitious switch to carry a disconnection
    if !ctx.node_breaker && !(end1.connected && end2.connected) && !open {
        ctx.fixed(&what, "Disconnected terminal, switch opened");
        open = true;
    }
    ctx.new_switch(
        &id,
        bag.get(names::NAME),
        switch_kind(bag.local("type")),
        open,
        bag.as_bool("retained", false),
        end1,
        end2,
    )?;
    Ok(())
}
