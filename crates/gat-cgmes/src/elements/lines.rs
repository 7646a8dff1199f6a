//! AC line segments, equivalent branches and everything cut at the boundary.
//!
//! Inside the modeled network both branch classes become lines. A branch with an
//! end at a boundary node becomes a dangling line instead; two dangling lines
//! meeting at one boundary node are paired into a tie line when they come from
//! different regions.

use std::collections::BTreeMap;

use gat_core::{
    DanglingLine, EquipmentData, EquipmentIdx, EquipmentKind, Line, Megavars, Megawatts, Ohms,
    Siemens,
};
use tracing::{debug, info};

use super::{branch_terminals, deferral_node};
use crate::boundary::BoundaryEquipment;
use crate::context::Context;
use crate::error::Result;
use crate::names;
use crate::records::PropertyBag;

pub fn convert_lines(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().ac_line_segments {
        if let Some(node) = deferral_node(ctx, &branch_terminals(bag)) {
            ctx.boundary.defer(&node, BoundaryEquipment::Line(bag));
            continue;
        }
        let Some(id) = bag.id("ACLineSegment") else {
            continue;
        };
        let line = Line {
            r: Ohms(bag.as_f64("r", 0.0)),
            x: Ohms(bag.as_f64("x", 0.0)),
            g1: Siemens(bag.as_f64("gch", 0.0) / 2.0),
            b1: Siemens(bag.as_f64("bch", 0.0) / 2.0),
            g2: Siemens(bag.as_f64("gch", 0.0) / 2.0),
            b2: Siemens(bag.as_f64("bch", 0.0) / 2.0),
        };
        convert_branch(ctx, &format!("ACLineSegment {}", id), &id, bag, line)?;
    }
    Ok(())
}

pub fn convert_equivalent_branches(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    for bag in &model.records().equivalent_branches {
        if let Some(node) = deferral_node(ctx, &branch_terminals(bag)) {
            ctx.boundary.defer(&node, BoundaryEquipment::EquivalentBranch(bag));
            continue;
        }
        let Some(id) = bag.id("EquivalentBranch") else {
            continue;
        };
        let line = Line {
            r: Ohms(bag.as_f64("r", 0.0)),
            x: Ohms(bag.as_f64("x", 0.0)),
            ..Line::default()
        };
        convert_branch(ctx, &format!("EquivalentBranch {}", id), &id, bag, line)?;
    }
    Ok(())
}

fn convert_branch(ctx: &mut Context, what: &str, id: &str, bag: &PropertyBag, line: Line) -> Result<()> {
    let Some(ends) = ctx.end_points(&branch_terminals(bag))? else {
        ctx.missing(format!("Ends of {}", what));
        return Ok(());
    };
    ctx.new_equipment(id, bag.get(names::NAME), EquipmentData::Line(line), &ends)?;
    Ok(())
}

// ============================================================================
// Boundary
// ============================================================================

/// Series and shunt parameters of a deferred branch seen as one dangling line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SeriesParameters {
    r: f64,
    x: f64,
    g: f64,
    b: f64,
}

fn series_parameters(equipment: &BoundaryEquipment) -> SeriesParameters {
    match equipment {
        BoundaryEquipment::Line(bag) => SeriesParameters {
            r: bag.as_f64("r", 0.0),
            x: bag.as_f64("x", 0.0),
            g: bag.as_f64("gch", 0.0),
            b: bag.as_f64("bch", 0.0),
        },
        BoundaryEquipment::EquivalentBranch(bag) => SeriesParameters {
            r: bag.as_f64("r", 0.0),
            x: bag.as_f64("x", 0.0),
            ..SeriesParameters::default()
        },
        BoundaryEquipment::Switch(_) => SeriesParameters::default(),
        // ends summed as given, without referring them to a common voltage
        BoundaryEquipment::Transformer(ends) => {
            ends.iter().fold(SeriesParameters::default(), |acc, end| SeriesParameters {
                r: acc.r + end.as_f64("r", 0.0),
                x: acc.x + end.as_f64("x", 0.0),
                g: acc.g + end.as_f64("g", 0.0),
                b: acc.b + end.as_f64("b", 0.0),
            })
        }
    }
}

/// Convert everything parked at boundary nodes, node by node.
pub fn convert_boundary_equipment(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let deferred = ctx.boundary.take_deferred();
    if deferred.is_empty() {
        return Ok(());
    }
    info!(nodes = deferred.len(), "Converting equipment at boundary nodes");

    for (node, equipment) in deferred {
        match equipment.as_slice() {
            [single] => {
                convert_dangling_line(ctx, &node, single)?;
            }
            [a, b] => pair_at_boundary(ctx, &node, a, b)?,
            many => {
                let connected: Vec<usize> = many
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.is_connected(model))
                    .map(|(i, _)| i)
                    .collect();
                let paired = match connected.as_slice() {
                    [i, j] => {
                        pair_at_boundary(ctx, &node, &many[*i], &many[*j])?;
                        vec![*i, *j]
                    }
                    _ => Vec::new(),
                };
                for (i, eq) in many.iter().enumerate() {
                    if paired.contains(&i) {
                        continue;
                    }
                    ctx.fixed(
                        format!("{} {}", eq.label(), eq.id()),
                        format!(
                            "{} elements at boundary node {}, converted as dangling line",
                            many.len(),
                            node
                        ),
                    );
                    convert_dangling_line(ctx, &node, eq)?;
                }
            }
        }
    }
    Ok(())
}

/// Convert a deferred branch into a dangling line at its network-side end.
///
/// The boundary-side terminal is mapped to the dangling line terminal so that
/// regulating controls and tie flows measured there still resolve.
pub fn convert_dangling_line(
    ctx: &mut Context,
    node: &str,
    equipment: &BoundaryEquipment,
) -> Result<Option<EquipmentIdx>> {
    let model = ctx.model;
    let id = equipment.id();
    let what = format!("{} {}", equipment.label(), id);
    let terminals = equipment.terminal_ids();
    if terminals.len() != 2 {
        ctx.invalid(
            what,
            format!("{} ends at boundary node {}, only two are supported", terminals.len(), node),
        );
        return Ok(None);
    }

    let mut network_side = None;
    let mut boundary_side = None;
    for t in terminals.iter().flatten() {
        let at_node = model
            .terminal(t)
            .and_then(|ct| model.node(ct, ctx.node_breaker))
            .is_some_and(|n| n == node);
        if at_node {
            boundary_side = Some(t.clone());
        } else {
            network_side = Some(t.clone());
        }
    }
    let (Some(network_side), Some(boundary_side)) = (network_side, boundary_side) else {
        ctx.invalid(what, format!("Needs exactly one end at boundary node {}", node));
        return Ok(None);
    };
    let Some(end) = ctx.end_point(&network_side)? else {
        return Ok(None);
    };

    let params = series_parameters(equipment);
    let injection = ctx.boundary.injection(node).cloned();
    if injection.is_none() {
        debug!(node, dangling_line = %id, "no boundary injection, p0 and q0 set to 0");
    }
    let dangling_line = DanglingLine {
        r: Ohms(params.r),
        x: Ohms(params.x),
        g: Siemens(params.g),
        b: Siemens(params.b),
        p0: Megawatts(injection.as_ref().map_or(0.0, |i| i.p)),
        q0: Megavars(injection.as_ref().map_or(0.0, |i| i.q)),
        pairing_key: model.boundary_pairing_key(node).map(str::to_string),
        boundary_node: Some(node.to_string()),
        boundary_connected: model.terminal(&boundary_side).is_some_and(|t| t.connected),
        tie_line: None,
    };
    let idx = ctx.new_equipment(
        &id,
        equipment.name(),
        EquipmentData::DanglingLine(dangling_line),
        &[end],
    )?;
    if let Some(t) = ctx.network.equipment(idx).and_then(|e| e.terminal(1)) {
        ctx.terminals.add(&boundary_side, t, None);
    }
    Ok(Some(idx))
}

fn dangling_line_data<'c>(ctx: &'c Context, idx: EquipmentIdx) -> Option<(&'c str, &'c DanglingLine)> {
    let eq = ctx.network.equipment(idx)?;
    match &eq.data {
        EquipmentData::DanglingLine(dl) => Some((eq.id.as_str(), dl)),
        _ => None,
    }
}

/// Region of the substation holding the dangling line's network-side end.
fn region(ctx: &Context, idx: EquipmentIdx) -> Option<String> {
    let network = &ctx.network;
    let terminal = network.equipment(idx)?.terminal(1)?;
    let vl = network.voltage_level(network.terminal(terminal)?.voltage_level)?;
    network.substation(vl.substation?)?.region.clone()
}

/// Two dangling lines at one boundary node; tie line when their pairing keys
/// match and their regions differ. An unknown region counts as different.
fn pair_at_boundary(
    ctx: &mut Context,
    node: &str,
    a: &BoundaryEquipment,
    b: &BoundaryEquipment,
) -> Result<()> {
    let dl_a = convert_dangling_line(ctx, node, a)?;
    let dl_b = convert_dangling_line(ctx, node, b)?;
    let (Some(dl_a), Some(dl_b)) = (dl_a, dl_b) else {
        return Ok(());
    };
    let (Some((id_a, data_a)), Some((id_b, data_b))) =
        (dangling_line_data(ctx, dl_a), dangling_line_data(ctx, dl_b))
    else {
        return Ok(());
    };
    let (id_a, id_b) = (id_a.to_string(), id_b.to_string());
    let what = format!("Tie line at boundary node {}", node);

    if data_a.pairing_key != data_b.pairing_key {
        ctx.ignored(
            what,
            format!("Pairing keys of {} and {} differ", id_a, id_b),
        );
        return Ok(());
    }
    if let (Some(region_a), Some(region_b)) = (region(ctx, dl_a), region(ctx, dl_b)) {
        if region_a == region_b {
            ctx.ignored(
                what,
                format!("{} and {} are both in region {}", id_a, id_b, region_a),
            );
            return Ok(());
        }
    }

    let (first, second, id) = if id_a <= id_b {
        (dl_a, dl_b, format!("{} + {}", id_a, id_b))
    } else {
        (dl_b, dl_a, format!("{} + {}", id_b, id_a))
    };
    debug!(tie_line = %id, node, "paired dangling lines");
    ctx.network.new_tie_line(&id, None, first, second)?;
    Ok(())
}

// ============================================================================
// Post-processing
// ============================================================================

/// Final adjustments once all dangling lines exist.
///
/// - a dangling line whose boundary side is disconnected is disconnected on the
///   network side too, when configured
/// - unpaired connected dangling lines sharing a boundary node split the node's
///   injection equally
pub fn post_process_dangling_lines(ctx: &mut Context) {
    let candidates: Vec<(EquipmentIdx, String)> = ctx
        .network
        .equipment_of_kind(EquipmentKind::DanglingLine)
        .map(|(idx, eq)| (idx, eq.id.clone()))
        .collect();

    let mut by_node: BTreeMap<String, Vec<(EquipmentIdx, String)>> = BTreeMap::new();
    for (idx, id) in candidates {
        let Some((_, dl)) = dangling_line_data(ctx, idx) else {
            continue;
        };
        let boundary_connected = dl.boundary_connected;
        let paired = dl.tie_line.is_some();
        let node = dl.boundary_node.clone();
        let Some(terminal) = ctx.network.equipment(idx).and_then(|e| e.terminal(1)) else {
            continue;
        };
        let mut connected = ctx.network.terminal(terminal).is_some_and(|t| t.connected);

        if connected
            && !boundary_connected
            && ctx.config.disconnect_dangling_line_if_boundary_side_is_disconnected
        {
            if let Some(t) = ctx.network.terminal_mut(terminal) {
                t.connected = false;
            }
            ctx.fixed(
                format!("DanglingLine {}", id),
                "Boundary side disconnected, network side disconnected",
            );
            connected = false;
        }
        match node {
            Some(node) if connected && !paired => by_node.entry(node).or_default().push((idx, id)),
            _ => {}
        }
    }

    for (node, lines) in by_node.into_iter().filter(|(_, l)| l.len() > 1) {
        let Some((p0, q0)) = lines
            .first()
            .and_then(|(idx, _)| dangling_line_data(ctx, *idx))
            .map(|(_, dl)| (dl.p0, dl.q0))
        else {
            continue;
        };
        let count = lines.len() as f64;
        let share_p0 = Megawatts(p0.value() / count);
        let share_q0 = Megavars(q0.value() / count);
        for (idx, id) in &lines {
            if let Some(EquipmentData::DanglingLine(dl)) =
                ctx.network.equipment_mut(*idx).map(|e| &mut e.data)
            {
                dl.p0 = share_p0;
                dl.q0 = share_q0;
            }
            ctx.fixed_value(
                format!("DanglingLine {}", id),
                format!(
                    "{} connected dangling lines at boundary node {} share its injection",
                    lines.len(),
                    node
                ),
                p0.value(),
                share_p0.value(),
            );
        }
    }
}
