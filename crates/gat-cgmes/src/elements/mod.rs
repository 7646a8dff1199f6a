//! Per-class conversion of records into network objects.
//!
//! Each submodule converts one family of record classes. The functions take the
//! run's [`Context`] by `&mut`, report recoverable problems through its
//! diagnostics and only return `Err` when the network rejects a construction
//! step.

pub mod containers;
pub mod control_areas;
pub mod dc;
pub mod injections;
pub mod limits;
pub mod lines;
pub mod switches;
pub mod transformers;

use crate::context::{Context, EndPoint};
use crate::error::Result;
use crate::names;
use crate::records::PropertyBag;

/// Boundary node an element must be deferred to, if any.
pub(crate) fn deferral_node(ctx: &Context, terminal_ids: &[Option<String>]) -> Option<String> {
    if ctx.config.convert_boundary {
        return None;
    }
    ctx.boundary_node(terminal_ids)
}

/// End point of a single-terminal element.
///
/// Injections at a boundary node are not converted unless boundary conversion
/// is enabled.
pub(crate) fn injection_end(
    ctx: &mut Context,
    what: &str,
    bag: &PropertyBag,
) -> Result<Option<EndPoint>> {
    let Some(terminal) = bag.id(names::TERMINAL) else {
        ctx.missing(format!("Terminal of {}", what));
        return Ok(None);
    };
    if let Some(node) = deferral_node(ctx, &[Some(terminal.clone())]) {
        ctx.ignored(what, format!("Injection at boundary node {}", node));
        return Ok(None);
    }
    ctx.end_point(&terminal)
}

/// Two-terminal element record ends.
pub(crate) fn branch_terminals(bag: &PropertyBag) -> Vec<Option<String>> {
    vec![bag.id(names::TERMINAL1), bag.id(names::TERMINAL2)]
}
