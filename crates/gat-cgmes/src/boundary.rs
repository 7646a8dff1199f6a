//! Equipment at boundary nodes.
//!
//! A boundary node is the point where the modeled network meets a neighbour.
//! Whether a boundary node ends up as a dangling line or as half of a tie line
//! depends on how many elements touch it, which is only known once every branch
//! has been seen. Branches with an end at a boundary node are therefore parked
//! here during the primary pass and converted afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::model::CgmesModel;
use crate::names;
use crate::records::PropertyBag;

/// A deferred branch, in record form.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryEquipment<'a> {
    Line(&'a PropertyBag),
    Switch(&'a PropertyBag),
    EquivalentBranch(&'a PropertyBag),
    /// Transformer ends, ordered by end number
    Transformer(Vec<&'a PropertyBag>),
}

impl BoundaryEquipment<'_> {
    pub fn id(&self) -> String {
        match self {
            BoundaryEquipment::Line(bag) => bag.id("ACLineSegment"),
            BoundaryEquipment::Switch(bag) => bag.id("Switch"),
            BoundaryEquipment::EquivalentBranch(bag) => bag.id("EquivalentBranch"),
            BoundaryEquipment::Transformer(ends) => {
                ends.first().and_then(|e| e.id(names::POWER_TRANSFORMER))
            }
        }
        .unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            BoundaryEquipment::Line(bag)
            | BoundaryEquipment::Switch(bag)
            | BoundaryEquipment::EquivalentBranch(bag) => bag.get(names::NAME),
            BoundaryEquipment::Transformer(ends) => ends.first().and_then(|e| e.get(names::NAME)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BoundaryEquipment::Line(_) => "ACLineSegment",
            BoundaryEquipment::Switch(_) => "Switch",
            BoundaryEquipment::EquivalentBranch(_) => "EquivalentBranch",
            BoundaryEquipment::Transformer(_) => "PowerTransformer",
        }
    }

    pub fn terminal_ids(&self) -> Vec<Option<String>> {
        match self {
            BoundaryEquipment::Line(bag)
            | BoundaryEquipment::Switch(bag)
            | BoundaryEquipment::EquivalentBranch(bag) => {
                vec![bag.id(names::TERMINAL1), bag.id(names::TERMINAL2)]
            }
            BoundaryEquipment::Transformer(ends) => {
                ends.iter().map(|e| e.id(names::TERMINAL)).collect()
            }
        }
    }

    /// All terminals present and connected.
    pub fn is_connected(&self, model: &CgmesModel) -> bool {
        self.terminal_ids().iter().all(|t| {
            t.as_deref()
                .and_then(|t| model.terminal(t))
                .is_some_and(|t| t.connected)
        })
    }
}

/// Boundary-side injection taken from an equivalent injection at the node.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryInjection {
    pub id: String,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Default)]
pub struct Boundary<'a> {
    deferred: BTreeMap<String, Vec<BoundaryEquipment<'a>>>,
    injections: HashMap<String, BoundaryInjection>,
    injection_ids: HashSet<String>,
}

impl<'a> Boundary<'a> {
    pub fn new(model: &'a CgmesModel) -> Self {
        let node_breaker = model.is_node_breaker();
        let mut boundary = Self::default();
        for bag in &model.records().equivalent_injections {
            let Some(id) = bag.id("EquivalentInjection") else {
                continue;
            };
            let Some(node) = bag
                .id(names::TERMINAL)
                .and_then(|t| model.terminal(&t))
                .and_then(|t| model.node(t, node_breaker))
                .filter(|n| model.is_boundary_node(n))
            else {
                continue;
            };
            debug!(injection = %id, node = %node, "boundary injection");
            boundary.injection_ids.insert(id.clone());
            boundary.injections.insert(
                node,
                BoundaryInjection {
                    id,
                    p: bag.as_f64(names::P, 0.0),
                    q: bag.as_f64(names::Q, 0.0),
                },
            );
        }
        boundary
    }

    /// Park `equipment` until the primary pass is complete.
    pub fn defer(&mut self, node: &str, equipment: BoundaryEquipment<'a>) {
        self.deferred.entry(node.to_string()).or_default().push(equipment);
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.values().map(Vec::len).sum()
    }

    /// Deferred equipment grouped by boundary node, in node order.
    pub fn take_deferred(&mut self) -> BTreeMap<String, Vec<BoundaryEquipment<'a>>> {
        std::mem::take(&mut self.deferred)
    }

    pub fn injection(&self, node: &str) -> Option<&BoundaryInjection> {
        self.injections.get(node)
    }

    /// Equivalent injection sitting at a boundary node.
    pub fn is_boundary_injection(&self, id: &str) -> bool {
        self.injection_ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ModelBuilder;

    #[test]
    fn test_injection_indexed_by_boundary_node() {
        let mut b = ModelBuilder::node_breaker();
        b.boundary_node("XN", "XKEY");
        b.equivalent_injection("EI", "XN", 10.0, 2.0);
        let model = b.build();

        let boundary = Boundary::new(&model);
        let injection = boundary.injection("XN").unwrap();
        assert_eq!(injection.id, "EI");
        assert_eq!(injection.p, 10.0);
        assert!(boundary.is_boundary_injection("EI"));
    }

    #[test]
    fn test_deferred_grouped_by_node() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 380.0);
        b.node("CN", "VL");
        b.boundary_node("XN", "XKEY");
        b.line("L1", "CN", "XN");
        b.line("L2", "CN", "XN");
        let model = b.build();
        let lines = &model.records().ac_line_segments;

        let mut boundary = Boundary::new(&model);
        boundary.defer("XN", BoundaryEquipment::Line(&lines[0]));
        boundary.defer("XN", BoundaryEquipment::Line(&lines[1]));
        assert_eq!(boundary.deferred_count(), 2);

        let deferred = boundary.take_deferred();
        let ids: Vec<String> = deferred["XN"].iter().map(BoundaryEquipment::id).collect();
        assert_eq!(ids, vec!["L1", "L2"]);
        assert!(deferred["XN"][0].is_connected(&model));
        assert_eq!(boundary.deferred_count(), 0);
    }
}
