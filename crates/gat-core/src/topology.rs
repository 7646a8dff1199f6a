//! Detailed topology of a single voltage level.
//!
//! Every voltage level owns a [`TopologyView`]: an undirected petgraph arena whose
//! vertices are either anonymous integer nodes (node-breaker models) or named buses
//! (bus-breaker models), and whose edges are switches or zero-impedance internal
//! connections.
//!
//! Node-breaker vertices are indexed densely from zero. The view grows in blocks
//! when a node index beyond its current capacity is requested, so vertex indices
//! handed out earlier stay valid.
//!
//! [`TopologyView::traverse`] walks the arena iteratively with a visited set. The
//! walk visits each vertex at most once, so cyclic switch arrangements terminate.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::{GatError, GatResult, SwitchIdx};

/// Number of vertices added each time a node-breaker view runs out of room.
pub const NODE_BLOCK: usize = 32;

/// A vertex of the topology arena.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Vertex {
    /// Bus id for bus-breaker vertices; `None` for node-breaker nodes
    pub bus: Option<String>,
}

/// An edge of the topology arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Link {
    Switch(SwitchIdx),
    /// Zero-impedance connection between two nodes
    Internal,
}

/// Decision returned by a traversal callback for each crossed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseResult {
    /// Cross the edge and keep exploring from the vertex behind it
    Continue,
    /// Do not cross this edge; other paths continue
    TerminatePath,
    /// Stop the whole traversal
    TerminateTraverser,
}

#[derive(Debug, Clone, Default)]
pub struct TopologyView {
    graph: UnGraph<Vertex, Link>,
    buses: HashMap<String, usize>,
}

impl TopologyView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices currently available.
    pub fn capacity(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Make vertex `node` addressable, growing by whole blocks.
    ///
    /// Returns the number of vertices added.
    pub fn ensure_node(&mut self, node: usize) -> usize {
        let mut added = 0;
        while node >= self.graph.node_count() {
            for _ in 0..NODE_BLOCK {
                self.graph.add_node(Vertex::default());
            }
            added += NODE_BLOCK;
        }
        added
    }

    /// Add a named bus vertex; fails when the bus already exists.
    pub fn add_bus(&mut self, id: &str) -> GatResult<usize> {
        if self.buses.contains_key(id) {
            return Err(GatError::DuplicateId(id.to_string()));
        }
        let index = self
            .graph
            .add_node(Vertex {
                bus: Some(id.to_string()),
            })
            .index();
        self.buses.insert(id.to_string(), index);
        Ok(index)
    }

    pub fn bus(&self, id: &str) -> Option<usize> {
        self.buses.get(id).copied()
    }

    pub fn bus_ids(&self) -> impl Iterator<Item = &str> {
        self.buses.keys().map(String::as_str)
    }

    pub fn vertex(&self, node: usize) -> Option<&Vertex> {
        self.graph.node_weight(NodeIndex::new(node))
    }

    fn check(&self, node: usize) -> GatResult<NodeIndex> {
        if node < self.graph.node_count() {
            Ok(NodeIndex::new(node))
        } else {
            Err(GatError::Topology(format!(
                "vertex {} outside view of {} vertices",
                node,
                self.graph.node_count()
            )))
        }
    }

    pub(crate) fn add_link(&mut self, node1: usize, node2: usize, link: Link) -> GatResult<()> {
        let a = self.check(node1)?;
        let b = self.check(node2)?;
        self.graph.add_edge(a, b, link);
        Ok(())
    }

    /// Connect two existing vertices with an internal connection.
    pub fn add_internal_connection(&mut self, node1: usize, node2: usize) -> GatResult<()> {
        self.add_link(node1, node2, Link::Internal)
    }

    pub fn internal_connection_count(&self) -> usize {
        self.graph
            .edge_weights()
            .filter(|link| **link == Link::Internal)
            .count()
    }

    /// All edges leaving `node` together with the vertex on the other side.
    pub fn links(&self, node: usize) -> Vec<(Link, usize)> {
        if node >= self.graph.node_count() {
            return Vec::new();
        }
        let index = NodeIndex::new(node);
        self.graph
            .edges(index)
            .map(|edge| {
                let other = if edge.source() == index {
                    edge.target()
                } else {
                    edge.source()
                };
                (*edge.weight(), other.index())
            })
            .collect()
    }

    pub fn has_link(&self, node1: usize, node2: usize, link: Link) -> bool {
        self.links(node1)
            .into_iter()
            .any(|(l, other)| l == link && other == node2)
    }

    /// Walk the arena from `start`.
    ///
    /// `visit(from, link, to)` is called for every edge leading to a vertex not yet
    /// reached. The start vertex counts as reached. Returns `false` when the
    /// callback stopped the traversal.
    pub fn traverse<F>(&self, start: usize, mut visit: F) -> bool
    where
        F: FnMut(usize, Link, usize) -> TraverseResult,
    {
        if start >= self.graph.node_count() {
            return true;
        }
        let mut reached = vec![false; self.graph.node_count()];
        reached[start] = true;
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for (link, other) in self.links(node) {
                if reached[other] {
                    continue;
                }
                match visit(node, link, other) {
                    TraverseResult::Continue => {
                        reached[other] = true;
                        stack.push(other);
                    }
                    TraverseResult::TerminatePath => {}
                    TraverseResult::TerminateTraverser => return false,
                }
            }
        }
        true
    }

    /// Vertices electrically joined to `start` through closed edges.
    ///
    /// `is_open` decides whether a switch edge is open.
    pub fn connected_set<F>(&self, start: usize, is_open: F) -> HashSet<usize>
    where
        F: Fn(SwitchIdx) -> bool,
    {
        let mut set = HashSet::from([start]);
        self.traverse(start, |_, link, to| match link {
            Link::Switch(sw) if is_open(sw) => TraverseResult::TerminatePath,
            _ => {
                set.insert(to);
                TraverseResult::Continue
            }
        });
        set
    }
}
