//! # gat-core: Network Topology Model
//!
//! Provides the in-memory network that interchange converters build: substations,
//! voltage levels with a detailed topology, switches, terminals and equipment.
//!
//! ## Design Philosophy
//!
//! The network is a set of arenas addressed by typed indices. Each voltage level
//! owns an undirected petgraph arena ([`TopologyView`]) where:
//! - **Vertices**: integer nodes (node-breaker) or named buses (bus-breaker)
//! - **Edges**: switches and zero-impedance internal connections
//!
//! Equipment attaches to vertices through [`Terminal`]s, one per side. This keeps
//! the topology explicit for the lookups a converter needs: walking switch chains
//! from a terminal, finding the busbar section behind a disconnector, or detecting
//! that two ends of a switch are bypassed.
//!
//! ## Quick Start
//!
//! ```rust
//! use gat_core::*;
//!
//! let mut network = Network::new("demo");
//! let s = network.new_substation("S1", Some("Station 1"), None).unwrap();
//! let vl = network
//!     .new_voltage_level(VoltageLevelParams {
//!         id: "VL1".into(),
//!         name: None,
//!         substation: Some(s),
//!         nominal_v: Kilovolts(225.0),
//!         low_voltage_limit: None,
//!         high_voltage_limit: None,
//!         topology_kind: TopologyKind::NodeBreaker,
//!     })
//!     .unwrap();
//!
//! network.ensure_node(vl, 1).unwrap();
//! network.new_internal_connection(vl, 0, 1).unwrap();
//! network
//!     .new_equipment(
//!         "BBS1",
//!         None,
//!         EquipmentData::BusbarSection,
//!         &[Connection { voltage_level: vl, node: 0, connected: true }],
//!     )
//!     .unwrap();
//!
//! assert_eq!(network.stats().count(EquipmentKind::BusbarSection), 1);
//! ```
//!
//! ## Modules
//!
//! - [`network`] - The network container and its creation/lookup operations
//! - [`topology`] - Per-voltage-level topology arena and traversal
//! - [`equipment`] - Equipment payloads and regulation settings
//! - [`diagnostics`] - Conversion diagnostics sink
//! - [`units`] - Typed physical quantities

use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod equipment;
pub mod error;
pub mod network;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, IssueKind, Severity};
pub use equipment::*;
pub use error::{GatError, GatResult};
pub use network::{
    Connection, ControlArea, HvdcLine, Identifiable, Network, NetworkStats, Substation, Switch,
    SwitchKind, Terminal, TieLine, TopologyKind, VoltageLevel, VoltageLevelParams,
};
pub use topology::{Link, TopologyView, TraverseResult, NODE_BLOCK};
pub use units::{
    Amperes, Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, Ohms, Siemens,
};

// Newtype wrappers for arena indices for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstationIdx(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoltageLevelIdx(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentIdx(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalIdx(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchIdx(usize);

impl SubstationIdx {
    #[inline]
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl VoltageLevelIdx {
    #[inline]
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl EquipmentIdx {
    #[inline]
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl TerminalIdx {
    #[inline]
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl SwitchIdx {
    #[inline]
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}
