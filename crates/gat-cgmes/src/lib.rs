//! # gat-cgmes: CGMES to network topology conversion
//!
//! Turns the semantic records of a CGMES model into a [`gat_core::Network`].
//! Records arrive already parsed into [`PropertyBag`]s, grouped by class in a
//! [`CgmesModel`]; this crate resolves their references into topology:
//!
//! - **Substation merging**: substations joined by transformers collapse into one
//! - **Node allocation**: connectivity nodes become vertices of their voltage
//!   level's topology view, topological nodes become buses
//! - **Boundary handling**: branches cut at a boundary node become dangling lines,
//!   paired into tie lines where two models meet
//! - **Regulating controls**: every control is resolved to a real network terminal
//!   once all equipment exists, walking switch chains when the referenced terminal
//!   was not converted
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gat_cgmes::{CgmesModel, Conversion, ConversionConfig};
//!
//! let model = CgmesModel::from_json_str(&std::fs::read_to_string("model.json")?)?;
//! let config = ConversionConfig::default();
//! let result = Conversion::new(&model, &config).convert()?;
//! println!("{}", result.diagnostics.summary());
//! ```
//!
//! Problems that do not prevent a network from being built are reported through
//! the returned [`gat_core::Diagnostics`], never as errors.

pub mod boundary;
pub mod config;
pub mod context;
pub mod conversion;
pub mod elements;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod model;
pub mod names;
pub mod nodes;
pub mod records;
pub mod regulating;
pub mod substations;
pub mod terminals;
pub mod topology;

pub use config::{ConversionConfig, FictitiousSwitchesMode};
pub use context::{Context, EndPoint};
pub use conversion::{Conversion, ConversionResult};
pub use error::{ConversionError, Result};
pub use model::{CgmesModel, CgmesTerminal, ModelRecords};
pub use records::{PropertyBag, PropertyBags};
pub use regulating::{PendingControl, RegulatingControl, RegulatingControlMapping};
pub use substations::SubstationIdMapping;
pub use topology::{RegulatingTerminalMapper, TerminalAndSign};
