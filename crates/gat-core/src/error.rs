//! Error type for network construction.
//!
//! Building a network fails only on structural problems: an identifier that is
//! already taken, a reference to an object that does not exist, or a topology
//! edit that points outside the voltage level it targets. Lookups that may
//! legitimately come up empty return `Option` instead.
//!
//! # Example
//!
//! ```
//! use gat_core::{GatError, GatResult, Network};
//!
//! fn build() -> GatResult<Network> {
//!     let mut network = Network::new("demo");
//!     network.new_substation("S1", None, None)?;
//!     Ok(network)
//! }
//!
//! assert!(build().is_ok());
//! ```

use thiserror::Error;

/// Errors raised while building or editing a [`Network`](crate::Network).
#[derive(Error, Debug)]
pub enum GatError {
    /// An identifiable object with this id already exists
    #[error("Duplicate identifier: {0}")]
    DuplicateId(String),

    /// A referenced object does not exist
    #[error("Unknown identifier: {0}")]
    UnknownId(String),

    /// A topology edit referenced a vertex or voltage level inconsistently
    #[error("Topology error: {0}")]
    Topology(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),
}

/// Convenience type alias for Results using GatError.
pub type GatResult<T> = Result<T, GatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatError::DuplicateId("VL1".into());
        assert_eq!(err.to_string(), "Duplicate identifier: VL1");
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GatResult<()> {
            Err(GatError::Topology("node 7 outside VL1".into()))
        }

        fn outer() -> GatResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(GatError::Topology(_))));
    }
}
