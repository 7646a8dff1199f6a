//! Errors that abort a conversion run.
//!
//! Anything recoverable (a bad target value, an unmapped terminal, an unsupported
//! mode) goes to the diagnostics sink instead; these variants are reserved for
//! structural inconsistencies of the input or misuse of the API.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// The same equipment registered a pending control twice
    #[error("Duplicate regulating control registration for equipment {equipment}")]
    DuplicateRegistration { equipment: String },

    /// No voltage levels: the input lacks the equipment profile
    #[error("Model {0} has no equipment core")]
    MissingEquipmentCore(String),

    /// The network model rejected a construction step
    #[error(transparent)]
    Network(#[from] gat_core::GatError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConversionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_message() {
        let err = ConversionError::DuplicateRegistration {
            equipment: "GEN1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate regulating control registration for equipment GEN1"
        );
    }

    #[test]
    fn test_network_error_wraps() {
        let err: ConversionError = gat_core::GatError::DuplicateId("VL1".into()).into();
        assert_eq!(err.to_string(), "Duplicate identifier: VL1");
    }
}
