//! Conversion options.
//!
//! [`ConversionConfig`] is read from TOML and supports partial files: every
//! unspecified option takes its default.
//!
//! ```toml
//! convert_boundary = false
//! substation_ids_excluded_from_mapping = ["^FICT_.*"]
//! fictitious_switches_for_disconnected_terminals = "always_except_switches"
//! ```

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, Result};

/// When a disconnected terminal gets a fictitious open switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FictitiousSwitchesMode {
    #[default]
    Always,
    /// Terminals of switches are attached with an internal connection instead
    AlwaysExceptSwitches,
    Never,
}

impl FictitiousSwitchesMode {
    pub fn creates_switch(self, terminal_of_switch: bool) -> bool {
        match self {
            FictitiousSwitchesMode::Always => true,
            FictitiousSwitchesMode::AlwaysExceptSwitches => !terminal_of_switch,
            FictitiousSwitchesMode::Never => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Convert boundary equipment in the primary pass instead of deferring it.
    pub convert_boundary: bool,

    /// Patterns (full match) of substation ids never chosen as merge representative.
    pub substation_ids_excluded_from_mapping: Vec<String>,

    pub fictitious_switches_for_disconnected_terminals: FictitiousSwitchesMode,

    pub import_control_areas: bool,

    /// Disconnect the network side of a dangling line whose boundary side is open.
    pub disconnect_dangling_line_if_boundary_side_is_disconnected: bool,

    /// Percentage of the smallest temporary limit used when the permanent one is absent.
    pub missing_permanent_limit_percentage: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            convert_boundary: false,
            substation_ids_excluded_from_mapping: Vec::new(),
            fictitious_switches_for_disconnected_terminals: FictitiousSwitchesMode::Always,
            import_control_areas: true,
            disconnect_dangling_line_if_boundary_side_is_disconnected: true,
            missing_permanent_limit_percentage: 100.0,
        }
    }
}

impl ConversionConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.missing_permanent_limit_percentage) {
            return Err(ConversionError::Config(format!(
                "missing_permanent_limit_percentage must be within 0..=100, got {}",
                self.missing_permanent_limit_percentage
            )));
        }
        self.exclusion_patterns().map(|_| ())
    }

    /// Compiled exclusion patterns, anchored to match whole ids.
    pub fn exclusion_patterns(&self) -> Result<Vec<Regex>> {
        self.substation_ids_excluded_from_mapping
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                    ConversionError::Config(format!("invalid exclusion pattern {}: {}", p, e))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert!(!config.convert_boundary);
        assert!(config.import_control_areas);
        assert_eq!(
            config.fictitious_switches_for_disconnected_terminals,
            FictitiousSwitchesMode::Always
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = ConversionConfig::from_toml_str(
            r#"
            convert_boundary = true
            fictitious_switches_for_disconnected_terminals = "always_except_switches"
            "#,
        )
        .unwrap();
        assert!(config.convert_boundary);
        assert!(config.import_control_areas);
        assert!(!config
            .fictitious_switches_for_disconnected_terminals
            .creates_switch(true));
        assert!(config
            .fictitious_switches_for_disconnected_terminals
            .creates_switch(false));
    }

    #[test]
    fn test_exclusion_patterns_match_whole_id() {
        let config = ConversionConfig {
            substation_ids_excluded_from_mapping: vec!["FICT_.*".into()],
            ..ConversionConfig::default()
        };
        let patterns = config.exclusion_patterns().unwrap();
        assert!(patterns[0].is_match("FICT_1"));
        assert!(!patterns[0].is_match("S_FICT_1"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = ConversionConfig::from_toml_str(r#"substation_ids_excluded_from_mapping = ["("]"#);
        assert!(matches!(result, Err(ConversionError::Config(_))));
    }

    #[test]
    fn test_percentage_range_checked() {
        let result = ConversionConfig::from_toml_str("missing_permanent_limit_percentage = 120.0");
        assert!(matches!(result, Err(ConversionError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "import_control_areas = false").unwrap();
        let config = ConversionConfig::load(file.path()).unwrap();
        assert!(!config.import_control_areas);
    }
}
