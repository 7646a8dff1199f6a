//! Generic semantic records.
//!
//! A [`PropertyBag`] is one record as produced by the query layer over the
//! interchange graph: a flat set of string attributes. Values that reference other
//! records keep whatever decoration the source format used (`#_id`, `_id`,
//! `urn:uuid:id`); [`PropertyBag::id`] strips it. Enumerated values arrive as full
//! IRIs (`http://iec.ch/...#RegulatingControlModeKind.voltage`) and
//! [`PropertyBag::local`] reduces them to their last segment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One record of key/value attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    values: BTreeMap<String, String>,
}

/// A record set, in query order.
pub type PropertyBags = Vec<PropertyBag>;

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw value; empty strings count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Reference value with its decoration removed.
    pub fn id(&self, key: &str) -> Option<String> {
        self.get(key).map(strip_reference).map(str::to_string)
    }

    /// Last segment of an enumerated or prefixed value (`cim:Breaker` -> `Breaker`).
    pub fn local(&self, key: &str) -> Option<&str> {
        self.get(key).map(|v| {
            v.rsplit(|c: char| matches!(c, '#' | '.' | '/' | ':'))
                .next()
                .unwrap_or(v)
        })
    }

    pub fn as_f64_opt(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse::<f64>().ok())
    }

    /// Numeric value, `default` when absent or unparsable.
    pub fn as_f64(&self, key: &str, default: f64) -> f64 {
        self.as_f64_opt(key).unwrap_or(default)
    }

    pub fn as_i32(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(|v| {
                v.parse::<i32>()
                    .ok()
                    .or_else(|| v.parse::<f64>().ok().map(|f| f.round() as i32))
            })
            .unwrap_or(default)
    }

    pub fn as_bool_opt(&self, key: &str) -> Option<bool> {
        match self.get(key)?.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn as_bool(&self, key: &str, default: bool) -> bool {
        self.as_bool_opt(key).unwrap_or(default)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Strip reference decorations: `#_abc` -> `abc`, `urn:uuid:abc` -> `abc`.
pub fn strip_reference(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("urn:uuid:").unwrap_or(value);
    let value = value.trim_start_matches('#');
    value.strip_prefix('_').unwrap_or(value)
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
