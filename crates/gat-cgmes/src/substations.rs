//! Substation and voltage level merging.
//!
//! The network model requires both ends of a transformer to sit in one
//! substation, and both ends of a switch to sit in one voltage level. Input
//! models do not always respect that, so ids are grouped into connected
//! components:
//!
//! - substations joined by the ends of a transformer (ends at boundary nodes are
//!   skipped)
//! - voltage levels joined by a switch whose ends lie in different levels; their
//!   substations are joined as well
//!
//! Each component of more than one id is represented by its lexicographically
//! smallest member, skipping substation ids that match a configured exclusion
//! pattern (when every member is excluded the smallest one is used anyway).

use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ConversionConfig;
use crate::error::Result;
use crate::model::CgmesModel;
use crate::names;

/// Union-find over string ids.
#[derive(Debug, Default)]
struct IdGroups {
    ids: BTreeMap<String, usize>,
    edges: Vec<(usize, usize)>,
}

impl IdGroups {
    fn index(&mut self, id: &str) -> usize {
        let next = self.ids.len();
        *self.ids.entry(id.to_string()).or_insert(next)
    }

    fn join(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        let a = self.index(a);
        let b = self.index(b);
        self.edges.push((a, b));
    }

    /// Components with more than one member, each sorted.
    fn components(&self) -> Vec<Vec<String>> {
        let mut uf = UnionFind::<usize>::new(self.ids.len());
        for &(a, b) in &self.edges {
            uf.union(a, b);
        }
        let mut groups: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for (id, &i) in &self.ids {
            groups.entry(uf.find(i)).or_default().insert(id.clone());
        }
        groups
            .into_values()
            .filter(|g| g.len() > 1)
            .map(|g| g.into_iter().collect())
            .collect()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SubstationIdMapping {
    substations: BTreeMap<String, String>,
    voltage_levels: BTreeMap<String, String>,
}

impl SubstationIdMapping {
    pub fn build(model: &CgmesModel, config: &ConversionConfig) -> Result<Self> {
        let excluded = config.exclusion_patterns()?;
        let node_breaker = model.is_node_breaker();
        let mut substations = IdGroups::default();
        let mut voltage_levels = IdGroups::default();

        for (transformer, ends) in model.grouped_transformer_ends() {
            let mut first: Option<String> = None;
            for end in ends {
                let Some(container) = end
                    .id(names::TERMINAL)
                    .and_then(|t| model.terminal(&t))
                    .and_then(|t| model.node(t, node_breaker))
                    .filter(|n| !model.is_boundary_node(n))
                    .and_then(|n| model.node_container(&n))
                else {
                    continue;
                };
                let Some(substation) = container.substation else {
                    continue;
                };
                match &first {
                    None => first = Some(substation),
                    Some(f) => {
                        debug!(transformer, from = %f, to = %substation, "transformer spans substations");
                        substations.join(f, &substation);
                    }
                }
            }
        }

        for switch in &model.records().switches {
            let levels: Vec<String> = [names::TERMINAL1, names::TERMINAL2]
                .iter()
                .filter_map(|k| switch.id(k))
                .filter_map(|t| model.terminal(&t))
                .filter_map(|t| model.node(t, node_breaker))
                .filter(|n| !model.is_boundary_node(n))
                .filter_map(|n| model.node_container(&n)?.voltage_level)
                .collect();
            if let [vl1, vl2] = levels.as_slice() {
                if vl1 != vl2 {
                    voltage_levels.join(vl1, vl2);
                    if let (Some(s1), Some(s2)) = (
                        model.substation_of_voltage_level(vl1),
                        model.substation_of_voltage_level(vl2),
                    ) {
                        substations.join(s1, s2);
                    }
                }
            }
        }

        let mut mapping = Self::default();
        for group in substations.components() {
            let rep = representative(&group, &excluded).to_string();
            record_merged(&mut mapping.substations, &group, &rep);
        }
        for group in voltage_levels.components() {
            let rep = representative(&group, &[]).to_string();
            record_merged(&mut mapping.voltage_levels, &group, &rep);
        }

        if !mapping.substations.is_empty() {
            warn!(
                merged = mapping.substations.len(),
                "Substations merged because transformers or switches span them: {:?}",
                mapping.substations
            );
        }
        if !mapping.voltage_levels.is_empty() {
            warn!(
                merged = mapping.voltage_levels.len(),
                "Voltage levels merged because switches span them: {:?}",
                mapping.voltage_levels
            );
        }
        Ok(mapping)
    }

    /// Representative of a substation id; unmapped ids map to themselves.
    pub fn substation<'a>(&'a self, id: &'a str) -> &'a str {
        self.substations.get(id).map_or(id, String::as_str)
    }

    pub fn voltage_level<'a>(&'a self, id: &'a str) -> &'a str {
        self.voltage_levels.get(id).map_or(id, String::as_str)
    }

    pub fn is_substation_mapped(&self, id: &str) -> bool {
        self.substations.contains_key(id)
    }

    pub fn is_voltage_level_mapped(&self, id: &str) -> bool {
        self.voltage_levels.contains_key(id)
    }

    /// Ids merged into `representative`, not including it.
    pub fn merged_substations(&self, representative: &str) -> Vec<&str> {
        self.substations
            .iter()
            .filter(|(_, rep)| rep.as_str() == representative)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn merged_voltage_levels(&self, representative: &str) -> Vec<&str> {
        self.voltage_levels
            .iter()
            .filter(|(_, rep)| rep.as_str() == representative)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Smallest member not excluded; the smallest member when all are excluded.
fn representative<'a>(sorted_group: &'a [String], excluded: &[Regex]) -> &'a str {
    sorted_group
        .iter()
        .find(|id| !excluded.iter().any(|p| p.is_match(id)))
        .or_else(|| sorted_group.first())
        .map_or("", String::as_str)
}

fn record_merged(mapping: &mut BTreeMap<String, String>, group: &[String], rep: &str) {
    for id in group.iter().filter(|id| id.as_str() != rep) {
        mapping.insert(id.clone(), rep.to_string());
    }
}
