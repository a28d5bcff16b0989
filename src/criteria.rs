// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Search criteria loaded from the JSON config file.
//!
//! A [`Criteria`] value is constructed once from configuration and never
//! mutated afterwards. Query phases that need a different `replica` or
//! `data_node` filter derive an explicit copy via [`Criteria::with_field`],
//! so no phase can observe another phase's filters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Search criteria: the index endpoint, a field -> value filter map, and an
/// ordered data-node preference list.
///
/// Field values may be wildcards (`"*"`) or OR-joined alternatives
/// (`"a OR b"`); they are passed to the index verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Criteria {
    /// Base URL of the search endpoint. Required.
    #[serde(rename = "search_api", default)]
    pub api: String,

    /// Field filters applied to every query derived from these criteria.
    ///
    /// A `BTreeMap` keeps query parameters in a stable order, so identical
    /// criteria always produce identical request URLs.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Ordered list of preferred data nodes. Empty means no preference.
    #[serde(default)]
    pub data_node_priority: Vec<String>,
}

impl Criteria {
    /// Force the protocol-owned fields after loading user configuration.
    ///
    /// `retracted` and `latest` pin the result set to current, non-retracted
    /// records; `replica` and `data_node` start as wildcards and are narrowed
    /// per query phase with [`Criteria::with_field`]. User-supplied values
    /// for these four fields are overwritten unconditionally.
    pub fn normalized(mut self) -> Self {
        self.fields.insert("replica".to_string(), "*".to_string());
        self.fields.insert("data_node".to_string(), "*".to_string());
        self.fields.insert("retracted".to_string(), "false".to_string());
        self.fields.insert("latest".to_string(), "true".to_string());
        self
    }

    /// Derive a copy with one field filter replaced.
    pub fn with_field(&self, name: &str, value: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.fields.insert(name.to_string(), value.into());
        derived
    }

    /// Derive a copy restricted to canonical or replica records.
    pub fn with_replica(&self, replica: bool) -> Self {
        self.with_field("replica", if replica { "true" } else { "false" })
    }

    /// Derive a copy restricted to the given data nodes (OR-joined).
    pub fn with_data_nodes(&self, nodes: &[String]) -> Self {
        self.with_field("data_node", nodes.join(" OR "))
    }

    /// Whether a data-node preference list was configured.
    pub fn has_priority(&self) -> bool {
        !self.data_node_priority.is_empty()
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  search_api: {}", self.api)?;
        for (name, value) in &self.fields {
            writeln!(f, "  {}: {}", name, value)?;
        }
        if !self.data_node_priority.is_empty() {
            writeln!(f, "  data_node_priority: {:?}", self.data_node_priority)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(json: &str) -> Criteria {
        serde_json::from_str::<Criteria>(json)
            .expect("valid criteria JSON")
            .normalized()
    }

    #[test]
    fn test_forced_fields_override_config() {
        let criteria = loaded(
            r#"{
                "search_api": "https://esgf.example/search",
                "fields": {
                    "project": "CMIP6",
                    "retracted": "true",
                    "latest": "false",
                    "replica": "true"
                }
            }"#,
        );

        assert_eq!(criteria.fields["retracted"], "false");
        assert_eq!(criteria.fields["latest"], "true");
        assert_eq!(criteria.fields["replica"], "*");
        assert_eq!(criteria.fields["data_node"], "*");
        assert_eq!(criteria.fields["project"], "CMIP6");
    }

    #[test]
    fn test_derived_copies_do_not_mutate_source() {
        let criteria = loaded(r#"{"search_api": "https://esgf.example/search"}"#);

        let originals = criteria.with_replica(false);
        let replicas = criteria.with_replica(true);

        assert_eq!(criteria.fields["replica"], "*");
        assert_eq!(originals.fields["replica"], "false");
        assert_eq!(replicas.fields["replica"], "true");
    }

    #[test]
    fn test_data_node_or_join() {
        let criteria = loaded(r#"{"search_api": "https://esgf.example/search"}"#);
        let narrowed =
            criteria.with_data_nodes(&["dn1.example".to_string(), "dn2.example".to_string()]);

        assert_eq!(narrowed.fields["data_node"], "dn1.example OR dn2.example");
    }

    #[test]
    fn test_priority_list_defaults_empty() {
        let criteria = loaded(r#"{"search_api": "https://esgf.example/search"}"#);
        assert!(!criteria.has_priority());

        let criteria = loaded(
            r#"{"search_api": "https://esgf.example/search",
                "data_node_priority": ["dn1.example"]}"#,
        );
        assert!(criteria.has_priority());
    }
}
