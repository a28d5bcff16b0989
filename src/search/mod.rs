// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Search index client.
//!
//! Talks to an ESGF-style federated search endpoint that speaks the Solr
//! JSON response format. Discovery is strictly sequential: one outstanding
//! query at a time, and a failed query is fatal to the current phase (it is
//! propagated, never retried).
//!
//! # Example
//!
//! ```no_run
//! use gridfetch::{Criteria, SearchClient};
//!
//! let criteria: Criteria = serde_json::from_str(
//!     r#"{"search_api": "https://esgf-node.llnl.gov/esg-search/search",
//!         "fields": {"project": "CMIP6"}}"#,
//! )?;
//! let criteria = criteria.normalized();
//!
//! let client = SearchClient::new();
//! let total = client.count(&criteria.with_replica(false))?;
//! println!("{} canonical files match", total);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::criteria::Criteria;
use crate::record::{Record, SolrDoc};

/// Timeout for establishing a connection to the index.
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Timeout for a complete search query round-trip.
const QUERY_TIMEOUT_SECS: u64 = 120;

/// Response format requested from the index.
const SOLR_JSON_FORMAT: &str = "application/solr+json";

/// Top-level Solr JSON envelope.
#[derive(Debug, Deserialize)]
struct SolrEnvelope {
    response: SolrResponse,
    #[serde(default)]
    facet_counts: Option<FacetCounts>,
}

#[derive(Debug, Deserialize)]
struct SolrResponse {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_fields: HashMap<String, Vec<serde_json::Value>>,
}

/// Client for a federated search index.
#[derive(Debug, Clone)]
pub struct SearchClient {
    /// HTTP client with configured timeouts.
    client: reqwest::blocking::Client,
}

impl Default for SearchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchClient {
    /// Create a new search client with default timeouts.
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .timeout(Duration::from_secs(QUERY_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Number of records matching the criteria, without fetching any.
    pub fn count(&self, criteria: &Criteria) -> Result<u64> {
        let (_, remaining) = self.page(criteria, 0, 0)?;
        Ok(remaining)
    }

    /// Fetch up to `limit` records starting at `offset`.
    ///
    /// Returns the records together with how many more remain after this
    /// page. A `limit` of 0 is a count-only probe: no records come back and
    /// the remaining count is the total number of matches.
    ///
    /// Records without a plain-HTTP access URL are skipped with a warning;
    /// they cannot be downloaded by this tool.
    pub fn page(&self, criteria: &Criteria, offset: u64, limit: u64) -> Result<(Vec<Record>, u64)> {
        let envelope = self.query(criteria, offset, limit, None)?;
        decode_page(envelope, offset)
    }

    /// Distinct values of `field` among matching records, with counts.
    pub fn facet(&self, criteria: &Criteria, field: &str) -> Result<HashMap<String, u64>> {
        let mut envelope = self.query(criteria, 0, 0, Some(field))?;
        let values = envelope
            .facet_counts
            .as_mut()
            .and_then(|counts| counts.facet_fields.remove(field))
            .unwrap_or_default();
        Ok(decode_facet_counts(&values))
    }

    /// Field keys of a single sample record, or `None` when nothing matches.
    ///
    /// The returned list may be incomplete: only the fields present on the
    /// sampled record are visible.
    pub fn field_keys(&self, criteria: &Criteria) -> Result<Option<Vec<String>>> {
        let envelope = self.query(criteria, 0, 1, None)?;
        Ok(envelope
            .response
            .docs
            .first()
            .and_then(|doc| doc.as_object())
            .map(|fields| fields.keys().cloned().collect()))
    }

    /// Execute one query against the index and parse the Solr envelope.
    fn query(
        &self,
        criteria: &Criteria,
        offset: u64,
        limit: u64,
        facet: Option<&str>,
    ) -> Result<SolrEnvelope> {
        let mut request = self
            .client
            .get(&criteria.api)
            .query(&[("format", SOLR_JSON_FORMAT), ("type", "File")])
            .query(&[("offset", offset), ("limit", limit)]);

        for (name, value) in &criteria.fields {
            request = request.query(&[(name.as_str(), value.as_str())]);
        }
        if let Some(field) = facet {
            request = request.query(&[("facets", field)]);
        }

        debug!(api = %criteria.api, offset, limit, facet, "search query");

        let response = request
            .send()
            .with_context(|| format!("search request to {} failed", criteria.api))?;

        if !response.status().is_success() {
            bail!(
                "search query failed: HTTP {} from {}",
                response.status(),
                criteria.api
            );
        }

        response
            .json()
            .with_context(|| format!("failed to parse search response from {}", criteria.api))
    }
}

/// Unpack a page envelope into records plus the remaining count.
fn decode_page(envelope: SolrEnvelope, offset: u64) -> Result<(Vec<Record>, u64)> {
    let num_found = envelope.response.num_found;
    let fetched = envelope.response.docs.len() as u64;

    let mut records = Vec::with_capacity(envelope.response.docs.len());
    for value in envelope.response.docs {
        let doc: SolrDoc =
            serde_json::from_value(value).context("failed to parse file record from index")?;
        let instance_id = doc.instance_id().to_string();
        match doc.into_record() {
            Some(record) => records.push(record),
            None => warn!(%instance_id, "record has no HTTP access URL, skipping"),
        }
    }

    Ok((records, num_found.saturating_sub(offset + fetched)))
}

/// Decode Solr's flat `[value, count, value, count, ...]` facet encoding.
fn decode_facet_counts(values: &[serde_json::Value]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for pair in values.chunks(2) {
        if let [value, count] = pair {
            if let (Some(value), Some(count)) = (value.as_str(), count.as_u64()) {
                counts.insert(value.to_string(), count);
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> SolrEnvelope {
        serde_json::from_str(json).expect("valid Solr envelope")
    }

    #[test]
    fn test_count_probe_reports_total_as_remaining() {
        let envelope = envelope(r#"{"response": {"numFound": 150, "docs": []}}"#);
        let (records, remaining) = decode_page(envelope, 0).unwrap();

        assert!(records.is_empty());
        assert_eq!(remaining, 150);
    }

    #[test]
    fn test_remaining_accounts_for_offset_and_page() {
        let envelope = envelope(
            r#"{"response": {"numFound": 300, "docs": [
                {"instance_id": "a.nc", "data_node": "dn1.example",
                 "url": ["http://dn1.example/a.nc|application/netcdf|HTTPServer"]},
                {"instance_id": "b.nc", "data_node": "dn1.example",
                 "url": ["http://dn1.example/b.nc|application/netcdf|HTTPServer"]}
            ]}}"#,
        );
        let (records, remaining) = decode_page(envelope, 250).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(remaining, 48);
    }

    #[test]
    fn test_records_without_http_url_are_dropped() {
        let envelope = envelope(
            r#"{"response": {"numFound": 1, "docs": [
                {"instance_id": "a.nc", "data_node": "dn1.example",
                 "url": ["http://dn1.example/a.nc|application/opendap|OPENDAP"]}
            ]}}"#,
        );
        let (records, remaining) = decode_page(envelope, 0).unwrap();

        assert!(records.is_empty());
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_facet_counts_flat_decoding() {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(r#"["dn1.example", 12, "dn2.example", 3]"#).unwrap();
        let counts = decode_facet_counts(&values);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts["dn1.example"], 12);
        assert_eq!(counts["dn2.example"], 3);
    }

    #[test]
    fn test_facet_counts_ignore_malformed_pairs() {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(r#"["dn1.example", 12, "dangling"]"#).unwrap();
        let counts = decode_facet_counts(&values);

        assert_eq!(counts.len(), 1);
        assert_eq!(counts["dn1.example"], 12);
    }
}
