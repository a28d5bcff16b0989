// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Read-only report commands built on the search client.
//!
//! All output is sorted and deduplicated so runs are comparable; none of
//! these commands touches the filesystem or the worker pool.

use anyhow::Result;

use crate::criteria::Criteria;
use crate::search::SearchClient;

/// Fields `--values.for` refuses to enumerate: system/protocol fields and
/// per-record identifiers whose value sets are as large as the index.
const VALUES_FOR_BLACKLIST: &[&str] = &[
    "_timestamp",
    "timestamp",
    "id",
    "dataset_id",
    "master_id",
    "version",
    "citation_url",
    "data_specs_version",
    "datetime_start",
    "datetime_stop",
    "east_degrees",
    "west_degrees",
    "north_degrees",
    "geo",
    "height_bottom",
    "height_top",
    "instance_id",
    "number_of_aggregations",
    "number_of_files",
    "pid",
    "size",
    "south_degrees",
    "url",
    "title",
    "xlink",
    "_version_",
];

/// Print the field keys visible on a sample matching record.
///
/// The list may be incomplete: only fields present on the sampled record
/// are reported. Underscore-prefixed internal keys are suppressed.
pub fn field_keys(client: &SearchClient, criteria: &Criteria) -> Result<()> {
    let Some(mut keys) = client.field_keys(criteria)? else {
        println!("no records match the search criteria, unable to determine fields");
        return Ok(());
    };
    keys.sort();

    println!("criteria: ");
    print!("{}", criteria);
    println!("field keys: ");
    for key in keys.iter().filter(|key| !key.starts_with('_')) {
        println!("  {}", key);
    }
    println!();
    Ok(())
}

/// Print the data nodes serving the matching files, first counting each
/// logical file once (canonical copies only), then including replication.
pub fn data_nodes(client: &SearchClient, criteria: &Criteria) -> Result<()> {
    let total = client.count(criteria)?;
    if total == 0 {
        println!("no records match search criteria");
        return Ok(());
    }

    let canonical = client.facet(&criteria.with_replica(false), "data_node")?;
    println!("excluding replication:");
    if canonical.is_empty() {
        println!(
            "an original data node is required for download from any data nodes and no original data node was found"
        );
        return Ok(());
    }
    for node in sorted(canonical.into_keys()) {
        println!("{}", node);
    }
    println!();

    let with_replicas = client.facet(criteria, "data_node")?;
    println!("including replication:");
    for node in sorted(with_replicas.into_keys()) {
        println!("{}", node);
    }
    Ok(())
}

/// Print the distinct values of `field` within the matching canonical
/// records.
pub fn values_for(client: &SearchClient, criteria: &Criteria, field: &str) -> Result<()> {
    if let Err(message) = validate_values_field(field) {
        println!("{}", message);
        return Ok(());
    }

    let canonical = criteria.with_replica(false);
    let total = client.count(&canonical)?;
    if total == 0 {
        println!("no records match search criteria");
        return Ok(());
    }

    let counts = client.facet(&canonical, field)?;
    for value in sorted(counts.into_keys()) {
        println!("{}", value);
    }
    Ok(())
}

/// Reject wildcard and blacklisted `--values.for` input before any query
/// is issued.
fn validate_values_field(field: &str) -> Result<(), String> {
    if field.contains('*') {
        return Err("the values for field may not contain '*'".to_string());
    }
    if VALUES_FOR_BLACKLIST.contains(&field) {
        return Err(format!(
            "'{}' is not an allowed field to search for values for",
            field
        ));
    }
    Ok(())
}

fn sorted(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut values: Vec<String> = values.collect();
    values.sort();
    values
}
