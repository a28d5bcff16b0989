// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Replica resolution: pick exactly one copy per logical file.
//!
//! When a data-node priority list is configured, the original records are
//! buffered instead of dispatched, replica records from the priority nodes
//! are merged in, and each instance's winner is the first priority node
//! that actually hosts a copy. Buffering is O(number of distinct logical
//! files in the result set), the documented scaling limit of this mode.
//!
//! Before any of that happens, [`actionable_nodes`] checks whether the
//! priority list even matters for the current result set: if none of the
//! preferred nodes serves replicas of it, the whole replica pass is
//! skipped and originals are dispatched as-is.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use crate::criteria::Criteria;
use crate::record::Record;
use crate::search::SearchClient;

/// Priority nodes that actually serve replicas of the current result set.
///
/// Queries the replica-side `data_node` facet and intersects it with the
/// configured priority list. An empty result disables soft preference for
/// the run. The returned nodes keep their priority order.
pub fn actionable_nodes(client: &SearchClient, criteria: &Criteria) -> Result<Vec<String>> {
    let serving = client.facet(&criteria.with_replica(true), "data_node")?;
    Ok(intersect_priority(&criteria.data_node_priority, &serving))
}

fn intersect_priority(priority: &[String], serving: &HashMap<String, u64>) -> Vec<String> {
    priority
        .iter()
        .filter(|node| serving.contains_key(node.as_str()))
        .cloned()
        .collect()
}

/// Buffers every copy of every eligible instance, then resolves one winner
/// per instance.
pub struct ReplicaResolver {
    priority: Vec<String>,
    // instance id -> (data node -> record). The inner BTreeMap makes the
    // no-priority-match fallback deterministic: the lexicographically
    // smallest data node wins.
    buffered: HashMap<String, BTreeMap<String, Record>>,
}

impl ReplicaResolver {
    pub fn new(priority: &[String]) -> Self {
        Self {
            priority: priority.to_vec(),
            buffered: HashMap::new(),
        }
    }

    /// Buffer a canonical record. Every instance seen here is eligible for
    /// exactly one dispatch after resolution.
    pub fn buffer_original(&mut self, record: Record) {
        self.buffered
            .entry(record.instance_id.clone())
            .or_default()
            .insert(record.data_node.clone(), record);
    }

    /// Merge a replica record into an already-buffered instance.
    ///
    /// Replicas of instances that never appeared among the originals are
    /// discarded: an instance must have a canonical copy to be eligible.
    pub fn merge_replica(&mut self, record: Record) {
        if let Some(copies) = self.buffered.get_mut(&record.instance_id) {
            copies.insert(record.data_node.clone(), record);
        }
    }

    /// Number of distinct instances buffered so far.
    pub fn instances(&self) -> usize {
        self.buffered.len()
    }

    /// Resolve one record per instance.
    ///
    /// The first priority node hosting a copy wins; with no priority match
    /// the copy on the lexicographically smallest data node is used.
    pub fn resolve(self) -> Vec<Record> {
        let priority = self.priority;
        self.buffered
            .into_values()
            .filter_map(|mut copies| {
                for node in &priority {
                    if let Some(record) = copies.remove(node) {
                        return Some(record);
                    }
                }
                copies.into_iter().next().map(|(_, record)| record)
            })
            .collect()
    }
}
