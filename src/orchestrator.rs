// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Drives a download run end to end.
//!
//! Counts the canonical records, applies the large-batch guard, then
//! paginates the result set into the worker pool. With an actionable
//! data-node preference the records are routed through the
//! [`ReplicaResolver`](crate::resolver::ReplicaResolver) instead of being
//! dispatched directly.
//!
//! Discovery is sequential and errors from the index are fatal to the run;
//! the pool is still drained cleanly before the error propagates.

use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::criteria::Criteria;
use crate::pool::{DownloadOptions, DownloadPool};
use crate::record::Record;
use crate::resolver::{self, ReplicaResolver};
use crate::search::SearchClient;

/// Batches larger than this require explicit confirmation (`-y`).
pub const MAX_UNCONFIRMED_FILES: u64 = 100;

/// Discovery page size.
const PAGE_LIMIT: u64 = 250;

/// Settings for one download run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory downloads land in. Must already exist.
    pub out_dir: PathBuf,
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Print transfer URLs only; no downloads, no count banner.
    pub urls_only: bool,
    /// Log download intent without transferring anything.
    pub no_download: bool,
    /// Skip checksum verification of fetched files.
    pub no_verify: bool,
    /// Confirmation for batches above [`MAX_UNCONFIRMED_FILES`].
    pub confirm: bool,
    /// Report the matching count and stop.
    pub count_only: bool,
}

/// Execute a download run for the given criteria.
pub fn run(client: &SearchClient, criteria: &Criteria, options: &RunOptions) -> Result<()> {
    // Check whether the preference list matters for this result set before
    // paying for the buffering mode.
    let preferred_nodes = if criteria.has_priority() {
        let nodes = resolver::actionable_nodes(client, criteria)?;
        debug!(matching = ?nodes, "data nodes serving replicas of the result set");
        nodes
    } else {
        Vec::new()
    };

    // Only instances with a canonical copy in the index are downloaded.
    let originals = criteria.with_replica(false);
    let total = client.count(&originals)?;
    if !options.urls_only {
        println!("found {} files for download", total);
    }
    if options.count_only || total == 0 {
        return Ok(());
    }
    if needs_confirmation(total, options.confirm) {
        println!(
            "too many files ({} > {}): confirm larger download by specifying the -y option or refine search criteria",
            total, MAX_UNCONFIRMED_FILES
        );
        return Ok(());
    }

    let pool = DownloadPool::start(DownloadOptions {
        out_dir: options.out_dir.clone(),
        workers: options.workers,
        urls_only: options.urls_only,
        no_download: options.no_download,
        verify: !options.no_verify,
    });

    // Drain the pool even when discovery fails partway through.
    let outcome = dispatch_all(client, criteria, &originals, &preferred_nodes, &pool);
    pool.join();
    outcome
}

/// Feed every eligible record to the pool, directly or via the resolver.
fn dispatch_all(
    client: &SearchClient,
    criteria: &Criteria,
    originals: &Criteria,
    preferred_nodes: &[String],
    pool: &DownloadPool,
) -> Result<()> {
    if preferred_nodes.is_empty() {
        // No actionable preference: every canonical record is downloaded
        // as-is, one synchronous handoff at a time.
        return paginate(client, originals, |record| pool.dispatch(record));
    }

    let mut resolver = ReplicaResolver::new(&criteria.data_node_priority);
    paginate(client, originals, |record| {
        resolver.buffer_original(record);
        Ok(())
    })?;

    let replicas = criteria.with_replica(true).with_data_nodes(preferred_nodes);
    paginate(client, &replicas, |record| {
        resolver.merge_replica(record);
        Ok(())
    })?;

    let winners = resolver.resolve();
    debug!("{} downloads submitted", winners.len());
    for record in winners {
        pool.dispatch(record)?;
    }
    Ok(())
}

/// Walk the result set page by page until the index reports nothing left.
fn paginate<F>(client: &SearchClient, criteria: &Criteria, mut handle: F) -> Result<()>
where
    F: FnMut(Record) -> Result<()>,
{
    let mut offset = 0;
    loop {
        let (records, remaining) = client.page(criteria, offset, PAGE_LIMIT)?;
        for record in records {
            handle(record)?;
        }
        if remaining == 0 {
            return Ok(());
        }
        offset += PAGE_LIMIT;
    }
}

/// The large-batch guard: a safety policy, not an error.
fn needs_confirmation(total: u64, confirmed: bool) -> bool {
    !confirmed && total > MAX_UNCONFIRMED_FILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_blocks_large_unconfirmed_batches() {
        assert!(needs_confirmation(150, false));
        assert!(needs_confirmation(MAX_UNCONFIRMED_FILES + 1, false));
    }

    #[test]
    fn test_guard_allows_confirmed_or_small_batches() {
        assert!(!needs_confirmation(150, true));
        assert!(!needs_confirmation(MAX_UNCONFIRMED_FILES, false));
        assert!(!needs_confirmation(1, false));
    }
}
