// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Concurrent download worker pool.
//!
//! A fixed set of workers consumes jobs from a rendezvous channel: the
//! dispatching side blocks until a worker is free to accept the next job,
//! which is the system's backpressure mechanism. Memory stays O(1) in the
//! number of records no matter how large the result set is.
//!
//! Each worker handles one job at a time and job failures are isolated:
//! a failed fetch, verification, or rename is logged and abandoned, and
//! never aborts the pool or sibling jobs. No job is retried within a run.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use tracing::{debug, error};

use crate::fetch;
use crate::record::Record;
use crate::verify::verify_file;

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Suffix marking an in-flight download.
const PART_SUFFIX: &str = "part";

/// Per-run settings shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory final files land in. Must already exist.
    pub out_dir: PathBuf,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Print transfer URLs instead of touching the network or filesystem.
    pub urls_only: bool,
    /// Log download intent without performing any transfer.
    pub no_download: bool,
    /// Verify checksums of fetched files before finalizing.
    pub verify: bool,
}

/// Fixed-size pool of download workers fed through a rendezvous channel.
pub struct DownloadPool {
    sender: SyncSender<Record>,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadPool {
    /// Spawn the workers and return the dispatching handle.
    pub fn start(options: DownloadOptions) -> Self {
        // Capacity 0 makes every send a synchronous handoff to an idle
        // worker; the discovery loop blocks whenever all workers are busy.
        let (sender, receiver) = mpsc::sync_channel::<Record>(0);
        let receiver = Arc::new(Mutex::new(receiver));
        let options = Arc::new(options);
        let client = fetch::transfer_client();

        let workers = (0..options.workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let options = Arc::clone(&options);
                let client = client.clone();
                thread::Builder::new()
                    .name(format!("download-{}", id))
                    .spawn(move || worker_loop(id, &receiver, &options, &client))
                    .expect("Failed to spawn download worker")
            })
            .collect();

        Self { sender, workers }
    }

    /// Hand one job to the next free worker, blocking until one accepts.
    pub fn dispatch(&self, record: Record) -> Result<()> {
        self.sender
            .send(record)
            .map_err(|err| anyhow!("download workers exited early, dropping {}", err.0.instance_id))
    }

    /// Two-phase shutdown: close the job source, then wait for every
    /// worker to finish its current job and exit.
    pub fn join(self) {
        let Self { sender, workers } = self;
        drop(sender);
        for handle in workers {
            if handle.join().is_err() {
                error!("download worker panicked");
            }
        }
    }
}

/// Pull jobs until the channel closes.
fn worker_loop(
    id: usize,
    receiver: &Mutex<Receiver<Record>>,
    options: &DownloadOptions,
    client: &reqwest::blocking::Client,
) {
    loop {
        let job = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.recv()
        };
        match job {
            Ok(record) => process(id, &record, options, client),
            Err(_) => return,
        }
    }
}

/// Run one job: resume check, fetch, verify, finalize.
fn process(
    worker: usize,
    record: &Record,
    options: &DownloadOptions,
    client: &reqwest::blocking::Client,
) {
    debug!(worker, url = %record.http_url, "download");

    if options.urls_only {
        println!("{}", record.http_url);
        return;
    }
    if options.no_download {
        debug!(worker, instance_id = %record.instance_id, "no download");
        return;
    }

    let final_dest = options.out_dir.join(&record.instance_id);
    let part_dest = options.out_dir.join(format!("{}.{}", record.instance_id, PART_SUFFIX));

    // Already present and correct: nothing to do, no network activity.
    if final_dest.exists()
        && verify_file(&final_dest, record.checksum(), record.checksum_type()).is_ok()
    {
        debug!(worker, path = %final_dest.display(), "already present and verified, no download");
        return;
    }

    if let Err(err) = fetch::fetch(client, &record.http_url, &part_dest) {
        error!(worker, "{:#}", err);
        return;
    }

    if options.verify {
        match verify_file(&part_dest, record.checksum(), record.checksum_type()) {
            Ok(()) => debug!(worker, path = %part_dest.display(), "verified"),
            Err(err) => {
                // The in-flight file stays on disk for manual inspection.
                error!(worker, "{}", err);
                return;
            }
        }
    }

    if let Err(err) = fs::rename(&part_dest, &final_dest) {
        error!(worker, "could not finalize {}: {}", final_dest.display(), err);
        return;
    }
    debug!(worker, path = %final_dest.display(), "removed in-flight suffix");
}
