// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Raw file transfer primitive.
//!
//! All-or-nothing: a fetch either writes the complete body to the
//! destination path or fails; there is no partial/byte-range resume, so a
//! failed fetch is simply retried in full on a later run.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Timeout for establishing a connection to a data node.
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Build the HTTP client used for file transfers.
///
/// Only the connection attempt is bounded; the body read has no deadline,
/// since transfer times vary by orders of magnitude with file size.
pub fn transfer_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .timeout(None)
        .build()
        .expect("Failed to create HTTP client")
}

/// Fetch `url` into `dest`, streaming the body to disk.
pub fn fetch(client: &reqwest::blocking::Client, url: &str, dest: &Path) -> Result<()> {
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("download request for {} failed", url))?;

    if !response.status().is_success() {
        bail!("download of {} failed: HTTP {}", url, response.status());
    }

    let mut file =
        File::create(dest).with_context(|| format!("could not create {}", dest.display()))?;
    io::copy(&mut response, &mut file)
        .with_context(|| format!("could not write {}", dest.display()))?;

    Ok(())
}
