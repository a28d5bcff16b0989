// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! File listing records returned by the search index.
//!
//! The index returns Solr `File` documents in which most scalar fields are
//! packed into one-element arrays and every access URL is a
//! `url|mime-type|service` triple. [`Record`] is the unpacked form the rest
//! of the crate works with.

use serde::Deserialize;

/// Service tag identifying the plain-HTTP access URL among a document's
/// packed `url` entries.
const HTTP_SERVICE: &str = "HTTPServer";

/// One listing entry for a copy of a logical file.
///
/// `instance_id` is stable across every copy of the same file; `data_node`
/// identifies the server hosting this particular copy. Exactly one record
/// per instance carries `replica == false` (the canonical copy, which is
/// authoritative for checksum metadata).
#[derive(Debug, Clone)]
pub struct Record {
    /// Logical-file identifier, stable across all copies.
    pub instance_id: String,
    /// Server hosting this copy.
    pub data_node: String,
    /// Plain-HTTP transfer URL for this copy.
    pub http_url: String,
    /// Whether this record is an alternate-location copy.
    pub replica: bool,
    /// Whether this record is the latest version of the file.
    pub latest: bool,
    /// Whether this record has been retracted by its publisher.
    pub retracted: bool,
    checksum: Option<String>,
    checksum_type: Option<String>,
}

impl Record {
    /// Create a canonical (non-replica, latest, non-retracted) record.
    pub fn new(
        instance_id: impl Into<String>,
        data_node: impl Into<String>,
        http_url: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            data_node: data_node.into(),
            http_url: http_url.into(),
            replica: false,
            latest: true,
            retracted: false,
            checksum: None,
            checksum_type: None,
        }
    }

    /// Attach checksum metadata.
    pub fn with_checksum(mut self, value: impl Into<String>, algorithm: impl Into<String>) -> Self {
        self.checksum = Some(value.into());
        self.checksum_type = Some(algorithm.into());
        self
    }

    /// Expected checksum value, if the index published one.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Algorithm tag for [`Record::checksum`] (e.g. `MD5`, `SHA256`).
    pub fn checksum_type(&self) -> Option<&str> {
        self.checksum_type.as_deref()
    }
}

/// Raw Solr document shape, before unpacking.
#[derive(Debug, Deserialize)]
pub(crate) struct SolrDoc {
    instance_id: String,
    data_node: String,
    #[serde(default)]
    url: Vec<String>,
    #[serde(default)]
    checksum: Vec<String>,
    #[serde(default)]
    checksum_type: Vec<String>,
    #[serde(default)]
    replica: bool,
    #[serde(default)]
    latest: bool,
    #[serde(default)]
    retracted: bool,
}

impl SolrDoc {
    pub(crate) fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Unpack into a [`Record`].
    ///
    /// Returns `None` when the document has no `HTTPServer` access URL;
    /// such records cannot be downloaded by this tool. Missing checksum
    /// metadata is preserved as `None` and handled at verification time.
    pub(crate) fn into_record(self) -> Option<Record> {
        let http_url = self.url.iter().find_map(|entry| http_url(entry))?;
        Some(Record {
            instance_id: self.instance_id,
            data_node: self.data_node,
            http_url,
            replica: self.replica,
            latest: self.latest,
            retracted: self.retracted,
            checksum: self.checksum.into_iter().next(),
            checksum_type: self.checksum_type.into_iter().next(),
        })
    }
}

/// Extract the URL from a `url|mime-type|service` triple when the service
/// is `HTTPServer`.
fn http_url(entry: &str) -> Option<String> {
    let mut parts = entry.split('|');
    let url = parts.next()?;
    let _mime = parts.next()?;
    let service = parts.next()?;
    (service == HTTP_SERVICE).then(|| url.to_string())
}
