// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Checksum verification for downloaded files.
//!
//! Digests stream through a fixed buffer, so verification never needs the
//! whole file in memory. A missing checksum/algorithm pair or an
//! unrecognized algorithm tag is a verification failure distinct from a
//! content mismatch; callers treat all of them as "cannot confirm
//! integrity" and fall back to re-downloading.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::Md5;
use sha2::{Digest, Sha256};

/// Read buffer size for streaming digests.
const DIGEST_BUFFER_BYTES: usize = 8192;

/// Checksum algorithms understood by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// 128-bit MD5 digest.
    Md5,
    /// 256-bit SHA-2 digest.
    Sha256,
}

impl Algorithm {
    /// Parse a per-record algorithm tag. Tags are matched
    /// case-insensitively; anything unrecognized is `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("MD5") {
            Some(Self::Md5)
        } else if tag.eq_ignore_ascii_case("SHA256") {
            Some(Self::Sha256)
        } else {
            None
        }
    }
}

/// Why a file failed verification.
#[derive(Debug)]
pub enum ChecksumError {
    /// The record carried no checksum value or no algorithm tag.
    MissingMetadata(PathBuf),
    /// The record's algorithm tag is not one this tool computes.
    UnknownAlgorithm(String),
    /// The computed digest does not match the expected one.
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    /// The file could not be read.
    Io(io::Error),
}

impl fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMetadata(path) => {
                write!(f, "could not retrieve checksum for {}", path.display())
            }
            Self::UnknownAlgorithm(tag) => write!(f, "unrecognized checksum_type: {}", tag),
            Self::Mismatch { path, expected, actual } => write!(
                f,
                "checksum verification failure for {} (expected {}, got {})",
                path.display(),
                expected,
                actual
            ),
            Self::Io(err) => write!(f, "checksum read error: {}", err),
        }
    }
}

impl std::error::Error for ChecksumError {}

impl From<io::Error> for ChecksumError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Verify `path` against a record's checksum metadata.
///
/// Hex digests are compared case-insensitively. When the metadata is absent
/// or the algorithm tag is unrecognized, no digest is computed at all.
pub fn verify_file(
    path: &Path,
    checksum: Option<&str>,
    checksum_type: Option<&str>,
) -> Result<(), ChecksumError> {
    let (expected, tag) = match (checksum, checksum_type) {
        (Some(expected), Some(tag)) if !expected.is_empty() && !tag.is_empty() => (expected, tag),
        _ => return Err(ChecksumError::MissingMetadata(path.to_path_buf())),
    };

    let algorithm =
        Algorithm::parse(tag).ok_or_else(|| ChecksumError::UnknownAlgorithm(tag.to_string()))?;

    let actual = match algorithm {
        Algorithm::Md5 => file_digest::<Md5>(path)?,
        Algorithm::Sha256 => file_digest::<Sha256>(path)?,
    };

    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ChecksumError::Mismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Stream a file through a digest and return the lowercase hex result.
fn file_digest<D: Digest>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = [0u8; DIGEST_BUFFER_BYTES];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_md5_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello world");

        assert!(verify_file(&path, Some(HELLO_MD5), Some("MD5")).is_ok());
    }

    #[test]
    fn test_sha256_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello world");

        assert!(verify_file(&path, Some(HELLO_SHA256), Some("SHA256")).is_ok());
    }

    #[test]
    fn test_altered_content_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello worlx");

        let err = verify_file(&path, Some(HELLO_SHA256), Some("SHA256")).unwrap_err();
        assert!(matches!(err, ChecksumError::Mismatch { .. }));
    }

    #[test]
    fn test_unknown_algorithm_fails_without_comparison() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello world");

        let err = verify_file(&path, Some(HELLO_SHA256), Some("CRC32")).unwrap_err();
        assert!(matches!(err, ChecksumError::UnknownAlgorithm(tag) if tag == "CRC32"));
    }

    #[test]
    fn test_missing_metadata_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello world");

        let err = verify_file(&path, None, None).unwrap_err();
        assert!(matches!(err, ChecksumError::MissingMetadata(_)));

        let err = verify_file(&path, Some(HELLO_MD5), None).unwrap_err();
        assert!(matches!(err, ChecksumError::MissingMetadata(_)));

        let err = verify_file(&path, Some(""), Some("MD5")).unwrap_err();
        assert!(matches!(err, ChecksumError::MissingMetadata(_)));
    }

    #[test]
    fn test_digest_comparison_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.nc", b"hello world");

        let uppercase = HELLO_SHA256.to_ascii_uppercase();
        assert!(verify_file(&path, Some(&uppercase), Some("sha256")).is_ok());
    }

    #[test]
    fn test_algorithm_tag_parsing() {
        assert_eq!(Algorithm::parse("MD5"), Some(Algorithm::Md5));
        assert_eq!(Algorithm::parse("md5"), Some(Algorithm::Md5));
        assert_eq!(Algorithm::parse("SHA256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::parse("SHA-512"), None);
    }
}
