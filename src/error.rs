//! Error types shared across the scanner and the validator.
//!
//! Configuration, archive, and resource failures are fatal and carry enough
//! context (policy list, entry index, image path) for an operator to act on
//! them. Policy violations are never errors; see [`crate::validate::ValidationResult`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::certificate::ParsedCertificates;
use crate::config::PolicyList;

/// Failure to parse a hex-encoded fingerprint.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChecksumError {
    #[error("invalid {algorithm} checksum length: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {algorithm} checksum: {source}")]
    InvalidHex {
        algorithm: &'static str,
        #[source]
        source: hex::FromHexError,
    },
}

/// Malformed or contradictory policy documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse policy document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("entry at position {index} in {list} list has no fingerprint")]
    MissingFingerprint { list: PolicyList, index: usize },

    #[error("entry at position {index} in {list} list had an invalid fingerprint: {source}")]
    InvalidFingerprint {
        list: PolicyList,
        index: usize,
        #[source]
        source: ChecksumError,
    },

    #[error(
        "entry at position {require_index} in require list is also forbidden by entry at position {forbid_index}"
    )]
    RequiredAndForbidden {
        require_index: usize,
        forbid_index: usize,
    },
}

/// Failure to buffer an archive entry for the parsers.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("failed to read image file: {0}")]
    Read(#[source] io::Error),

    #[error("failed to create temporary file: {0}")]
    Create(#[source] io::Error),

    #[error("failed to write image file to temporary file: {0}")]
    Write(#[source] io::Error),
}

/// Fatal scan outcomes. Any of these means the scan is incomplete and must
/// not be reported as a pass.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("failed to read image archive: {0}")]
    Archive(#[source] io::Error),

    #[error("failed to buffer {location}: {source}")]
    Spool {
        location: String,
        #[source]
        source: SpoolError,
    },

    #[error("parser error finding certificates: {message}")]
    Parser {
        message: String,
        parsed: Box<ParsedCertificates>,
    },
}

impl ScanError {
    /// Results accumulated before the scan was aborted, when the failure
    /// kept them around for diagnostics.
    pub fn partial_results(&self) -> Option<&ParsedCertificates> {
        match self {
            ScanError::Parser { parsed, .. } => Some(parsed),
            _ => None,
        }
    }
}
