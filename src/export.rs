//! Export Module
//!
//! Machine-readable form of scan findings, one record per found or partial
//! certificate, serialized as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::certificate::{FoundCertificate, ParsedCertificates, PartialCertificate};

/// One exported finding
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRecord {
    Found {
        location: String,
        parser: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        not_after: Option<String>,
        fingerprint_sha1: String,
        fingerprint_sha256: String,
    },
    Partial {
        location: String,
        parser: String,
        reason: String,
    },
}

impl From<&FoundCertificate> for ExportRecord {
    fn from(found: &FoundCertificate) -> Self {
        ExportRecord::Found {
            location: found.location.clone(),
            parser: found.parser.clone(),
            subject: found.subject(),
            not_after: found.not_after(),
            fingerprint_sha1: found.sha1_hex(),
            fingerprint_sha256: found.sha256_hex(),
        }
    }
}

impl From<&PartialCertificate> for ExportRecord {
    fn from(partial: &PartialCertificate) -> Self {
        ExportRecord::Partial {
            location: partial.location.clone(),
            parser: partial.parser.clone(),
            reason: partial.reason.clone(),
        }
    }
}

/// Found certificates first, then partials, each in scan order.
pub fn records(parsed: &ParsedCertificates) -> Vec<ExportRecord> {
    parsed
        .found
        .iter()
        .map(ExportRecord::from)
        .chain(parsed.partials.iter().map(ExportRecord::from))
        .collect()
}

/// Serialize scan findings to a pretty-printed JSON array
///
/// # Arguments
/// * `parsed` - Findings from a scan
///
/// # Returns
/// * `Result<String>` - JSON text
///
/// # Example
/// ```no_run
/// use certaudit::{CertificateScanner, ScanContext};
/// use certaudit::export::to_json;
///
/// let image = std::fs::File::open("image.tar")?;
/// let parsed = CertificateScanner::default().find_certificates(&ScanContext::new(), image)?;
/// println!("{}", to_json(&parsed)?);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn to_json(parsed: &ParsedCertificates) -> Result<String> {
    serde_json::to_string_pretty(&records(parsed)).context("Failed to serialize findings to JSON")
}
