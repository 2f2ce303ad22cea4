//! certaudit - Certificate Authority Audit for Container Images
//!
//! Scans a container image's flattened filesystem for X.509 certificates and
//! validates the certificate authorities it finds against a declared policy.
//! Meant for build and release pipelines that need to assert no unexpected
//! CAs are baked into an image, and that mandated ones are present.
//!
//! # Overview
//!
//! ```text
//! image.tar ──► CertificateScanner ──► ParsedCertificates { found, partials }
//!                                              │
//!              Config (YAML) ──► Validator ────┴──► ValidationResult ──► is_pass()
//! ```
//!
//! The scanner knows nothing about policy; the validator only consumes the
//! scanner's [`FoundCertificate`]s.
//!
//! # Module Overview
//!
//! ## [`scanner`]
//!
//! Streams a TAR archive entry by entry and runs every registered
//! [`CertificateParser`] against each regular file concurrently. Large entries
//! are spooled to a temporary file by [`spool`].
//!
//! ```no_run
//! use certaudit::{CertificateScanner, ScanContext};
//!
//! let image = std::fs::File::open("image.tar")?;
//! let parsed = CertificateScanner::default().find_certificates(&ScanContext::new(), image)?;
//! for found in &parsed.found {
//!     println!("{} {}", found.location, found.sha256_hex());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## [`validate`]
//!
//! Compiles a [`Config`] into fingerprint lookup sets and classifies findings
//! as not allowed, forbidden, or required but absent.
//!
//! ```no_run
//! use certaudit::{CertificateScanner, Config, ScanContext, Validator};
//!
//! let config = Config::from_file(".certaudit.yaml")?;
//! let validator = Validator::new(&config, false)?;
//!
//! let image = std::fs::File::open("image.tar")?;
//! let parsed = CertificateScanner::default().find_certificates(&ScanContext::new(), image)?;
//!
//! let result = validator.validate(&parsed.found)?;
//! if !result.is_pass() {
//!     eprintln!("{} forbidden certificates", result.forbidden_certificates.len());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Every mechanical failure (bad policy, corrupt archive, spool I/O, parser
//! failure) is an error; policy violations are data in
//! [`ValidationResult`]. A failed scan is never a pass.

pub mod certificate;
pub mod checksum;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod parser;
pub mod pem_parser;
pub mod scanner;
pub mod spool;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use certificate::{FoundCertificate, ParsedCertificates, PartialCertificate};
pub use config::{CertificateEntry, CertificateFingerprints, Config, PolicyList};
pub use context::ScanContext;
pub use error::{ChecksumError, ConfigError, ScanError, SpoolError};
pub use parser::CertificateParser;
pub use pem_parser::PemParser;
pub use scanner::CertificateScanner;
pub use spool::{EntryBuffer, SpoolConfig};
pub use validate::{ForbiddenCertificate, ValidationResult, Validator};
