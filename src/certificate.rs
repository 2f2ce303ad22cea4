//! Certificate findings produced by the scanner.

use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::x509::X509;

use crate::checksum::{self, Sha1Digest, Sha256Digest};

/// A single X.509 certificate found by a parser inside an image.
///
/// Two findings with the same SHA-256 fingerprint denote the same certificate
/// authority, wherever in the image they were found.
#[derive(Debug, Clone)]
pub struct FoundCertificate {
    /// Absolute path inside the image where the certificate was found
    pub location: String,
    /// Name of the parser that found it
    pub parser: String,
    /// Decoded certificate. `None` when a parser matched the bytes but could
    /// not decode them.
    pub certificate: Option<X509>,
    /// SHA-1 over the DER encoding
    pub fingerprint_sha1: Sha1Digest,
    /// SHA-256 over the DER encoding
    pub fingerprint_sha256: Sha256Digest,
}

impl FoundCertificate {
    /// Build a finding from a decoded certificate, fingerprinting its DER
    /// encoding.
    pub fn from_x509(
        location: impl Into<String>,
        parser: impl Into<String>,
        certificate: X509,
    ) -> Result<Self, ErrorStack> {
        let sha1 = certificate.digest(MessageDigest::sha1())?;
        let sha256 = certificate.digest(MessageDigest::sha256())?;

        let mut fingerprint_sha1 = [0u8; checksum::SHA1_LEN];
        fingerprint_sha1.copy_from_slice(&sha1);
        let mut fingerprint_sha256 = [0u8; checksum::SHA256_LEN];
        fingerprint_sha256.copy_from_slice(&sha256);

        Ok(Self {
            location: location.into(),
            parser: parser.into(),
            certificate: Some(certificate),
            fingerprint_sha1,
            fingerprint_sha256,
        })
    }

    pub fn sha1_hex(&self) -> String {
        checksum::encode(&self.fingerprint_sha1)
    }

    pub fn sha256_hex(&self) -> String {
        checksum::encode(&self.fingerprint_sha256)
    }

    /// Subject distinguished name, e.g. `CN=Example Root CA, O=Example`.
    pub fn subject(&self) -> Option<String> {
        let certificate = self.certificate.as_ref()?;
        let parts: Vec<String> = certificate
            .subject_name()
            .entries()
            .map(|entry| {
                let key = entry.object().nid().short_name().unwrap_or("?");
                let value = std::str::from_utf8(entry.data().as_slice())
                    .map(str::to_owned)
                    .unwrap_or_else(|_| "InvalidUTF8".to_string());
                format!("{}={}", key, value)
            })
            .collect();
        Some(parts.join(", "))
    }

    /// Expiry as printed by OpenSSL, e.g. `Jan  1 00:00:00 2030 GMT`.
    pub fn not_after(&self) -> Option<String> {
        self.certificate
            .as_ref()
            .map(|certificate| certificate.not_after().to_string())
    }
}

/// Something that looks like a certificate but is not a valid one, or
/// another parser-level anomaly. Kept for diagnostics only; never validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialCertificate {
    pub location: String,
    pub parser: String,
    /// Human-readable explanation of why this is only a partial
    pub reason: String,
}

/// Accumulated parser output.
#[derive(Debug, Clone, Default)]
pub struct ParsedCertificates {
    pub found: Vec<FoundCertificate>,
    pub partials: Vec<PartialCertificate>,
}

impl ParsedCertificates {
    /// Append another parser's results after this one's.
    pub fn merge(&mut self, other: ParsedCertificates) {
        self.found.extend(other.found);
        self.partials.extend(other.partials);
    }

    pub fn len(&self) -> usize {
        self.found.len() + self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty() && self.partials.is_empty()
    }
}
