//! Policy document.
//!
//! ```yaml
//! allow:
//!   - fingerprints:
//!       sha256: "96bcec06264976f37460779acf28c5a7cfe8a3c0aae11a8ffcee05c0bddf08c6"
//!     comment: "ISRG Root X1"
//! forbid:
//!   - fingerprints:
//!       sha1: "cabd2a79a1076a31f21d253635cb039d4329a5e8"
//! require: []
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checksum::{self, Sha1Digest, Sha256Digest};
use crate::error::{ChecksumError, ConfigError};

/// Policy file looked up when no path is given
pub const DEFAULT_CONFIG_PATH: &str = ".certaudit.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub allow: Vec<CertificateEntry>,
    #[serde(default)]
    pub forbid: Vec<CertificateEntry>,
    #[serde(default)]
    pub require: Vec<CertificateEntry>,
}

/// One line of a policy list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertificateEntry {
    #[serde(default)]
    pub fingerprints: CertificateFingerprints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Hex fingerprints identifying a policy entry. When both are given,
/// SHA-256 is authoritative and SHA-1 is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertificateFingerprints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// A parsed fingerprint of one of the supported schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Sha1(Sha1Digest),
    Sha256(Sha256Digest),
}

/// The three lists of a policy document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyList {
    Allow,
    Forbid,
    Require,
}

impl fmt::Display for PolicyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyList::Allow => "allow",
            PolicyList::Forbid => "forbid",
            PolicyList::Require => "require",
        };
        f.write_str(name)
    }
}

impl CertificateFingerprints {
    /// SHA-1 fingerprint, treating an empty string as absent
    pub fn sha1(&self) -> Option<&str> {
        self.sha1.as_deref().filter(|s| !s.is_empty())
    }

    /// SHA-256 fingerprint, treating an empty string as absent
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.sha1().is_none() && self.sha256().is_none()
    }
}

impl CertificateEntry {
    pub fn from_sha1(sha1: impl Into<String>) -> Self {
        Self {
            fingerprints: CertificateFingerprints {
                sha1: Some(sha1.into()),
                sha256: None,
            },
            comment: None,
        }
    }

    pub fn from_sha256(sha256: impl Into<String>) -> Self {
        Self {
            fingerprints: CertificateFingerprints {
                sha1: None,
                sha256: Some(sha256.into()),
            },
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The fingerprint this entry is keyed by: SHA-256 if present, else SHA-1.
    /// `None` if the entry has no fingerprint at all.
    pub fn fingerprint(&self) -> Result<Option<Fingerprint>, ChecksumError> {
        if let Some(sha256) = self.fingerprints.sha256() {
            return checksum::parse_sha256(sha256).map(|d| Some(Fingerprint::Sha256(d)));
        }
        if let Some(sha1) = self.fingerprints.sha1() {
            return checksum::parse_sha1(sha1).map(|d| Some(Fingerprint::Sha1(d)));
        }
        Ok(None)
    }
}

impl Config {
    /// Load a policy document from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&config_str)
    }

    /// Parse a policy document from YAML text. An empty document is an empty policy.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        if s.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn list(&self, list: PolicyList) -> &[CertificateEntry] {
        match list {
            PolicyList::Allow => &self.allow,
            PolicyList::Forbid => &self.forbid,
            PolicyList::Require => &self.require,
        }
    }

    /// Check the document is well-formed
    ///
    /// Every entry needs a fingerprint that parses, and no certificate may be
    /// both required and forbidden.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut required: HashMap<Fingerprint, usize> = HashMap::new();
        let mut forbidden: Vec<(usize, Fingerprint)> = Vec::new();

        for list in [PolicyList::Allow, PolicyList::Forbid, PolicyList::Require] {
            for (index, entry) in self.list(list).iter().enumerate() {
                let fingerprint = entry
                    .fingerprint()
                    .map_err(|source| ConfigError::InvalidFingerprint {
                        list,
                        index,
                        source,
                    })?
                    .ok_or(ConfigError::MissingFingerprint { list, index })?;

                match list {
                    PolicyList::Require => {
                        required.entry(fingerprint).or_insert(index);
                    }
                    PolicyList::Forbid => forbidden.push((index, fingerprint)),
                    PolicyList::Allow => {}
                }
            }
        }

        for (forbid_index, fingerprint) in forbidden {
            if let Some(&require_index) = required.get(&fingerprint) {
                return Err(ConfigError::RequiredAndForbidden {
                    require_index,
                    forbid_index,
                });
            }
        }

        Ok(())
    }
}
