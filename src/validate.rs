//! Policy validation of scanned certificates.
//!
//! A [`Validator`] is compiled once from a [`Config`] into fingerprint lookup
//! sets and can then classify any number of scans, concurrently if needed.
//!
//! # Modes
//!
//! - **Strict**: every found certificate must match an allow or require
//!   entry, otherwise it is reported as not allowed.
//! - **Permissive**: unlisted certificates are tolerated; only forbid and
//!   require entries are checked.
//!
//! Forbid entries are checked in both modes, and independently of the allow
//! check: a certificate on both lists is reported as forbidden.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::certificate::FoundCertificate;
use crate::checksum::{Sha1Digest, Sha256Digest};
use crate::config::{CertificateEntry, Config, Fingerprint, PolicyList};
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Validator {
    permissive_mode: bool,
    allow_sha1: HashSet<Sha1Digest>,
    allow_sha256: HashSet<Sha256Digest>,
    forbid_sha1: HashMap<Sha1Digest, CertificateEntry>,
    forbid_sha256: HashMap<Sha256Digest, CertificateEntry>,
    required: Vec<CertificateEntry>,
}

/// A found certificate matching a forbid entry
#[derive(Debug, Clone)]
pub struct ForbiddenCertificate {
    pub certificate: FoundCertificate,
    pub entry: CertificateEntry,
}

/// Outcome of validating one scan
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Found certificates not on the allow or require list (strict mode only)
    pub not_allowed_certificates: Vec<FoundCertificate>,
    /// Found certificates matching a forbid entry
    pub forbidden_certificates: Vec<ForbiddenCertificate>,
    /// Require entries that matched no found certificate
    pub required_but_absent: Vec<CertificateEntry>,
}

impl ValidationResult {
    /// True when nothing was reported.
    pub fn is_pass(&self) -> bool {
        self.not_allowed_certificates.is_empty()
            && self.forbidden_certificates.is_empty()
            && self.required_but_absent.is_empty()
    }
}

impl Validator {
    /// Compile a policy into a validator
    ///
    /// # Arguments
    /// * `config` - The policy document; not retained
    /// * `permissive_mode` - Tolerate certificates that are not explicitly allowed
    ///
    /// # Returns
    /// * `Result<Validator, ConfigError>` - Fails if the policy is malformed, naming the
    ///   offending list and entry
    pub fn new(config: &Config, permissive_mode: bool) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut validator = Validator {
            permissive_mode,
            allow_sha1: HashSet::new(),
            allow_sha256: HashSet::new(),
            forbid_sha1: HashMap::new(),
            forbid_sha256: HashMap::new(),
            required: config.require.clone(),
        };

        // Required certificates are implicitly allowed
        if !permissive_mode {
            for list in [PolicyList::Allow, PolicyList::Require] {
                for (index, entry) in config.list(list).iter().enumerate() {
                    match compile_entry(list, index, entry)? {
                        Some(Fingerprint::Sha256(digest)) => {
                            validator.allow_sha256.insert(digest);
                        }
                        Some(Fingerprint::Sha1(digest)) => {
                            validator.allow_sha1.insert(digest);
                        }
                        None => {}
                    }
                }
            }
        }

        for (index, entry) in config.forbid.iter().enumerate() {
            match compile_entry(PolicyList::Forbid, index, entry)? {
                Some(Fingerprint::Sha256(digest)) => {
                    validator.forbid_sha256.insert(digest, entry.clone());
                }
                Some(Fingerprint::Sha1(digest)) => {
                    validator.forbid_sha1.insert(digest, entry.clone());
                }
                None => {}
            }
        }

        info!(policy = %validator.describe_config(), "validator ready");
        Ok(validator)
    }

    /// Summary of the compiled policy, e.g.
    /// `2 allowed, 1 forbidden, and 0 required certificates, in strict mode`.
    pub fn describe_config(&self) -> String {
        format!(
            "{} allowed, {} forbidden, and {} required certificates, in {} mode",
            self.allow_sha1.len() + self.allow_sha256.len(),
            self.forbid_sha1.len() + self.forbid_sha256.len(),
            self.required.len(),
            if self.is_permissive() {
                "permissive"
            } else {
                "strict"
            }
        )
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive_mode
    }

    /// Whether either fingerprint is on the allow sets. Always false in
    /// permissive mode, where the allow sets are empty.
    pub fn is_allowed(&self, certificate: &FoundCertificate) -> bool {
        self.allow_sha1.contains(&certificate.fingerprint_sha1)
            || self.allow_sha256.contains(&certificate.fingerprint_sha256)
    }

    /// The forbid entry matching either fingerprint, if any.
    pub fn is_forbidden(&self, certificate: &FoundCertificate) -> Option<&CertificateEntry> {
        self.forbid_sha1
            .get(&certificate.fingerprint_sha1)
            .or_else(|| self.forbid_sha256.get(&certificate.fingerprint_sha256))
    }

    /// Classify found certificates against the policy
    ///
    /// # Arguments
    /// * `found` - Certificates found by a scan
    ///
    /// # Returns
    /// * `Result<ValidationResult, ConfigError>` - Violations; use [`ValidationResult::is_pass`]
    ///   for the verdict. Errors only if a require entry cannot be parsed.
    pub fn validate(&self, found: &[FoundCertificate]) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();
        let mut seen_sha1: HashSet<Sha1Digest> = HashSet::new();
        let mut seen_sha256: HashSet<Sha256Digest> = HashSet::new();

        for certificate in found {
            seen_sha1.insert(certificate.fingerprint_sha1);
            seen_sha256.insert(certificate.fingerprint_sha256);

            if !self.is_permissive() && !self.is_allowed(certificate) {
                result.not_allowed_certificates.push(certificate.clone());
            }

            if let Some(entry) = self.is_forbidden(certificate) {
                result.forbidden_certificates.push(ForbiddenCertificate {
                    certificate: certificate.clone(),
                    entry: entry.clone(),
                });
            }
        }

        for (index, required) in self.required.iter().enumerate() {
            let present = match compile_entry(PolicyList::Require, index, required)? {
                Some(Fingerprint::Sha256(digest)) => seen_sha256.contains(&digest),
                Some(Fingerprint::Sha1(digest)) => seen_sha1.contains(&digest),
                None => true,
            };
            if !present {
                result.required_but_absent.push(required.clone());
            }
        }

        Ok(result)
    }
}

fn compile_entry(
    list: PolicyList,
    index: usize,
    entry: &CertificateEntry,
) -> Result<Option<Fingerprint>, ConfigError> {
    entry
        .fingerprint()
        .map_err(|source| ConfigError::InvalidFingerprint {
            list,
            index,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;

    /// A finding with synthetic fingerprints derived from `seed`
    fn found(seed: u8) -> FoundCertificate {
        FoundCertificate {
            location: format!("/etc/ssl/{}.pem", seed),
            parser: "pem".to_string(),
            certificate: None,
            fingerprint_sha1: [seed; checksum::SHA1_LEN],
            fingerprint_sha256: [seed; checksum::SHA256_LEN],
        }
    }

    fn sha1_entry(seed: u8) -> CertificateEntry {
        CertificateEntry::from_sha1(checksum::encode(&[seed; checksum::SHA1_LEN]))
    }

    fn sha256_entry(seed: u8) -> CertificateEntry {
        CertificateEntry::from_sha256(checksum::encode(&[seed; checksum::SHA256_LEN]))
    }

    #[test]
    fn test_empty_policy_strict_rejects_everything() {
        let validator = Validator::new(&Config::default(), false).unwrap();
        let result = validator.validate(&[found(1), found(2)]).unwrap();

        assert_eq!(result.not_allowed_certificates.len(), 2);
        assert!(!result.is_pass());
    }

    #[test]
    fn test_empty_policy_permissive_passes() {
        let validator = Validator::new(&Config::default(), true).unwrap();
        let result = validator.validate(&[found(1), found(2)]).unwrap();

        assert!(result.is_pass());
        assert!(validator.is_permissive());
    }

    #[test]
    fn test_no_findings_passes() {
        let validator = Validator::new(&Config::default(), false).unwrap();
        assert!(validator.validate(&[]).unwrap().is_pass());
    }

    #[test]
    fn test_allowed_by_either_scheme() {
        let config = Config {
            allow: vec![sha1_entry(1), sha256_entry(2)],
            ..Config::default()
        };
        let validator = Validator::new(&config, false).unwrap();
        let result = validator.validate(&[found(1), found(2), found(3)]).unwrap();

        assert_eq!(result.not_allowed_certificates.len(), 1);
        assert_eq!(
            result.not_allowed_certificates[0].fingerprint_sha1,
            [3; checksum::SHA1_LEN]
        );
    }

    #[test]
    fn test_required_certificates_are_allowed_in_strict_mode() {
        let config = Config {
            require: vec![sha256_entry(4)],
            ..Config::default()
        };
        let validator = Validator::new(&config, false).unwrap();
        let result = validator.validate(&[found(4)]).unwrap();

        assert!(result.is_pass());
    }

    #[test]
    fn test_permissive_never_reports_not_allowed() {
        let config = Config {
            allow: vec![sha1_entry(1)],
            ..Config::default()
        };
        let validator = Validator::new(&config, true).unwrap();
        let result = validator.validate(&[found(1), found(9)]).unwrap();

        assert!(result.not_allowed_certificates.is_empty());
        assert!(!validator.is_allowed(&found(1)));
    }

    #[test]
    fn test_forbidden_in_both_modes_with_entry() {
        let entry = sha256_entry(5).with_comment("revoked intermediate");
        let config = Config {
            forbid: vec![entry.clone()],
            ..Config::default()
        };

        for permissive in [false, true] {
            let validator = Validator::new(&config, permissive).unwrap();
            let result = validator.validate(&[found(5), found(6)]).unwrap();

            assert_eq!(result.forbidden_certificates.len(), 1);
            let forbidden = &result.forbidden_certificates[0];
            assert_eq!(forbidden.entry, entry);
            assert_eq!(forbidden.certificate.location, "/etc/ssl/5.pem");
            assert!(!result.is_pass());
        }
    }

    #[test]
    fn test_forbidden_and_allowed_are_independent() {
        let config = Config {
            allow: vec![sha1_entry(7)],
            forbid: vec![sha256_entry(7)],
            ..Config::default()
        };
        let validator = Validator::new(&config, false).unwrap();
        let result = validator.validate(&[found(7)]).unwrap();

        assert!(result.not_allowed_certificates.is_empty());
        assert_eq!(result.forbidden_certificates.len(), 1);
    }

    #[test]
    fn test_forbidden_by_sha1() {
        let config = Config {
            forbid: vec![sha1_entry(8)],
            ..Config::default()
        };
        let validator = Validator::new(&config, true).unwrap();

        assert_eq!(validator.is_forbidden(&found(8)), Some(&config.forbid[0]));
        assert_eq!(validator.is_forbidden(&found(9)), None);
    }

    #[test]
    fn test_required_but_absent() {
        let config = Config {
            require: vec![sha1_entry(1), sha256_entry(2), sha1_entry(3)],
            ..Config::default()
        };
        let validator = Validator::new(&config, true).unwrap();
        let result = validator.validate(&[found(2)]).unwrap();

        assert_eq!(result.required_but_absent, vec![sha1_entry(1), sha1_entry(3)]);
        assert!(!result.is_pass());
    }

    #[test]
    fn test_required_sha1_only_matches_sha1() {
        // A SHA-1 entry whose bytes happen to equal the prefix of a SHA-256
        // fingerprint must not be satisfied by it.
        let mut certificate = found(1);
        certificate.fingerprint_sha1 = [0xee; checksum::SHA1_LEN];
        let config = Config {
            require: vec![sha1_entry(1)],
            ..Config::default()
        };
        let validator = Validator::new(&config, true).unwrap();
        let result = validator.validate(&[certificate]).unwrap();

        assert_eq!(result.required_but_absent.len(), 1);
    }

    #[test]
    fn test_sha256_is_authoritative_when_both_given() {
        let entry = CertificateEntry {
            fingerprints: crate::config::CertificateFingerprints {
                sha1: Some(checksum::encode(&[1; checksum::SHA1_LEN])),
                sha256: Some(checksum::encode(&[2; checksum::SHA256_LEN])),
            },
            comment: None,
        };
        let config = Config {
            allow: vec![entry],
            ..Config::default()
        };
        let validator = Validator::new(&config, false).unwrap();

        // SHA-1 from the same entry is not indexed
        assert!(!validator.is_allowed(&found(1)));
        assert!(validator.is_allowed(&found(2)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            forbid: vec![sha1_entry(1), CertificateEntry::from_sha1("not-hex")],
            ..Config::default()
        };

        match Validator::new(&config, false).unwrap_err() {
            ConfigError::InvalidFingerprint { list, index, .. } => {
                assert_eq!(list, PolicyList::Forbid);
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_describe_config() {
        let config = Config {
            allow: vec![sha1_entry(1), sha256_entry(2)],
            forbid: vec![sha256_entry(3)],
            require: vec![sha1_entry(4)],
        };

        let strict = Validator::new(&config, false).unwrap();
        assert_eq!(
            strict.describe_config(),
            "3 allowed, 1 forbidden, and 1 required certificates, in strict mode"
        );

        let permissive = Validator::new(&config, true).unwrap();
        assert_eq!(
            permissive.describe_config(),
            "0 allowed, 1 forbidden, and 1 required certificates, in permissive mode"
        );
    }

    #[test]
    fn test_is_pass_requires_all_lists_empty() {
        let mut result = ValidationResult::default();
        assert!(result.is_pass());

        result.required_but_absent.push(sha1_entry(1));
        assert!(!result.is_pass());

        let mut result = ValidationResult::default();
        result.not_allowed_certificates.push(found(1));
        assert!(!result.is_pass());

        let mut result = ValidationResult::default();
        result.forbidden_certificates.push(ForbiddenCertificate {
            certificate: found(1),
            entry: sha1_entry(1),
        });
        assert!(!result.is_pass());
    }
}
