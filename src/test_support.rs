//! Certificate and archive fixtures for unit tests.
//!
//! Certificates are self-signed CAs minted at test time, so every test run
//! works with fresh fingerprints.

use anyhow::{anyhow, Result};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::X509;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const RSA_KEY_SIZE: u32 = 2048;

/// Builder for self-signed CA certificates used as scan fixtures
pub(crate) struct TestCertificateBuilder {
    subject_common_name: String,
    organization: Option<String>,
    validity_days: u32,
}

impl TestCertificateBuilder {
    pub(crate) fn new() -> Self {
        Self {
            subject_common_name: "Test Root CA".to_string(),
            organization: None,
            validity_days: 365,
        }
    }

    pub(crate) fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    pub(crate) fn organization(mut self, organization: String) -> Self {
        self.organization = Some(organization);
        self
    }

    pub(crate) fn build(self) -> Result<X509> {
        let rsa = Rsa::generate(RSA_KEY_SIZE)
            .map_err(|e| anyhow!("Failed to generate RSA key: {}", e))?;
        let private_key = PKey::from_rsa(rsa)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;

        let mut serial = BigNum::new()?;
        serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;

        let mut name_builder = openssl::x509::X509Name::builder()?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;
        if let Some(organization) = &self.organization {
            name_builder
                .append_entry_by_nid(openssl::nid::Nid::ORGANIZATIONNAME, organization)
                .map_err(|e| anyhow!("Failed to set organization: {}", e))?;
        }
        let name = name_builder.build();
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;

        let not_before = openssl::asn1::Asn1Time::days_from_now(0)?;
        let not_after = openssl::asn1::Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.set_pubkey(&private_key)?;

        let mut bc = BasicConstraints::new();
        bc.critical().ca();
        builder.append_extension(bc.build()?)?;

        let mut ku = KeyUsage::new();
        ku.critical().key_cert_sign().crl_sign();
        builder.append_extension(ku.build()?)?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;
        Ok(builder.build())
    }
}

/// Build an uncompressed tar archive holding regular files.
pub(crate) fn tar_with_files(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *data)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar archive")
}
