//! Fingerprint string parsing.
//!
//! Fingerprints are exchanged as case-insensitive hex strings of an exact
//! length: 40 characters for SHA-1 and 64 for SHA-256.

use crate::error::ChecksumError;

/// Length in bytes of a SHA-1 digest
pub const SHA1_LEN: usize = 20;
/// Length in bytes of a SHA-256 digest
pub const SHA256_LEN: usize = 32;

pub type Sha1Digest = [u8; SHA1_LEN];
pub type Sha256Digest = [u8; SHA256_LEN];

/// Parse a hex-encoded SHA-1 fingerprint
///
/// # Arguments
/// * `s` - 40 hex characters, either case
///
/// # Returns
/// * `Result<Sha1Digest, ChecksumError>` - The 20-byte digest
pub fn parse_sha1(s: &str) -> Result<Sha1Digest, ChecksumError> {
    parse_fixed("SHA1", s)
}

/// Parse a hex-encoded SHA-256 fingerprint
///
/// # Arguments
/// * `s` - 64 hex characters, either case
///
/// # Returns
/// * `Result<Sha256Digest, ChecksumError>` - The 32-byte digest
pub fn parse_sha256(s: &str) -> Result<Sha256Digest, ChecksumError> {
    parse_fixed("SHA256", s)
}

/// Lowercase hex encoding of a digest.
pub fn encode(digest: &[u8]) -> String {
    hex::encode(digest)
}

fn parse_fixed<const N: usize>(algorithm: &'static str, s: &str) -> Result<[u8; N], ChecksumError> {
    if s.len() != N * 2 {
        return Err(ChecksumError::InvalidLength {
            algorithm,
            expected: N * 2,
            actual: s.len(),
        });
    }

    let mut digest = [0u8; N];
    hex::decode_to_slice(s, &mut digest)
        .map_err(|source| ChecksumError::InvalidHex { algorithm, source })?;
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ISRG_ROOT_X1_SHA256: &str =
        "96bcec06264976f37460779acf28c5a7cfe8a3c0aae11a8ffcee05c0bddf08c6";
    const ISRG_ROOT_X1_SHA1: &str = "cabd2a79a1076a31f21d253635cb039d4329a5e8";

    #[test]
    fn test_parse_known_fingerprints() {
        let sha256 = parse_sha256(ISRG_ROOT_X1_SHA256).unwrap();
        assert_eq!(sha256[0], 0x96);
        assert_eq!(sha256[31], 0xc6);

        let sha1 = parse_sha1(ISRG_ROOT_X1_SHA1).unwrap();
        assert_eq!(sha1[0], 0xca);
        assert_eq!(sha1[19], 0xe8);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = parse_sha1(ISRG_ROOT_X1_SHA1).unwrap();
        let upper = parse_sha1(&ISRG_ROOT_X1_SHA1.to_uppercase()).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        // A SHA-256 string handed to the SHA-1 parser
        let err = parse_sha1(ISRG_ROOT_X1_SHA256).unwrap_err();
        assert_eq!(
            err,
            ChecksumError::InvalidLength {
                algorithm: "SHA1",
                expected: 40,
                actual: 64,
            }
        );

        assert!(parse_sha256(&ISRG_ROOT_X1_SHA256[..62]).is_err());
        assert!(parse_sha256("").is_err());
    }

    #[test]
    fn test_non_hex_is_rejected() {
        let mut bad = ISRG_ROOT_X1_SHA1.to_string();
        bad.replace_range(0..2, "zz");
        assert!(matches!(
            parse_sha1(&bad),
            Err(ChecksumError::InvalidHex { .. })
        ));

        // Colon-separated fingerprints are not accepted
        let colons = "ca:bd:2a:79:a1:07:6a:31:f2:1d:25:36:35:cb:03:9d:43:29:a5:e8";
        assert!(parse_sha1(colons).is_err());
    }

    proptest! {
        #[test]
        fn test_sha256_hex_round_trip(bytes in proptest::array::uniform32(any::<u8>())) {
            let encoded = encode(&bytes);
            prop_assert_eq!(parse_sha256(&encoded).unwrap(), bytes);
            prop_assert_eq!(parse_sha256(&encoded.to_uppercase()).unwrap(), bytes);
        }

        #[test]
        fn test_sha1_rejects_any_other_length(s in "[0-9a-f]{0,80}") {
            prop_assume!(s.len() != 40);
            prop_assert!(parse_sha1(&s).is_err());
        }
    }
}
