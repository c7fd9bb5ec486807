//! Hash algorithm names and hex digest newtype.
//!
//! Algorithm names are matched case-insensitively. Digests are validated
//! against the algorithm's output length and stored lowercase so that
//! later comparisons are case-insensitive by construction.

use super::error::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A digest algorithm a manifest may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 (128-bit).
    Md5,
    /// SHA-1 (160-bit).
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Every algorithm this build recognises.
    pub const ALL: [Self; 6] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    /// Return the canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Return the digest length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    /// Parse an algorithm name, ignoring ASCII case.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| value.to_owned())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated, lowercase hex digest.
///
/// # Examples
///
/// ```
/// use selfupdate::package::hash::{HashAlgorithm, HexDigest};
///
/// let digest = HexDigest::new(HashAlgorithm::Md5, "D41D8CD98F00B204E9800998ECF8427E")
///     .expect("valid md5 digest");
/// assert_eq!(digest.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HexDigest(String);

impl HexDigest {
    /// Validate `value` as a digest produced by `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDigest`] if the value contains
    /// non-hex characters or has the wrong length.
    pub fn new(algorithm: HashAlgorithm, value: &str) -> Result<Self> {
        let value = value.trim();
        let expected_len = algorithm.output_len() * 2;
        let invalid = |reason: String| ValidationError::InvalidDigest {
            algorithm: algorithm.name().to_owned(),
            reason,
        };
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(invalid(format!("non-hex character '{bad}'")));
        }
        if value.len() != expected_len {
            return Err(invalid(format!(
                "expected {expected_len} hex characters, got {}",
                value.len()
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Wrap raw digest bytes produced by a hasher.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Return the digest as a lowercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("md5", HashAlgorithm::Md5)]
    #[case("SHA256", HashAlgorithm::Sha256)]
    #[case("Sha512", HashAlgorithm::Sha512)]
    #[case(" sha1 ", HashAlgorithm::Sha1)]
    fn parses_names_case_insensitively(#[case] name: &str, #[case] expected: HashAlgorithm) {
        assert_eq!(name.parse::<HashAlgorithm>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert_eq!("blake3".parse::<HashAlgorithm>(), Err("blake3".to_owned()));
    }

    #[rstest]
    #[case(HashAlgorithm::Md5, 32)]
    #[case(HashAlgorithm::Sha1, 40)]
    #[case(HashAlgorithm::Sha224, 56)]
    #[case(HashAlgorithm::Sha256, 64)]
    #[case(HashAlgorithm::Sha384, 96)]
    #[case(HashAlgorithm::Sha512, 128)]
    fn accepts_digest_of_algorithm_length(#[case] algorithm: HashAlgorithm, #[case] len: usize) {
        let digest = HexDigest::new(algorithm, &"a".repeat(len));
        assert!(digest.is_ok(), "{algorithm} should accept {len} hex chars");
    }

    #[test]
    fn rejects_wrong_length() {
        let result = HexDigest::new(HashAlgorithm::Sha256, &"a".repeat(32));
        assert!(matches!(result, Err(ValidationError::InvalidDigest { .. })));
    }

    #[test]
    fn rejects_non_hex() {
        let mut bad = "a".repeat(63);
        bad.push('g');
        let result = HexDigest::new(HashAlgorithm::Sha256, &bad);
        assert!(matches!(result, Err(ValidationError::InvalidDigest { .. })));
    }

    #[test]
    fn normalises_to_lowercase() {
        let digest = HexDigest::new(HashAlgorithm::Sha1, &"AB".repeat(20)).expect("valid");
        assert_eq!(digest.as_str(), "ab".repeat(20));
    }

    #[test]
    fn from_bytes_encodes_lowercase_hex() {
        assert_eq!(HexDigest::from_bytes(&[0xde, 0xad]).as_str(), "dead");
    }
}
