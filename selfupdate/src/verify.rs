//! Integrity verification against declared digests.
//!
//! Verification is incremental: [`Verifier::update`] sees every chunk as it
//! is written, so a download is hashed in the same pass that stores it.
//! Every declared algorithm must match; the first mismatch (in algorithm
//! order) is reported.

use crate::digest::MultiHasher;
use crate::package::hash::{HashAlgorithm, HexDigest};
use std::collections::BTreeMap;
use std::io::{self, Read};
use thiserror::Error;

/// Errors raised while verifying a package.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// A computed digest differs from the declared one.
    #[error("{algorithm} digest mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// The algorithm whose digest differs.
        algorithm: HashAlgorithm,
        /// The declared digest.
        expected: HexDigest,
        /// The digest computed over the received bytes.
        actual: HexDigest,
    },

    /// No digests were supplied to verify against.
    #[error("no digests to verify against")]
    NoDigests,

    /// Reading the package failed.
    #[error("I/O error while hashing package: {0}")]
    Io(#[from] io::Error),
}

/// Digests that matched their declared values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDigests {
    digests: BTreeMap<HashAlgorithm, HexDigest>,
    bytes: u64,
}

impl VerifiedDigests {
    /// Return the verified digests.
    #[must_use]
    pub fn digests(&self) -> &BTreeMap<HashAlgorithm, HexDigest> {
        &self.digests
    }

    /// Return how many bytes were hashed.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Incremental verifier for one package.
#[derive(Debug)]
pub struct Verifier {
    expected: BTreeMap<HashAlgorithm, HexDigest>,
    hasher: MultiHasher,
}

impl Verifier {
    /// Start verifying against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::NoDigests`] if `expected` is empty.
    pub fn new(expected: &BTreeMap<HashAlgorithm, HexDigest>) -> Result<Self, IntegrityError> {
        if expected.is_empty() {
            return Err(IntegrityError::NoDigests);
        }
        Ok(Self {
            hasher: MultiHasher::new(expected.keys().copied()),
            expected: expected.clone(),
        })
    }

    /// Hash the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Return the number of bytes seen so far.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.hasher.bytes_hashed()
    }

    /// Compare every computed digest with its declared value.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::Mismatch`] for the first algorithm whose
    /// digest differs.
    pub fn finish(self) -> Result<VerifiedDigests, IntegrityError> {
        let bytes = self.hasher.bytes_hashed();
        let actual = self.hasher.finalize();
        for (algorithm, expected) in &self.expected {
            let computed = actual.get(algorithm).ok_or(IntegrityError::NoDigests)?;
            if computed != expected {
                return Err(IntegrityError::Mismatch {
                    algorithm: *algorithm,
                    expected: expected.clone(),
                    actual: computed.clone(),
                });
            }
            log::debug!("{algorithm} digest verified");
        }
        Ok(VerifiedDigests {
            digests: actual,
            bytes,
        })
    }
}

/// A reader that hashes everything read through it.
#[derive(Debug)]
pub struct VerifyingReader<R> {
    inner: R,
    verifier: Verifier,
}

impl<R: Read> VerifyingReader<R> {
    /// Wrap `inner`, verifying against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::NoDigests`] if `expected` is empty.
    pub fn new(inner: R, expected: &BTreeMap<HashAlgorithm, HexDigest>) -> Result<Self, IntegrityError> {
        Ok(Self {
            inner,
            verifier: Verifier::new(expected)?,
        })
    }

    /// Finish verification of the bytes read so far.
    ///
    /// # Errors
    ///
    /// See [`Verifier::finish`].
    pub fn finish(self) -> Result<VerifiedDigests, IntegrityError> {
        self.verifier.finish()
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.verifier.update(&buf[..read]);
        Ok(read)
    }
}

/// Drain `reader` once and verify it against `expected`.
///
/// # Errors
///
/// Returns [`IntegrityError`] on a digest mismatch, an empty expectation
/// set, or a read failure.
///
/// # Examples
///
/// ```
/// use selfupdate::package::hash::{HashAlgorithm, HexDigest};
/// use selfupdate::verify::verify;
/// use std::collections::BTreeMap;
///
/// let expected = BTreeMap::from([(
///     HashAlgorithm::Md5,
///     HexDigest::new(HashAlgorithm::Md5, "900150983cd24fb0d6963f7d28e17f72").expect("valid"),
/// )]);
/// let verified = verify(&mut &b"abc"[..], &expected).expect("digests match");
/// assert_eq!(verified.bytes(), 3);
/// ```
pub fn verify(
    reader: &mut dyn Read,
    expected: &BTreeMap<HashAlgorithm, HexDigest>,
) -> Result<VerifiedDigests, IntegrityError> {
    let mut verifying = VerifyingReader::new(reader, expected)?;
    io::copy(&mut verifying, &mut io::sink())?;
    verifying.finish()
}
