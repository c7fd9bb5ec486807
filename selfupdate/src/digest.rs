//! Single-pass multi-algorithm hashing.
//!
//! A [`MultiHasher`] keeps one accumulator per requested algorithm and feeds
//! every chunk to all of them, so a package is read exactly once no matter
//! how many digests its manifest declares.

use crate::package::hash::{HashAlgorithm, HexDigest};
use sha2::digest::DynDigest;
use std::collections::BTreeMap;
use std::io::{self, Read};

const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental hasher computing several digests over one byte stream.
///
/// # Examples
///
/// ```
/// use selfupdate::digest::MultiHasher;
/// use selfupdate::package::hash::HashAlgorithm;
///
/// let mut hasher = MultiHasher::new([HashAlgorithm::Md5, HashAlgorithm::Sha256]);
/// hasher.update(b"");
/// let digests = hasher.finalize();
/// assert_eq!(
///     digests[&HashAlgorithm::Md5].as_str(),
///     "d41d8cd98f00b204e9800998ecf8427e"
/// );
/// ```
pub struct MultiHasher {
    accumulators: Vec<(HashAlgorithm, Box<dyn DynDigest + Send>)>,
    bytes: u64,
}

impl MultiHasher {
    /// Create a hasher for each distinct algorithm in `algorithms`.
    #[must_use]
    pub fn new(algorithms: impl IntoIterator<Item = HashAlgorithm>) -> Self {
        let mut accumulators: Vec<(HashAlgorithm, Box<dyn DynDigest + Send>)> = Vec::new();
        for algorithm in algorithms {
            if accumulators.iter().any(|(existing, _)| *existing == algorithm) {
                continue;
            }
            accumulators.push((algorithm, accumulator(algorithm)));
        }
        Self {
            accumulators,
            bytes: 0,
        }
    }

    /// Return the algorithms being computed, in insertion order.
    pub fn algorithms(&self) -> impl Iterator<Item = HashAlgorithm> + '_ {
        self.accumulators.iter().map(|(algorithm, _)| *algorithm)
    }

    /// Feed one chunk to every accumulator.
    pub fn update(&mut self, chunk: &[u8]) {
        for (_, digest) in &mut self.accumulators {
            digest.update(chunk);
        }
        self.bytes += chunk.len() as u64;
    }

    /// Return the number of bytes hashed so far.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Consume the hasher and return each algorithm's digest.
    #[must_use]
    pub fn finalize(self) -> BTreeMap<HashAlgorithm, HexDigest> {
        self.accumulators
            .into_iter()
            .map(|(algorithm, digest)| (algorithm, HexDigest::from_bytes(&digest.finalize())))
            .collect()
    }

    /// Drain `reader` to its end and return the digests.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading.
    pub fn digest_reader(
        mut self,
        reader: &mut dyn Read,
    ) -> io::Result<BTreeMap<HashAlgorithm, HexDigest>> {
        let mut buffer = vec![0_u8; CHUNK_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            self.update(&buffer[..read]);
        }
        Ok(self.finalize())
    }
}

impl std::fmt::Debug for MultiHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHasher")
            .field("algorithms", &self.algorithms().collect::<Vec<_>>())
            .field("bytes", &self.bytes)
            .finish()
    }
}

fn accumulator(algorithm: HashAlgorithm) -> Box<dyn DynDigest + Send> {
    match algorithm {
        HashAlgorithm::Md5 => Box::new(md5::Md5::default()),
        HashAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
        HashAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
        HashAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
        HashAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
        HashAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HashAlgorithm::Md5, "900150983cd24fb0d6963f7d28e17f72")]
    #[case(HashAlgorithm::Sha1, "a9993e364706816aba3e25717850c26c9cd0d89d")]
    #[case(
        HashAlgorithm::Sha224,
        "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
    )]
    #[case(
        HashAlgorithm::Sha256,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    )]
    fn known_answer_for_abc(#[case] algorithm: HashAlgorithm, #[case] expected: &str) {
        let mut hasher = MultiHasher::new([algorithm]);
        hasher.update(b"abc");
        assert_eq!(hasher.finalize()[&algorithm].as_str(), expected);
    }

    #[test]
    fn chunking_does_not_change_digests() {
        let data: Vec<u8> = (0..200_000_u32).map(|i| (i % 251) as u8).collect();

        let mut whole = MultiHasher::new(HashAlgorithm::ALL);
        whole.update(&data);

        let mut pieces = MultiHasher::new(HashAlgorithm::ALL);
        for chunk in data.chunks(7_919) {
            pieces.update(chunk);
        }

        assert_eq!(pieces.bytes_hashed(), data.len() as u64);
        assert_eq!(whole.finalize(), pieces.finalize());
    }

    #[test]
    fn duplicate_algorithms_are_computed_once() {
        let hasher = MultiHasher::new([HashAlgorithm::Sha1, HashAlgorithm::Sha1]);
        assert_eq!(hasher.algorithms().count(), 1);
    }

    #[test]
    fn digest_reader_matches_update() {
        let data = b"the quick brown fox".to_vec();
        let mut expected = MultiHasher::new([HashAlgorithm::Sha512]);
        expected.update(&data);

        let actual = MultiHasher::new([HashAlgorithm::Sha512])
            .digest_reader(&mut data.as_slice())
            .expect("read from slice");
        assert_eq!(actual, expected.finalize());
    }
}
