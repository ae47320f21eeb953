//! Hashing utilities for triblob
//!
//! - Incremental content digests (blob identity), xxHash64 by default with
//!   BLAKE3 as the alternative
//! - Shard routing of a blob digest onto one of the master instances

use serde::{Deserialize, Serialize};
use std::hash::Hasher as _;
use twox_hash::XxHash64;

/// Digest algorithm used for blob identity.
///
/// Frontends and workers must agree on it, otherwise every save fails with a
/// hash mismatch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Xxh64,
    Blake3,
}

impl HashAlgorithm {
    pub fn hasher(&self) -> IncrementalHasher {
        match self {
            HashAlgorithm::Xxh64 => IncrementalHasher::Xxh64(XxHash64::with_seed(0)),
            HashAlgorithm::Blake3 => IncrementalHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Digest of a complete in-memory buffer.
    pub fn digest(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.add_chunk(data);
        hasher.finalize()
    }
}

/// Accumulates chunks into one content digest.
///
/// `finalize` consumes the hasher, so it can only be called once.
pub enum IncrementalHasher {
    Xxh64(XxHash64),
    Blake3(Box<blake3::Hasher>),
}

impl IncrementalHasher {
    pub fn add_chunk(&mut self, bytes: &[u8]) {
        match self {
            IncrementalHasher::Xxh64(h) => h.write(bytes),
            IncrementalHasher::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    /// Lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            IncrementalHasher::Xxh64(h) => hex::encode(h.finish().to_be_bytes()),
            IncrementalHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

impl std::fmt::Debug for IncrementalHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncrementalHasher::Xxh64(_) => f.write_str("IncrementalHasher(xxh64)"),
            IncrementalHasher::Blake3(_) => f.write_str("IncrementalHasher(blake3)"),
        }
    }
}

/// Compute shard ID for a key (master routing)
pub fn shard_key(key: &str, num_shards: u64) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(prefix) % num_shards
}

/// Index of the master owning `blob_hash` among `masters_count` shards.
pub fn master_index(blob_hash: &str, masters_count: usize) -> usize {
    shard_key(blob_hash, masters_count.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_points_do_not_change_digest() {
        for algorithm in [HashAlgorithm::Xxh64, HashAlgorithm::Blake3] {
            let mut split = algorithm.hasher();
            split.add_chunk(b"ABRA");
            split.add_chunk(b"KADABRA");

            let mut whole = algorithm.hasher();
            whole.add_chunk(b"ABRAKADABRA");

            let mut bytewise = algorithm.hasher();
            for b in b"ABRAKADABRA" {
                bytewise.add_chunk(std::slice::from_ref(b));
            }

            let digest = whole.finalize();
            assert_eq!(split.finalize(), digest);
            assert_eq!(bytewise.finalize(), digest);
        }
    }

    #[test]
    fn test_digest_format() {
        assert_eq!(HashAlgorithm::Xxh64.digest(b"hello").len(), 16);
        assert_eq!(HashAlgorithm::Blake3.digest(b"hello").len(), 64);
        assert_ne!(
            HashAlgorithm::Xxh64.digest(b"hello"),
            HashAlgorithm::Xxh64.digest(b"hellp")
        );
    }

    #[test]
    fn test_empty_input_is_stable() {
        assert_eq!(
            HashAlgorithm::Xxh64.hasher().finalize(),
            HashAlgorithm::Xxh64.digest(b"")
        );
    }

    #[test]
    fn test_shard_key_deterministic() {
        let key = "0123456789abcdef";
        assert_eq!(shard_key(key, 256), shard_key(key, 256));
        assert!(shard_key(key, 3) < 3);
    }

    #[test]
    fn test_master_index_single_shard() {
        assert_eq!(master_index("anything", 1), 0);
        assert_eq!(master_index("anything", 0), 0);
    }
}
