// crates/sentinel-core/src/hashing.rs
// ============================================================================
// Module: Sentinel Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for shard content, license request
// signing, and rule bundle addressing.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Canonical hashing underlies two independent needs: shard round-trip
//! integrity (`canonical(decode(encode(shard))) == shard`) and license-request
//! signing. Both use the same RFC 8785 (JCS) canonicalization so a single
//! module covers both without divergent behavior.

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Default hash algorithm used throughout Sentinel.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }
}

/// Errors raised while computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

/// Computes the shard-key bucket for a `(rule_id, region)` pair.
///
/// Mirrors `spec.md` §3: `shard-key = hash(rule_id, region) mod N`.
#[must_use]
pub fn shard_key(rule_id: &str, region: &str, shard_count: u32) -> u32 {
    assert!(shard_count > 0, "shard_count must be non-zero");
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(region.as_bytes());
    let digest = hasher.finalize();
    let mut acc: u64 = 0;
    for byte in &digest[..8] {
        acc = (acc << 8) | u64::from(*byte);
    }
    u32::try_from(acc % u64::from(shard_count)).unwrap_or(0)
}

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_key_is_deterministic() {
        let a = shard_key("aws-001-slug_1", "eu-west-1", 16);
        let b = shard_key("aws-001-slug_1", "eu-west-1", 16);
        assert_eq!(a, b);
        assert!(a < 16);
    }

    #[test]
    fn canonical_json_is_stable_under_key_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        let ha = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &a).expect("hash a");
        let hb = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &b).expect("hash b");
        assert_eq!(ha.value, hb.value);
    }
}
