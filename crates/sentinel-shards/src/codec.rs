// crates/sentinel-shards/src/codec.rs
// ============================================================================
// Module: Shard Codec
// Description: Canonical JSON encoding of a shard bucket, gzip-compressed
// for storage.
// Purpose: Give the store one place that defines the on-disk shard
// representation, independent of the merge semantics in sentinel-core.
// Dependencies: flate2, sentinel-core, serde_json
// ============================================================================

//! ## Overview
//! A shard bucket is stored as a gzip-compressed JSON array of
//! [`sentinel_core::Shard`] values (one bucket can hold more than one
//! `(rule_id, region)` shard when the hash bucket collides). The
//! uncompressed JSON form is what `spec.md` §8's canonical round-trip
//! property is checked against.

use std::io::Read;
use std::io::Write;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sentinel_core::Shard;
use thiserror::Error;

/// Errors raised while encoding or decoding a shard bucket.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("shard json codec error: {0}")]
    Json(String),
    /// Gzip compression or decompression failed.
    #[error("shard gzip codec error: {0}")]
    Gzip(String),
}

/// Serializes a bucket's shards to canonical JSON bytes, uncompressed.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when serialization fails.
pub fn encode_canonical(shards: &[Shard]) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(shards).map_err(|err| CodecError::Json(err.to_string()))
}

/// Deserializes a bucket's shards from canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when the bytes are not a valid shard array.
pub fn decode_canonical(bytes: &[u8]) -> Result<Vec<Shard>, CodecError> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::Json(err.to_string()))
}

/// Gzip-compresses canonical JSON bytes for storage.
///
/// # Errors
///
/// Returns [`CodecError::Gzip`] when compression fails.
pub fn compress(canonical_json: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(canonical_json).map_err(|err| CodecError::Gzip(err.to_string()))?;
    encoder.finish().map_err(|err| CodecError::Gzip(err.to_string()))
}

/// Decompresses a gzip-compressed shard bucket into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CodecError::Gzip`] when decompression fails.
pub fn decompress(gzip_bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(gzip_bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|err| CodecError::Gzip(err.to_string()))?;
    Ok(out)
}

/// Encodes a bucket's shards straight to gzip-compressed bytes.
///
/// # Errors
///
/// Returns [`CodecError`] when either encoding step fails.
pub fn encode(shards: &[Shard]) -> Result<Vec<u8>, CodecError> {
    compress(&encode_canonical(shards)?)
}

/// Decodes gzip-compressed bytes straight to a bucket's shards.
///
/// # Errors
///
/// Returns [`CodecError`] when either decoding step fails.
pub fn decode(gzip_bytes: &[u8]) -> Result<Vec<Shard>, CodecError> {
    decode_canonical(&decompress(gzip_bytes)?)
}

#[cfg(test)]
mod tests {
    use sentinel_core::RuleId;
    use sentinel_core::Timestamp;

    use super::*;

    fn shard() -> Shard {
        Shard::new(
            RuleId::new("r1"),
            "eu-west-1".to_string(),
            vec![sentinel_core::Finding {
                rule_id: RuleId::new("r1"),
                resource_id: "bucket-a".to_string(),
                region: "eu-west-1".to_string(),
                severity: sentinel_core::Severity::High,
                first_seen: Timestamp::from_epoch_millis(0),
                last_seen: Timestamp::from_epoch_millis(0),
                evidence: serde_json::json!({}),
            }],
        )
    }

    #[test]
    fn round_trip_preserves_shard_content() {
        let shards = vec![shard()];
        let encoded = encode(&shards).expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded, shards);
    }

    #[test]
    fn compressed_bytes_are_smaller_than_a_repetitive_payload() {
        let shards = vec![shard(); 64];
        let canonical = encode_canonical(&shards).expect("encode canonical");
        let compressed = compress(&canonical).expect("compress");
        assert!(compressed.len() < canonical.len());
    }
}
