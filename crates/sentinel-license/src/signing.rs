// crates/sentinel-license/src/signing.rs
// ============================================================================
// Module: License Request Signing
// Description: Ed25519 request signing and a monotonic, idempotent nonce
// tracker.
// Purpose: Every request to the License Manager carries a signature over a
// canonical JSON body plus a monotonic nonce.
// Dependencies: ed25519-dalek, sentinel-core
// ============================================================================

//! ## Overview
//! [`RequestSigner`] signs a canonical JSON body with an Ed25519 key cached
//! per customer. [`NonceTracker`] hands out strictly increasing nonces and
//! remembers recently issued ones for 5 minutes so a retried request with the
//! same nonce is treated as idempotent rather than rejected as a replay.

use std::collections::HashMap;
use std::sync::Mutex;

use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use sentinel_core::Timestamp;
use sentinel_core::hashing::canonical_json_bytes;
use sentinel_core::hashing::hex_encode;
use serde::Serialize;
use thiserror::Error;

/// Width of the idempotent-replay window for nonces.
pub const NONCE_WINDOW_SECONDS: i64 = 300;

/// A signed request ready to be sent to the License Manager.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Canonical JSON body bytes that were signed.
    pub body: Vec<u8>,
    /// Hex-encoded Ed25519 signature over `body`.
    pub signature_hex: String,
    /// Nonce included in the request, used for idempotent retries.
    pub nonce: u64,
}

/// Errors raised while signing a request.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The request body failed to canonicalize.
    #[error("failed to canonicalize request body: {0}")]
    Canonicalization(String),
}

/// Signs outbound requests with a per-customer Ed25519 key.
pub struct RequestSigner {
    signing_key: SigningKey,
}

impl RequestSigner {
    /// Creates a signer from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(&seed) }
    }

    /// Signs `body` (serialized to canonical JSON) with the given `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Canonicalization`] when `body` cannot be
    /// canonicalized to JSON.
    pub fn sign<T: Serialize>(&self, body: &T, nonce: u64) -> Result<SignedRequest, SigningError> {
        let mut envelope = canonical_json_bytes(body).map_err(|err| SigningError::Canonicalization(err.to_string()))?;
        envelope.extend_from_slice(nonce.to_be_bytes().as_slice());
        let signature: Signature = self.signing_key.sign(&envelope);
        Ok(SignedRequest {
            body: canonical_json_bytes(body).map_err(|err| SigningError::Canonicalization(err.to_string()))?,
            signature_hex: hex_encode(signature.to_bytes().as_slice()),
            nonce,
        })
    }
}

/// Issues monotonic nonces and tracks recently issued ones for idempotent
/// replay within [`NONCE_WINDOW_SECONDS`].
#[derive(Default)]
pub struct NonceTracker {
    state: Mutex<NonceState>,
}

#[derive(Default)]
struct NonceState {
    next: u64,
    issued_at: HashMap<u64, Timestamp>,
}

impl NonceTracker {
    /// Creates an empty tracker starting at nonce `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next monotonic nonce, recording its issue time.
    pub fn next_nonce(&self, now: Timestamp) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let nonce = state.next;
        state.next += 1;
        state.issued_at.insert(nonce, now);
        prune_expired(&mut state.issued_at, now);
        nonce
    }

    /// Returns true when `nonce` was issued within the idempotent window of
    /// `now`, meaning a retry carrying it should be treated as a repeat of
    /// the original request rather than a new one.
    pub fn is_within_idempotent_window(&self, nonce: u64, now: Timestamp) -> bool {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.issued_at.get(&nonce).is_some_and(|issued_at| now.seconds_since(*issued_at) < NONCE_WINDOW_SECONDS)
    }
}

fn prune_expired(issued_at: &mut HashMap<u64, Timestamp>, now: Timestamp) {
    issued_at.retain(|_, issued| now.seconds_since(*issued) < NONCE_WINDOW_SECONDS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_increase_monotonically() {
        let tracker = NonceTracker::new();
        let now = Timestamp::now();
        assert_eq!(tracker.next_nonce(now), 0);
        assert_eq!(tracker.next_nonce(now), 1);
        assert_eq!(tracker.next_nonce(now), 2);
    }

    #[test]
    fn recently_issued_nonce_is_within_window() {
        let tracker = NonceTracker::new();
        let now = Timestamp::now();
        let nonce = tracker.next_nonce(now);
        assert!(tracker.is_within_idempotent_window(nonce, now.plus_seconds(100)));
    }

    #[test]
    fn nonce_outside_window_is_not_idempotent() {
        let tracker = NonceTracker::new();
        let now = Timestamp::now();
        let nonce = tracker.next_nonce(now);
        assert!(!tracker.is_within_idempotent_window(nonce, now.plus_seconds(301)));
    }

    #[test]
    fn signing_is_deterministic_for_same_body_and_nonce() {
        let signer = RequestSigner::from_seed([7u8; 32]);
        let body = serde_json::json!({"tenant": "t-1"});
        let first = signer.sign(&body, 1).expect("sign");
        let second = signer.sign(&body, 1).expect("sign");
        assert_eq!(first.signature_hex, second.signature_hex);
    }
}
