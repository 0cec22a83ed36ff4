// crates/sentinel-server/src/ids.rs
// ============================================================================
// Module: Identifier Generation
// Description: Random identifier generation for entities whose id the
// library crates take as a caller-supplied parameter.
// Purpose: Give the server one place to mint job/event/batch-result ids,
// matching the existing pattern of caller-supplied identifiers documented in
// sentinel-events::ingest.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Every library crate takes identifiers as parameters rather than minting
//! them internally (`sentinel_events::ingest`'s module doc calls this out
//! explicitly), so something at the binary boundary has to generate them.
//! [`random_id`] produces a short hex token prefixed by a caller-chosen tag.

use rand::RngCore;

/// Generates a random identifier of the form `<prefix>-<16 hex characters>`.
#[must_use]
pub fn random_id(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{prefix}-{hex}")
}

#[cfg(test)]
mod tests {
    use super::random_id;

    #[test]
    fn ids_carry_the_requested_prefix() {
        assert!(random_id("job").starts_with("job-"));
    }

    #[test]
    fn two_generated_ids_are_distinct() {
        assert_ne!(random_id("job"), random_id("job"));
    }
}
