// crates/sentinel-shards/src/layout.rs
// ============================================================================
// Module: Findings Shard Key Layout
// Description: Object-store key layout for live and archived shards.
// Purpose: Give the store one place to compute `findings/...`/`archive/...`
// keys, so the rest of the crate never builds paths by hand.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! Live shards live under `findings/<tenant>/<YYYY-MM-DD>/<cloud>/<shard
//! key>.json.gz`; a tenant archived for inactivity moves under
//! `archive/<tenant>/...` with the same suffix, per `spec.md` §4.8.

use sentinel_core::CloudProvider;

/// Lowercase path segment for a cloud platform.
#[must_use]
pub const fn cloud_segment(cloud: CloudProvider) -> &'static str {
    match cloud {
        CloudProvider::Aws => "aws",
        CloudProvider::Azure => "azure",
        CloudProvider::Gcp => "gcp",
        CloudProvider::Kubernetes => "kubernetes",
    }
}

/// Key for a live shard bucket.
#[must_use]
pub fn live_key(tenant_id: &str, date: &str, cloud: CloudProvider, shard_bucket: u32) -> String {
    format!("findings/{tenant_id}/{date}/{}/{shard_bucket}.json.gz", cloud_segment(cloud))
}

/// Key for the same shard bucket once its tenant has been archived.
#[must_use]
pub fn archive_key(tenant_id: &str, date: &str, cloud: CloudProvider, shard_bucket: u32) -> String {
    format!("archive/{tenant_id}/{date}/{}/{shard_bucket}.json.gz", cloud_segment(cloud))
}

/// Key prefix covering every live shard for a tenant, for archival sweeps.
#[must_use]
pub fn tenant_prefix(tenant_id: &str) -> String {
    format!("findings/{tenant_id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_key_matches_the_documented_layout() {
        let key = live_key("tenant-1", "2026-07-28", CloudProvider::Aws, 4);
        assert_eq!(key, "findings/tenant-1/2026-07-28/aws/4.json.gz");
    }

    #[test]
    fn archive_key_swaps_the_top_level_prefix() {
        let key = archive_key("tenant-1", "2026-07-28", CloudProvider::Aws, 4);
        assert_eq!(key, "archive/tenant-1/2026-07-28/aws/4.json.gz");
    }
}
