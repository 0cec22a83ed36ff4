// crates/sentinel-worker/src/shard_builder.rs
// ============================================================================
// Module: In-Memory Shard Builder
// Description: Groups findings by (rule_id, region) then buckets those
// groups by hash(rule_id, region) mod N for the findings shard store.
// Purpose: Give the region pipeline one place to accumulate findings before
// handoff to the findings shard store.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! A [`ShardBuilder`] is scoped to one region's run. [`ShardBuilder::record`]
//! appends a finding to its `(rule_id, region)` group; [`ShardBuilder::build`]
//! turns those groups into canonical [`Shard`]s, bucketed by
//! [`sentinel_core::shard_key`] so the findings shard store can bound the
//! number of physical shard files regardless of rule count.

use std::collections::HashMap;

use sentinel_core::Finding;
use sentinel_core::RuleId;
use sentinel_core::Shard;
use sentinel_core::hashing::shard_key;

/// Accumulates findings for one region's run, grouped and bucketed for the
/// findings shard store.
pub struct ShardBuilder {
    shard_count: u32,
    region: String,
    groups: HashMap<RuleId, Vec<Finding>>,
}

impl ShardBuilder {
    /// Creates a builder for `region`, bucketing into `shard_count` buckets.
    #[must_use]
    pub fn new(region: impl Into<String>, shard_count: u32) -> Self {
        Self { shard_count, region: region.into(), groups: HashMap::new() }
    }

    /// Records one finding under its rule's group.
    pub fn record(&mut self, finding: Finding) {
        self.groups.entry(finding.rule_id.clone()).or_default().push(finding);
    }

    /// Marks `rule_id` as having run to completion against this region,
    /// ensuring [`ShardBuilder::build`] emits a (possibly empty) shard for
    /// it even if it produced no findings. Without this, a rule going from
    /// N violations to zero would never hand the findings shard store an
    /// empty fresh shard to merge against, and the prior violations would
    /// never be dropped as remediated.
    pub fn touch(&mut self, rule_id: RuleId) {
        self.groups.entry(rule_id).or_default();
    }

    /// Consumes the builder, returning one canonical [`Shard`] per rule that
    /// either produced a finding or was explicitly [`touch`](Self::touch)ed,
    /// paired with its bucket number.
    #[must_use]
    pub fn build(self) -> Vec<(u32, Shard)> {
        self.groups
            .into_iter()
            .map(|(rule_id, findings)| {
                let bucket = shard_key(rule_id.as_str(), &self.region, self.shard_count);
                (bucket, Shard::new(rule_id, self.region.clone(), findings))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::Severity;
    use sentinel_core::Timestamp;

    use super::*;

    fn finding(rule: &str, resource: &str) -> Finding {
        Finding {
            rule_id: RuleId::new(rule),
            resource_id: resource.to_string(),
            region: "eu-west-1".to_string(),
            severity: Severity::High,
            first_seen: Timestamp::from_epoch_millis(0),
            last_seen: Timestamp::from_epoch_millis(0),
            evidence: serde_json::json!({}),
        }
    }

    #[test]
    fn findings_group_by_rule_into_one_shard_each() {
        let mut builder = ShardBuilder::new("eu-west-1", 16);
        builder.record(finding("r1", "bucket-a"));
        builder.record(finding("r1", "bucket-b"));
        builder.record(finding("r2", "bucket-c"));
        let shards = builder.build();
        assert_eq!(shards.len(), 2);
        let r1_shard = shards.iter().find(|(_, shard)| shard.rule_id == RuleId::new("r1")).expect("r1 shard");
        assert_eq!(r1_shard.1.findings.len(), 2);
    }

    #[test]
    fn bucket_assignment_is_deterministic() {
        let mut a = ShardBuilder::new("eu-west-1", 16);
        a.record(finding("r1", "bucket-a"));
        let mut b = ShardBuilder::new("eu-west-1", 16);
        b.record(finding("r1", "bucket-a"));
        assert_eq!(a.build()[0].0, b.build()[0].0);
    }

    #[test]
    fn touched_rule_with_no_findings_still_yields_an_empty_shard() {
        let mut builder = ShardBuilder::new("eu-west-1", 16);
        builder.touch(RuleId::new("r1"));
        let shards = builder.build();
        assert_eq!(shards.len(), 1);
        assert!(shards[0].1.findings.is_empty());
    }
}
