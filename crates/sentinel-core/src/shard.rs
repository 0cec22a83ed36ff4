// crates/sentinel-core/src/shard.rs
// ============================================================================
// Module: Sentinel Findings Shard
// Description: Canonical shard entity and its pure merge function.
// Purpose: Give the Findings Shard Store one shared, testable merge semantics
// independent of storage backend.
// Dependencies: serde, sentinel_core::{identifiers, time}
// ============================================================================

//! ## Overview
//! A shard holds every finding for one `(rule_id, region)` bucket of one job
//! run. [`merge_shard`] combines a prior shard with a freshly produced one:
//! findings for resources the new run re-evaluated are replaced outright
//! (carrying over `first_seen` from the prior occurrence), findings for
//! resources the new run did not touch are preserved unchanged, and findings
//! the new run explicitly reports as remediated are dropped. Findings are
//! always stored in a canonical, explicitly sorted order — never hashmap
//! iteration order — so two semantically identical shards serialize to
//! byte-identical JSON.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::RuleId;
use crate::model::Severity;
use crate::time::Timestamp;

/// One rule violation against one cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule that produced this finding.
    pub rule_id: RuleId,
    /// Cloud-native resource identifier (ARN, resource ID, URI).
    pub resource_id: String,
    /// Region the resource lives in.
    pub region: String,
    /// Severity at the time of this occurrence.
    pub severity: Severity,
    /// Timestamp this finding was first observed (carried across merges).
    pub first_seen: Timestamp,
    /// Timestamp this finding was last confirmed present.
    pub last_seen: Timestamp,
    /// Free-form evidence payload (non-compliant attribute values).
    pub evidence: serde_json::Value,
}

/// Finding identity used for merge matching: same rule, same resource.
fn finding_key(finding: &Finding) -> (&str, &str) {
    (finding.rule_id.as_str(), finding.resource_id.as_str())
}

/// All findings for one `(rule_id, region)` shard bucket of one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Rule this shard's bucket is keyed on.
    pub rule_id: RuleId,
    /// Region this shard's bucket is keyed on.
    pub region: String,
    /// Findings, always stored in canonical sorted order.
    pub findings: Vec<Finding>,
}

impl Shard {
    /// Returns the findings in canonical order: by resource id, then by
    /// first-seen timestamp for stability when resource ids tie.
    fn canonicalize(mut findings: Vec<Finding>) -> Vec<Finding> {
        findings.sort_by(|a, b| {
            a.resource_id
                .cmp(&b.resource_id)
                .then(a.first_seen.cmp(&b.first_seen))
        });
        findings
    }

    /// Builds a new shard with findings placed in canonical order.
    #[must_use]
    pub fn new(rule_id: RuleId, region: String, findings: Vec<Finding>) -> Self {
        Self {
            rule_id,
            region,
            findings: Self::canonicalize(findings),
        }
    }
}

/// Resources a fresh run evaluated and found compliant (no finding), used to
/// distinguish "untouched, preserve" from "remediated, drop" during merge.
pub type RemediatedResourceIds<'a> = &'a [String];

/// Merges a prior persisted shard with a freshly produced shard for the same
/// `(rule_id, region)` bucket.
///
/// Semantics (`spec.md` §3 Shard):
/// - A resource present in `fresh` replaces its prior occurrence, carrying
///   over `first_seen` from the prior finding if one existed.
/// - A resource present in `remediated` is dropped even if it was present in
///   `prior` (the fresh run confirmed it compliant).
/// - A resource present in `prior` but absent from both `fresh` and
///   `remediated` was not evaluated by this run (e.g. a transient read error)
///   and is preserved unchanged.
///
/// # Panics
///
/// Panics if `prior` and `fresh` do not share the same `(rule_id, region)`.
#[must_use]
pub fn merge_shard(prior: &Shard, fresh: &Shard, remediated: RemediatedResourceIds<'_>) -> Shard {
    assert!(
        prior.rule_id == fresh.rule_id && prior.region == fresh.region,
        "cannot merge shards for different (rule_id, region) buckets"
    );

    let mut first_seen_by_key: BTreeMap<(String, String), Timestamp> = BTreeMap::new();
    for finding in &prior.findings {
        let (rule, resource) = finding_key(finding);
        first_seen_by_key.insert((rule.to_string(), resource.to_string()), finding.first_seen);
    }

    let remediated: std::collections::BTreeSet<&str> = remediated.iter().map(String::as_str).collect();
    let fresh_keys: std::collections::BTreeSet<(String, String)> = fresh
        .findings
        .iter()
        .map(|f| {
            let (rule, resource) = finding_key(f);
            (rule.to_string(), resource.to_string())
        })
        .collect();

    let mut merged: Vec<Finding> = Vec::with_capacity(prior.findings.len() + fresh.findings.len());

    for finding in &fresh.findings {
        let key = {
            let (rule, resource) = finding_key(finding);
            (rule.to_string(), resource.to_string())
        };
        let mut finding = finding.clone();
        if let Some(original_first_seen) = first_seen_by_key.get(&key) {
            finding.first_seen = *original_first_seen;
        }
        merged.push(finding);
    }

    for finding in &prior.findings {
        let key = {
            let (rule, resource) = finding_key(finding);
            (rule.to_string(), resource.to_string())
        };
        if fresh_keys.contains(&key) {
            continue;
        }
        if remediated.contains(finding.resource_id.as_str()) {
            continue;
        }
        merged.push(finding.clone());
    }

    Shard::new(prior.rule_id.clone(), prior.region.clone(), merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: &str, resource: &str, first_seen: i64, last_seen: i64) -> Finding {
        Finding {
            rule_id: RuleId::new(rule),
            resource_id: resource.to_string(),
            region: "eu-west-1".to_string(),
            severity: Severity::High,
            first_seen: Timestamp::from_epoch_millis(first_seen),
            last_seen: Timestamp::from_epoch_millis(last_seen),
            evidence: serde_json::json!({}),
        }
    }

    #[test]
    fn fresh_occurrence_carries_over_first_seen() {
        let prior = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![finding("r1", "bucket-a", 100, 100)]);
        let fresh = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![finding("r1", "bucket-a", 500, 500)]);
        let merged = merge_shard(&prior, &fresh, &[]);
        assert_eq!(merged.findings.len(), 1);
        assert_eq!(merged.findings[0].first_seen, Timestamp::from_epoch_millis(100));
        assert_eq!(merged.findings[0].last_seen, Timestamp::from_epoch_millis(500));
    }

    #[test]
    fn remediated_resource_is_dropped() {
        let prior = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![finding("r1", "bucket-a", 100, 100)]);
        let fresh = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![]);
        let merged = merge_shard(&prior, &fresh, &["bucket-a".to_string()]);
        assert!(merged.findings.is_empty());
    }

    #[test]
    fn untouched_resource_is_preserved() {
        let prior = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![finding("r1", "bucket-a", 100, 100)]);
        let fresh = Shard::new(RuleId::new("r1"), "eu-west-1".into(), vec![]);
        let merged = merge_shard(&prior, &fresh, &[]);
        assert_eq!(merged.findings.len(), 1);
        assert_eq!(merged.findings[0].resource_id, "bucket-a");
    }

    #[test]
    fn canonical_order_is_stable_regardless_of_input_order() {
        let a = Shard::new(
            RuleId::new("r1"),
            "eu-west-1".into(),
            vec![finding("r1", "bucket-b", 100, 100), finding("r1", "bucket-a", 100, 100)],
        );
        let b = Shard::new(
            RuleId::new("r1"),
            "eu-west-1".into(),
            vec![finding("r1", "bucket-a", 100, 100), finding("r1", "bucket-b", 100, 100)],
        );
        assert_eq!(a.findings, b.findings);
    }
}
