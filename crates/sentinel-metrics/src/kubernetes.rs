// crates/sentinel-metrics/src/kubernetes.rs
// ============================================================================
// Module: Kubernetes Metrics Stage
// Description: Stage 7 of the metrics pipeline — per-cluster workload
// compliance view.
// Purpose: Implement spec.md §4.9 stage 7.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`compute_kubernetes`] is computed per K8s platform entity (one view per
//! partition whose rules target `CloudProvider::Kubernetes`), scanning only
//! the `kubernetes`-tagged rule subset. Unlike the other views, the
//! recommendation list here is unfiltered by severity — every namespace
//! with an open finding is a candidate, not only the ones carrying a
//! critical finding.

use std::collections::BTreeSet;
use std::collections::HashMap;

use sentinel_core::KubernetesView;
use sentinel_core::PartitionKey;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::Shard;

const KUBERNETES_TAG: &str = "kubernetes";

/// Cloud-native resource id format used by Kubernetes rules:
/// `<namespace>/<kind>/<name>`. Returns the namespace segment, or the whole
/// id if it does not follow that convention.
fn namespace_of(resource_id: &str) -> &str {
    resource_id.split('/').next().unwrap_or(resource_id)
}

/// Computes one [`KubernetesView`] for `partition`, considering only
/// findings whose rule carries the `kubernetes` tag in `rules_by_id`.
/// `namespaces_at_risk` collects every namespace with at least one open
/// finding regardless of severity, matching the "recommendation list
/// unfiltered by severity" requirement.
#[must_use]
pub fn compute_kubernetes(partition: PartitionKey, shards: &[Shard], rules_by_id: &HashMap<RuleId, Rule>) -> KubernetesView {
    let mut namespaces: BTreeSet<String> = BTreeSet::new();
    let mut workload_findings = 0u64;

    for shard in shards {
        for finding in &shard.findings {
            let Some(rule) = rules_by_id.get(&finding.rule_id) else {
                continue;
            };
            if !rule.tags.iter().any(|tag| tag == KUBERNETES_TAG) {
                continue;
            }
            namespaces.insert(namespace_of(&finding.resource_id).to_string());
            workload_findings += 1;
        }
    }

    KubernetesView { partition, namespaces_at_risk: namespaces.into_iter().collect(), workload_findings }
}
