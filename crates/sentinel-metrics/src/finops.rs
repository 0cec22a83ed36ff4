// crates/sentinel-metrics/src/finops.rs
// ============================================================================
// Module: FinOps Metrics Stage
// Description: Stage 6 of the metrics pipeline — estimated monthly cost
// exposure from the `finops`-tagged rule subset.
// Purpose: Implement spec.md §4.9 stage 6.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`compute_finops`] scans only the disjoint rule subset tagged `finops`
//! (spec.md §4.9 stage 6), grouping open findings by the rule's
//! `service_section` and pricing each group by a fixed per-severity monthly
//! cost weight. A rule with no `service_section` produces an empty service
//! bucket, which this stage suppresses rather than reporting as
//! unattributed spend.

use std::collections::BTreeMap;

use sentinel_core::FinOpsView;
use sentinel_core::PartitionKey;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::Severity;
use sentinel_core::Shard;
use std::collections::HashMap;

const FINOPS_TAG: &str = "finops";

/// Estimated monthly cost, in USD cents, attributable to one open finding of
/// a given severity, standing in for a real cloud cost estimator.
fn monthly_cost_cents(severity: Severity) -> u64 {
    match severity {
        Severity::Info => 0,
        Severity::Low => 500,
        Severity::Medium => 2_500,
        Severity::High => 10_000,
        Severity::Critical => 50_000,
    }
}

/// Computes per-service [`FinOpsView`]s for `shards`, considering only
/// findings whose rule carries the `finops` tag in `rules_by_id`. `is_new`
/// marks every returned view's `is_new_partition`, set by the caller from
/// whether this partition has any prior week's FinOps record at all.
#[must_use]
pub fn compute_finops(partition: PartitionKey, shards: &[Shard], rules_by_id: &HashMap<RuleId, Rule>, is_new: bool) -> Vec<FinOpsView> {
    let mut by_service: BTreeMap<String, u64> = BTreeMap::new();

    for shard in shards {
        for finding in &shard.findings {
            let Some(rule) = rules_by_id.get(&finding.rule_id) else {
                continue;
            };
            if !rule.tags.iter().any(|tag| tag == FINOPS_TAG) {
                continue;
            }
            let service = rule.service_section.clone().unwrap_or_default();
            if service.is_empty() {
                continue;
            }
            *by_service.entry(service).or_default() += monthly_cost_cents(finding.severity);
        }
    }

    by_service
        .into_iter()
        .map(|(service, estimated_monthly_cost_cents)| FinOpsView { partition: partition.clone(), service, estimated_monthly_cost_cents, is_new_partition: is_new })
        .collect()
}

#[cfg(test)]
mod tests {
    use sentinel_core::CloudProvider;
    use sentinel_core::CustomerId;
    use sentinel_core::Finding;
    use sentinel_core::RuleSourceId;
    use sentinel_core::TenantId;
    use sentinel_core::Timestamp;

    use super::*;

    fn partition() -> PartitionKey {
        PartitionKey { customer_id: CustomerId::new("cust-1"), tenant_id: TenantId::new("tenant-1"), region: "*".to_string() }
    }

    fn finops_rule(id: &str, service: Option<&str>) -> Rule {
        Rule {
            id: RuleId::new(id),
            source_id: RuleSourceId::new("source-1"),
            cloud: CloudProvider::Aws,
            resource_type: "aws.ec2.instance".to_string(),
            name: id.to_string(),
            version: 1,
            severity: Severity::High,
            service_section: service.map(ToString::to_string),
            standards: vec![],
            mitre_techniques: vec![],
            tags: vec![FINOPS_TAG.to_string()],
            condition: serde_json::json!({}),
        }
    }

    fn finding(rule_id: &str, resource_id: &str, severity: Severity) -> Finding {
        Finding { rule_id: RuleId::new(rule_id), resource_id: resource_id.to_string(), region: "eu-west-1".to_string(), severity, first_seen: Timestamp::from_epoch_millis(0), last_seen: Timestamp::from_epoch_millis(0), evidence: serde_json::json!({}) }
    }

    #[test]
    fn non_finops_rules_are_excluded() {
        let mut rule = finops_rule("r1", Some("compute"));
        rule.tags.clear();
        let rules = HashMap::from([(RuleId::new("r1"), rule)]);
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "i-1", Severity::High)]);
        let views = compute_finops(partition(), &[shard], &rules, false);
        assert!(views.is_empty());
    }

    #[test]
    fn empty_service_bucket_is_suppressed() {
        let rule = finops_rule("r1", None);
        let rules = HashMap::from([(RuleId::new("r1"), rule)]);
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "i-1", Severity::High)]);
        let views = compute_finops(partition(), &[shard], &rules, false);
        assert!(views.is_empty());
    }

    #[test]
    fn cost_sums_by_service_section() {
        let rule = finops_rule("r1", Some("compute"));
        let rules = HashMap::from([(RuleId::new("r1"), rule)]);
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "i-1", Severity::High), finding("r1", "i-2", Severity::High)]);
        let views = compute_finops(partition(), &[shard], &rules, false);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].service, "compute");
        assert_eq!(views[0].estimated_monthly_cost_cents, 20_000);
    }
}
