// crates/sentinel-metrics/src/operational.rs
// ============================================================================
// Module: Operational Metrics Stage
// Description: Stage 1 of the metrics pipeline — reduces one tenant's
// findings shards into per-tenant OVERVIEW, COMPLIANCE, RESOURCES, RULES,
// and MITRE views.
// Purpose: Implement spec.md §4.9 stage 1 as a pure stage(in) -> out
// function.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`compute_operational`] is the pipeline's first stage: it consumes every
//! live [`sentinel_core::Shard`] for one tenant plus the [`sentinel_core::Rule`]
//! metadata those shards' findings reference, and reduces them into one
//! [`OperationalReport`]. Every later stage consumes only this report's
//! output, never the raw shards again.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use sentinel_core::PartitionKey;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::Severity;
use sentinel_core::Shard;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

/// Counts by severity, and the number of distinct resources in violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    /// Open findings at `Severity::Info`.
    pub info: u64,
    /// Open findings at `Severity::Low`.
    pub low: u64,
    /// Open findings at `Severity::Medium`.
    pub medium: u64,
    /// Open findings at `Severity::High`.
    pub high: u64,
    /// Open findings at `Severity::Critical`.
    pub critical: u64,
    /// Distinct resources carrying at least one open finding.
    pub total_resources_violated: u64,
}

/// Weighted coverage of one compliance standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardCoverage {
    /// Standard name (e.g. `cis-aws-1.4`).
    pub standard: String,
    /// Resources this standard's rules evaluated that carry no open finding.
    pub resources_compliant: u64,
    /// Resources this standard's rules evaluated.
    pub resources_scanned: u64,
}

impl StandardCoverage {
    /// Fraction of evaluated resources free of an open finding, `0.0` when
    /// no resources were evaluated.
    #[must_use]
    pub fn coverage_ratio(&self) -> f64 {
        if self.resources_scanned == 0 {
            return 0.0;
        }
        self.resources_compliant as f64 / self.resources_scanned as f64
    }
}

/// Open findings grouped by the resource type a rule targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeAggregate {
    /// Resource type (e.g. `aws.s3.bucket`).
    pub resource_type: String,
    /// Open findings against this resource type.
    pub open_findings: u64,
}

/// Per-rule aggregate of its open findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAggregate {
    /// Rule these findings belong to.
    pub rule_id: RuleId,
    /// Total open findings for this rule.
    pub open_findings: u64,
    /// Open findings at critical severity for this rule.
    pub critical_findings: u64,
}

/// Open findings attributed to one MITRE ATT&CK technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitreAttribution {
    /// MITRE technique identifier.
    pub technique: String,
    /// Open findings whose rule maps to this technique.
    pub open_findings: u64,
}

/// Stage 1 output: one tenant's operational compliance posture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalReport {
    /// Partition this report was computed for.
    pub partition: PartitionKey,
    /// Severity and violated-resource counts.
    pub overview: Overview,
    /// Per-standard weighted coverage.
    pub compliance: Vec<StandardCoverage>,
    /// Open findings grouped by resource type.
    pub resources: Vec<ResourceTypeAggregate>,
    /// Per-rule open-finding aggregates.
    pub rules: Vec<RuleAggregate>,
    /// MITRE tactic/technique attribution.
    pub mitre: Vec<MitreAttribution>,
    /// Distinct resource ids carrying an open finding, carried upward so
    /// stage 2 can sum uniq-by-resource across a project's tenants.
    pub violated_resource_ids: BTreeSet<String>,
    /// Resources scanned this run, across every rule.
    pub resources_scanned: u64,
    /// Timestamp this report was derived.
    pub computed_at: Timestamp,
}

/// Reduces `shards` (every live shard for one tenant) into an
/// [`OperationalReport`], resolving each finding's owning rule through
/// `rules_by_id`. Findings whose rule is missing from `rules_by_id` (a rule
/// retired since the finding was recorded) are counted in the overview but
/// excluded from per-rule and resource-type breakdowns.
#[must_use]
pub fn compute_operational(partition: PartitionKey, shards: &[Shard], rules_by_id: &HashMap<RuleId, Rule>, resources_scanned: u64, now: Timestamp) -> OperationalReport {
    let mut overview = Overview::default();
    let mut violated_resource_ids = BTreeSet::new();
    let mut by_resource_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_rule: BTreeMap<RuleId, RuleAggregate> = BTreeMap::new();
    let mut by_technique: BTreeMap<String, u64> = BTreeMap::new();
    let mut standards_scanned: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut standards_violated: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for shard in shards {
        for finding in &shard.findings {
            violated_resource_ids.insert(finding.resource_id.clone());
            count_severity(&mut overview, finding.severity);

            let Some(rule) = rules_by_id.get(&finding.rule_id) else {
                continue;
            };

            *by_resource_type.entry(rule.resource_type.clone()).or_default() += 1;

            let aggregate = by_rule.entry(finding.rule_id.clone()).or_insert_with(|| RuleAggregate { rule_id: finding.rule_id.clone(), open_findings: 0, critical_findings: 0 });
            aggregate.open_findings += 1;
            if finding.severity == Severity::Critical {
                aggregate.critical_findings += 1;
            }

            for technique in &rule.mitre_techniques {
                *by_technique.entry(technique.clone()).or_default() += 1;
            }

            for standard in &rule.standards {
                standards_violated.entry(standard.clone()).or_default().insert(finding.resource_id.clone());
            }
        }
    }

    for rule in rules_by_id.values() {
        for standard in &rule.standards {
            standards_scanned.entry(standard.clone()).or_default();
        }
    }
    for (standard, violated) in &standards_violated {
        standards_scanned.entry(standard.clone()).or_default().extend(violated.iter().cloned());
    }

    overview.total_resources_violated = violated_resource_ids.len() as u64;

    let compliance = standards_scanned
        .into_iter()
        .map(|(standard, resources)| {
            let violated = standards_violated.get(&standard).map(BTreeSet::len).unwrap_or(0) as u64;
            let scanned = resources.len() as u64;
            StandardCoverage { standard, resources_compliant: scanned.saturating_sub(violated), resources_scanned: scanned }
        })
        .collect();

    OperationalReport {
        partition,
        overview,
        compliance,
        resources: by_resource_type.into_iter().map(|(resource_type, open_findings)| ResourceTypeAggregate { resource_type, open_findings }).collect(),
        rules: by_rule.into_values().collect(),
        mitre: by_technique.into_iter().map(|(technique, open_findings)| MitreAttribution { technique, open_findings }).collect(),
        violated_resource_ids,
        resources_scanned,
        computed_at: now,
    }
}

fn count_severity(overview: &mut Overview, severity: Severity) {
    match severity {
        Severity::Info => overview.info += 1,
        Severity::Low => overview.low += 1,
        Severity::Medium => overview.medium += 1,
        Severity::High => overview.high += 1,
        Severity::Critical => overview.critical += 1,
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::CloudProvider;
    use sentinel_core::CustomerId;
    use sentinel_core::Finding;
    use sentinel_core::RuleSourceId;
    use sentinel_core::TenantId;

    use super::*;

    fn rule(id: &str, resource_type: &str, standard: &str) -> Rule {
        Rule {
            id: RuleId::new(id),
            source_id: RuleSourceId::new("source-1"),
            cloud: CloudProvider::Aws,
            resource_type: resource_type.to_string(),
            name: id.to_string(),
            version: 1,
            severity: Severity::High,
            service_section: Some("storage".to_string()),
            standards: vec![standard.to_string()],
            mitre_techniques: vec!["T1530".to_string()],
            tags: vec![],
            condition: serde_json::json!({}),
        }
    }

    fn finding(rule_id: &str, resource_id: &str, severity: Severity) -> Finding {
        Finding { rule_id: RuleId::new(rule_id), resource_id: resource_id.to_string(), region: "eu-west-1".to_string(), severity, first_seen: Timestamp::from_epoch_millis(0), last_seen: Timestamp::from_epoch_millis(0), evidence: serde_json::json!({}) }
    }

    fn partition() -> PartitionKey {
        PartitionKey { customer_id: CustomerId::new("cust-1"), tenant_id: TenantId::new("tenant-1"), region: "eu-west-1".to_string() }
    }

    #[test]
    fn overview_counts_findings_by_severity() {
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "bucket-a", Severity::Critical), finding("r1", "bucket-b", Severity::High)]);
        let rules = HashMap::from([(RuleId::new("r1"), rule("r1", "aws.s3.bucket", "cis-aws-1.4"))]);
        let report = compute_operational(partition(), &[shard], &rules, 10, Timestamp::from_epoch_millis(0));
        assert_eq!(report.overview.critical, 1);
        assert_eq!(report.overview.high, 1);
        assert_eq!(report.overview.total_resources_violated, 2);
    }

    #[test]
    fn resources_and_rules_group_by_rule_metadata() {
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "bucket-a", Severity::High), finding("r1", "bucket-b", Severity::High)]);
        let rules = HashMap::from([(RuleId::new("r1"), rule("r1", "aws.s3.bucket", "cis-aws-1.4"))]);
        let report = compute_operational(partition(), &[shard], &rules, 10, Timestamp::from_epoch_millis(0));
        assert_eq!(report.resources, vec![ResourceTypeAggregate { resource_type: "aws.s3.bucket".to_string(), open_findings: 2 }]);
        assert_eq!(report.rules[0].open_findings, 2);
    }

    #[test]
    fn compliance_coverage_counts_scanned_resources_as_non_violating() {
        let rule_a = rule("r1", "aws.s3.bucket", "cis-aws-1.4");
        let rules = HashMap::from([(RuleId::new("r1"), rule_a)]);
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "bucket-a", Severity::High)]);
        let report = compute_operational(partition(), &[shard], &rules, 10, Timestamp::from_epoch_millis(0));
        let coverage = report.compliance.iter().find(|c| c.standard == "cis-aws-1.4").expect("coverage entry");
        assert_eq!(coverage.resources_scanned, 1);
        assert_eq!(coverage.resources_compliant, 0);
    }

    #[test]
    fn mitre_attribution_sums_findings_by_technique() {
        let rules = HashMap::from([(RuleId::new("r1"), rule("r1", "aws.s3.bucket", "cis-aws-1.4"))]);
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("r1", "bucket-a", Severity::High), finding("r1", "bucket-b", Severity::High)]);
        let report = compute_operational(partition(), &[shard], &rules, 10, Timestamp::from_epoch_millis(0));
        assert_eq!(report.mitre, vec![MitreAttribution { technique: "T1530".to_string(), open_findings: 2 }]);
    }
}
