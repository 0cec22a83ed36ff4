// crates/sentinel-worker/src/pipeline.rs
// ============================================================================
// Module: Region Pipeline
// Description: Runs one region's scan: enumerate, evaluate, shard, and
// statistics.
// Purpose: Implement the per-region steps of the worker runtime contract.
// Dependencies: sentinel-core, sentinel-rules, crate::{provider,
// shard_builder}
// ============================================================================

//! ## Overview
//! [`RegionPipeline::run`] executes the five-step per-region pipeline from
//! `spec.md` §4.6 for every rule in a ruleset: enumerate resources, evaluate
//! the rule's condition tree against each, record findings, and accumulate
//! [`JobStatistics`]. Rule-local failures (a single enumeration error) are
//! recorded and skipped; a region-fatal failure stops the loop early and
//! reports the corresponding [`WorkerExitCode`]. Cancellation is polled at
//! every rule boundary and every `suspension_interval` resources, matching
//! the cooperative single-threaded scheduling model within a region.

use std::collections::HashMap;

use sentinel_core::CloudProvider;
use sentinel_core::Finding;
use sentinel_core::JobStatistics;
use sentinel_core::Rule;
use sentinel_core::Timestamp;
use sentinel_core::WorkerExitCode;
use sentinel_credentials::ResolvedCredentials;
use tokio_util::sync::CancellationToken;

use crate::provider::CloudResourceProvider;
use crate::provider::RegionFailureClass;
use crate::provider::resource_identifier;
use crate::shard_builder::ShardBuilder;

/// Tuning knobs for one [`RegionPipeline::run`] call.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Check cancellation after this many resources within a rule, in
    /// addition to the check already performed at every rule boundary.
    pub suspension_interval: usize,
    /// Number of physical shard buckets findings are grouped into.
    pub shard_count: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { suspension_interval: 500, shard_count: 64 }
    }
}

/// Class of error recorded against one rule's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleErrorClass {
    /// The rule's condition tree failed to parse.
    MalformedCondition,
    /// Resource enumeration for this rule failed (rule-local).
    EnumerationFailure,
}

/// Per-rule execution counters, rolled up into the region's [`JobStatistics`].
#[derive(Debug, Clone, Default)]
pub struct RuleExecutionStats {
    /// Rule this row covers.
    pub rule_id: String,
    /// Resources evaluated against this rule.
    pub resources_scanned: u64,
    /// Findings produced by this rule.
    pub findings_produced: u64,
    /// Whether this rule completed without error.
    pub succeeded: bool,
    /// Errors recorded for this rule, by class.
    pub errors: HashMap<RuleErrorClass, u32>,
}

/// Outcome of one region's pipeline run.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    /// Observable exit code for this region.
    pub exit_code: WorkerExitCode,
    /// Shards produced, paired with their physical bucket number.
    pub shards: Vec<(u32, sentinel_core::Shard)>,
    /// Aggregate statistics for this region.
    pub statistics: JobStatistics,
    /// Per-rule statistics rows, in rule evaluation order.
    pub rule_statistics: Vec<RuleExecutionStats>,
}

/// Executes the per-region scan pipeline against a ruleset.
pub struct RegionPipeline<'a, P: CloudResourceProvider> {
    provider: &'a P,
    config: PipelineConfig,
}

impl<'a, P: CloudResourceProvider> RegionPipeline<'a, P> {
    /// Creates a pipeline against `provider`.
    #[must_use]
    pub fn new(provider: &'a P, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    /// Runs every rule in `rules` against `region`, returning the region's
    /// outcome. Stops early on a region-fatal enumeration error or on
    /// cancellation.
    pub async fn run(&self, cloud: CloudProvider, region: &str, rules: &[Rule], credentials: &ResolvedCredentials, cancellation: &CancellationToken, now: Timestamp) -> RegionOutcome {
        let mut builder = ShardBuilder::new(region, self.config.shard_count);
        let mut statistics = JobStatistics::default();
        let mut rule_statistics = Vec::with_capacity(rules.len());
        let started_at = now;

        for rule in rules {
            if cancellation.is_cancelled() {
                break;
            }

            let mut row = RuleExecutionStats { rule_id: rule.id.as_str().to_string(), succeeded: true, ..RuleExecutionStats::default() };

            let requirement = match sentinel_rules::parse_condition(&rule.condition) {
                Ok(requirement) => requirement,
                Err(err) => {
                    tracing::warn!(rule_id = %rule.id, error = %err, "rule condition failed to parse");
                    record_error(&mut row, RuleErrorClass::MalformedCondition);
                    statistics.rules_evaluated += 1;
                    rule_statistics.push(row);
                    continue;
                }
            };

            let resources = match self.provider.enumerate(cloud, region, &rule.resource_type, credentials).await {
                Ok(resources) => resources,
                Err(err) => {
                    if let RegionFailureClass::Fatal(exit_code) = crate::provider::RegionFailure::classify(&err) {
                        tracing::error!(region, error = %err, "region-fatal enumeration failure");
                        statistics.regions_failed = 1;
                        return RegionOutcome { exit_code, shards: builder.build(), statistics, rule_statistics };
                    }
                    tracing::warn!(rule_id = %rule.id, error = %err, "resource enumeration failed for rule");
                    record_error(&mut row, RuleErrorClass::EnumerationFailure);
                    statistics.rules_evaluated += 1;
                    rule_statistics.push(row);
                    continue;
                }
            };

            for (index, resource) in resources.iter().enumerate() {
                if index > 0 && index % self.config.suspension_interval == 0 && cancellation.is_cancelled() {
                    break;
                }
                row.resources_scanned += 1;
                if sentinel_rules::evaluate(&requirement, resource) == ret_logic::TriState::True {
                    let finding = Finding {
                        rule_id: rule.id.clone(),
                        resource_id: resource_identifier(resource).unwrap_or_default().to_string(),
                        region: region.to_string(),
                        severity: rule.severity,
                        first_seen: now,
                        last_seen: now,
                        evidence: resource.clone(),
                    };
                    row.findings_produced += 1;
                    builder.record(finding);
                }
            }

            builder.touch(rule.id.clone());
            statistics.resources_scanned += row.resources_scanned;
            statistics.findings_produced += row.findings_produced;
            statistics.rules_evaluated += 1;
            rule_statistics.push(row);
        }

        statistics.duration_ms = now.seconds_since(started_at).unsigned_abs() * 1000;
        statistics.regions_succeeded = 1;
        RegionOutcome { exit_code: WorkerExitCode::Success, shards: builder.build(), statistics, rule_statistics }
    }
}

fn record_error(row: &mut RuleExecutionStats, class: RuleErrorClass) {
    row.succeeded = false;
    *row.errors.entry(class).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sentinel_core::CloudProvider;
    use sentinel_core::RuleId;
    use sentinel_core::RuleSourceId;
    use sentinel_core::Severity;
    use sentinel_core::WorkerExitCode;
    use serde_json::Value;
    use serde_json::json;

    use super::*;
    use crate::provider::RegionFailure;

    #[derive(Debug, thiserror::Error)]
    enum FakeError {
        #[error("auth failure")]
        Auth,
    }

    impl RegionFailure for FakeError {
        fn classify(&self) -> RegionFailureClass {
            RegionFailureClass::Fatal(WorkerExitCode::RetryableCredentialFailure)
        }
    }

    struct FakeProvider {
        resources: Vec<Value>,
        fail: bool,
    }

    #[async_trait]
    impl CloudResourceProvider for FakeProvider {
        type Error = FakeError;

        async fn enumerate(&self, _cloud: CloudProvider, _region: &str, _resource_type: &str, _credentials: &ResolvedCredentials) -> Result<Vec<Value>, Self::Error> {
            if self.fail {
                return Err(FakeError::Auth);
            }
            Ok(self.resources.clone())
        }
    }

    fn rule(id: &str, condition: Value) -> Rule {
        Rule {
            id: RuleId::new(id),
            source_id: RuleSourceId::new("source-1"),
            cloud: CloudProvider::Aws,
            resource_type: "aws.s3.bucket".to_string(),
            name: "public bucket".to_string(),
            version: 1,
            severity: Severity::High,
            service_section: None,
            standards: Vec::new(),
            mitre_techniques: Vec::new(),
            tags: Vec::new(),
            condition,
        }
    }

    #[tokio::test]
    async fn matching_resource_produces_a_finding() {
        let provider = FakeProvider { resources: vec![json!({"id": "bucket-a", "public": true})], fail: false };
        let pipeline = RegionPipeline::new(&provider, PipelineConfig::default());
        let rules = vec![rule("r1", json!({"predicate": {"path": "public", "op": "is_true"}}))];
        let outcome = pipeline
            .run(CloudProvider::Aws, "eu-west-1", &rules, &ResolvedCredentials::InstanceDefault, &CancellationToken::new(), Timestamp::from_epoch_millis(0))
            .await;
        assert_eq!(outcome.exit_code, WorkerExitCode::Success);
        assert_eq!(outcome.statistics.findings_produced, 1);
        assert_eq!(outcome.shards.len(), 1);
    }

    #[tokio::test]
    async fn fatal_enumeration_error_aborts_the_region() {
        let provider = FakeProvider { resources: vec![], fail: true };
        let pipeline = RegionPipeline::new(&provider, PipelineConfig::default());
        let rules = vec![rule("r1", json!({"predicate": {"path": "public", "op": "is_true"}}))];
        let outcome = pipeline
            .run(CloudProvider::Aws, "eu-west-1", &rules, &ResolvedCredentials::InstanceDefault, &CancellationToken::new(), Timestamp::from_epoch_millis(0))
            .await;
        assert_eq!(outcome.exit_code, WorkerExitCode::RetryableCredentialFailure);
        assert_eq!(outcome.statistics.regions_failed, 1);
    }

    #[tokio::test]
    async fn non_matching_resource_produces_no_finding() {
        let provider = FakeProvider { resources: vec![json!({"id": "bucket-a", "public": false})], fail: false };
        let pipeline = RegionPipeline::new(&provider, PipelineConfig::default());
        let rules = vec![rule("r1", json!({"predicate": {"path": "public", "op": "is_true"}}))];
        let outcome = pipeline
            .run(CloudProvider::Aws, "eu-west-1", &rules, &ResolvedCredentials::InstanceDefault, &CancellationToken::new(), Timestamp::from_epoch_millis(0))
            .await;
        assert_eq!(outcome.statistics.findings_produced, 0);
        // The rule still ran to completion, so it must still produce an
        // (empty) shard: this is what lets a prior violation be recorded as
        // remediated once a later run finds the resource compliant.
        assert_eq!(outcome.shards.len(), 1);
        assert!(outcome.shards[0].1.findings.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_any_rule_yields_empty_outcome() {
        let provider = FakeProvider { resources: vec![json!({"id": "bucket-a", "public": true})], fail: false };
        let pipeline = RegionPipeline::new(&provider, PipelineConfig::default());
        let rules = vec![rule("r1", json!({"predicate": {"path": "public", "op": "is_true"}}))];
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let outcome = pipeline.run(CloudProvider::Aws, "eu-west-1", &rules, &ResolvedCredentials::InstanceDefault, &cancellation, Timestamp::from_epoch_millis(0)).await;
        assert_eq!(outcome.statistics.rules_evaluated, 0);
    }
}
