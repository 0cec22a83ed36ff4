// crates/sentinel-core/src/metric.rs
// ============================================================================
// Module: Sentinel Metric Records
// Description: Metrics pipeline entities: raw records, delta fields, and the
// FinOps / Kubernetes derived views.
// Purpose: Shared data model for the Metrics Pipeline crate's seven stages.
// Dependencies: serde, sentinel_core::{identifiers, time}
// ============================================================================

//! ## Overview
//! A [`MetricRecord`] is one partition's worth (`PartitionKey`) of compliance
//! counters for a single job. [`MetricDelta`] captures field-wise change
//! against the immediately preceding record for the same partition, computed
//! once per stage rather than re-derived by every consumer.

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CustomerId;
use crate::identifiers::TenantId;
use crate::time::Timestamp;

/// Grouping key a metrics pipeline stage fans out over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Target tenant.
    pub tenant_id: TenantId,
    /// Region, or `"*"` for a tenant-wide aggregate partition.
    pub region: String,
}

/// Raw per-partition counters produced after shard ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Total findings open at the end of the run.
    pub open_findings: u64,
    /// Findings remediated since the prior run.
    pub remediated_findings: u64,
    /// Critical-severity findings open at the end of the run.
    pub critical_findings: u64,
    /// Resources scanned.
    pub resources_scanned: u64,
    /// Timestamp the record was derived.
    pub computed_at: Timestamp,
}

/// Field-wise change between two [`MetricRecord`]s for the same partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricDelta {
    /// Change in open findings (may be negative).
    pub open_findings_delta: i64,
    /// Change in remediated findings (may be negative).
    pub remediated_findings_delta: i64,
    /// Change in critical findings (may be negative).
    pub critical_findings_delta: i64,
}

impl MetricDelta {
    /// Computes the field-wise delta of `current` against `previous`.
    ///
    /// When `previous` is `None` (first record ever seen for this partition)
    /// the delta is reported as the absolute value of `current`, matching the
    /// zero-baseline decision recorded in `DESIGN.md`.
    #[must_use]
    pub fn compute(current: MetricRecord, previous: Option<MetricRecord>) -> Self {
        let baseline = previous.unwrap_or_default();
        Self {
            open_findings_delta: i64::try_from(current.open_findings).unwrap_or(i64::MAX)
                - i64::try_from(baseline.open_findings).unwrap_or(i64::MAX),
            remediated_findings_delta: i64::try_from(current.remediated_findings).unwrap_or(i64::MAX)
                - i64::try_from(baseline.remediated_findings).unwrap_or(i64::MAX),
            critical_findings_delta: i64::try_from(current.critical_findings).unwrap_or(i64::MAX)
                - i64::try_from(baseline.critical_findings).unwrap_or(i64::MAX),
        }
    }
}

/// FinOps-oriented derived view: estimated monthly cost exposure of open
/// findings by resource category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinOpsView {
    /// Partition this view was derived for.
    pub partition: PartitionKey,
    /// Service bucket this cost estimate is scoped to (a rule's
    /// `service_section`); views with an empty bucket are suppressed by the
    /// metrics pipeline rather than reported as unattributed.
    pub service: String,
    /// Estimated monthly cost, in USD cents, attributable to open findings.
    pub estimated_monthly_cost_cents: u64,
    /// Whether this is the partition's first-ever record (no prior baseline).
    pub is_new_partition: bool,
}

/// Kubernetes-oriented derived view: compliance counters scoped to cluster
/// workloads rather than cloud-account resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesView {
    /// Partition this view was derived for.
    pub partition: PartitionKey,
    /// Namespaces with at least one open critical finding.
    pub namespaces_at_risk: Vec<String>,
    /// Open findings scoped to workload resource types (Pod, Deployment, …).
    pub workload_findings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_absolute_value_against_zero_baseline() {
        let current = MetricRecord { open_findings: 7, ..MetricRecord::default() };
        let delta = MetricDelta::compute(current, None);
        assert_eq!(delta.open_findings_delta, 7);
    }

    #[test]
    fn delta_reflects_decrease_in_open_findings() {
        let previous = MetricRecord { open_findings: 10, ..MetricRecord::default() };
        let current = MetricRecord { open_findings: 6, ..MetricRecord::default() };
        let delta = MetricDelta::compute(current, Some(previous));
        assert_eq!(delta.open_findings_delta, -4);
    }
}
