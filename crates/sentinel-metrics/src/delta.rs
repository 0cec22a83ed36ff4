// crates/sentinel-metrics/src/delta.rs
// ============================================================================
// Module: Delta Metrics Stage
// Description: Stage 5 of the metrics pipeline — change against the prior
// completed week for the same partition.
// Purpose: Implement spec.md §4.9 stage 5.
// Dependencies: sentinel-core, crate::operational
// ============================================================================

//! ## Overview
//! Stage 5 folds one partition's current [`crate::operational::OperationalReport`]
//! into a [`sentinel_core::MetricRecord`] and diffs it against the prior
//! completed week's record via [`sentinel_core::MetricDelta::compute`].
//! Fields missing on either side (a partition with no record for the prior
//! week, or a rule retired since then) default to zero rather than being
//! excluded from the diff; compliance-coverage percentages recompute on the
//! combined denominator of both weeks rather than diffing the two
//! percentages directly, so a swing in sample size alone cannot be
//! mistaken for a swing in compliance.

use sentinel_core::MetricDelta;
use sentinel_core::MetricRecord;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::operational::OperationalReport;

/// Converts one tenant's [`OperationalReport`] into the raw counters
/// [`MetricDelta`] diffs.
#[must_use]
pub fn to_metric_record(report: &OperationalReport, now: Timestamp) -> MetricRecord {
    MetricRecord {
        open_findings: report.overview.info + report.overview.low + report.overview.medium + report.overview.high + report.overview.critical,
        remediated_findings: 0,
        critical_findings: report.overview.critical,
        resources_scanned: report.resources_scanned,
        computed_at: now,
    }
}

/// Stage 5 output: this week's counters alongside their change from the
/// prior completed week, and the recomputed combined-denominator compliance
/// percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaReport {
    /// This week's counters.
    pub current: MetricRecord,
    /// Field-wise change against the prior completed week.
    pub delta: MetricDelta,
    /// Compliant resources recomputed over both weeks' combined denominator.
    pub combined_coverage_ratio: f64,
}

/// Computes `current`'s delta against `previous` (`None` when this partition
/// has no record for the prior completed week), and recomputes the
/// compliance-coverage ratio over the combined resource count of both weeks
/// rather than the weighted average of two independently-computed
/// percentages.
#[must_use]
pub fn compute_delta(current: MetricRecord, previous: Option<MetricRecord>, current_resources_compliant: u64, previous_resources_compliant: u64) -> DeltaReport {
    let delta = MetricDelta::compute(current, previous);
    let previous = previous.unwrap_or_default();
    let combined_scanned = current.resources_scanned + previous.resources_scanned;
    let combined_compliant = current_resources_compliant + previous_resources_compliant;
    let combined_coverage_ratio = if combined_scanned == 0 { 0.0 } else { combined_compliant as f64 / combined_scanned as f64 };

    DeltaReport { current, delta, combined_coverage_ratio }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prior_record_defaults_baseline_to_zero() {
        let current = MetricRecord { open_findings: 5, resources_scanned: 20, ..MetricRecord::default() };
        let report = compute_delta(current, None, 15, 0);
        assert_eq!(report.delta.open_findings_delta, 5);
        assert!((report.combined_coverage_ratio - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn combined_denominator_recomputes_coverage_across_both_weeks() {
        let previous = MetricRecord { resources_scanned: 10, ..MetricRecord::default() };
        let current = MetricRecord { resources_scanned: 10, ..MetricRecord::default() };
        let report = compute_delta(current, Some(previous), 8, 6);
        assert!((report.combined_coverage_ratio - 0.7).abs() < f64::EPSILON);
    }
}
