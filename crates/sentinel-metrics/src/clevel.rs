// crates/sentinel-metrics/src/clevel.rs
// ============================================================================
// Module: C-Level Metrics Stage
// Description: Stage 4 of the metrics pipeline — an executive overview built
// from pre-computed weekly job statistics rather than re-reading shards.
// Purpose: Implement spec.md §4.9 stage 4.
// Dependencies: sentinel-core, crate::department
// ============================================================================

//! ## Overview
//! The C-level stage is deliberately cheap: instead of re-deriving posture
//! from shards, it reduces the week's already-accumulated
//! [`sentinel_core::JobStatistics`] per customer alongside the department
//! rankings, giving an executive view that costs one pass over job records
//! rather than a re-scan of every tenant's findings.

use sentinel_core::CustomerId;
use sentinel_core::JobStatistics;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::department::DepartmentReport;

/// Stage 4 output: one customer's executive compliance overview for a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CLevelReport {
    /// Customer this overview covers.
    pub customer_id: CustomerId,
    /// Jobs run this week, summed across every tenant.
    pub jobs_run: u64,
    /// Resources scanned this week, summed across every tenant's jobs.
    pub resources_scanned: u64,
    /// Findings produced this week, summed across every tenant's jobs.
    pub findings_produced: u64,
    /// Regions that failed at least once this week, summed across jobs.
    pub regions_failed: u64,
    /// Department rankings for the week.
    pub departments: Vec<DepartmentReport>,
    /// Timestamp this report was derived.
    pub computed_at: Timestamp,
}

/// Reduces a customer's weekly job statistics (one entry per completed job)
/// and department rankings into a [`CLevelReport`]. Takes already-accumulated
/// [`JobStatistics`] rather than shards, since the week's numbers were
/// already computed as each job finished.
#[must_use]
pub fn compute_clevel(customer_id: CustomerId, weekly_job_statistics: &[JobStatistics], departments: Vec<DepartmentReport>, now: Timestamp) -> CLevelReport {
    let mut totals = JobStatistics::default();
    for stats in weekly_job_statistics {
        totals.accumulate(*stats);
    }

    CLevelReport {
        customer_id,
        jobs_run: weekly_job_statistics.len() as u64,
        resources_scanned: totals.resources_scanned,
        findings_produced: totals.findings_produced,
        regions_failed: u64::from(totals.regions_failed),
        departments,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_job_statistics_across_the_week() {
        let stats = vec![
            JobStatistics { resources_scanned: 10, findings_produced: 2, regions_failed: 0, ..JobStatistics::default() },
            JobStatistics { resources_scanned: 20, findings_produced: 3, regions_failed: 1, ..JobStatistics::default() },
        ];
        let report = compute_clevel(CustomerId::new("cust-1"), &stats, vec![], Timestamp::from_epoch_millis(0));
        assert_eq!(report.jobs_run, 2);
        assert_eq!(report.resources_scanned, 30);
        assert_eq!(report.findings_produced, 5);
        assert_eq!(report.regions_failed, 1);
    }

    #[test]
    fn empty_week_produces_zeroed_report() {
        let report = compute_clevel(CustomerId::new("cust-1"), &[], vec![], Timestamp::from_epoch_millis(0));
        assert_eq!(report.jobs_run, 0);
        assert_eq!(report.resources_scanned, 0);
    }
}
