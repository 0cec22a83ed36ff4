// crates/sentinel-metrics/src/project.rs
// ============================================================================
// Module: Project Metrics Stage
// Description: Stage 2 of the metrics pipeline — sums a tenant group's
// operational reports into one project-level report, counting resources
// shared by more than one tenant in the group only once.
// Purpose: Implement spec.md §4.9 stage 2.
// Dependencies: sentinel-core, crate::operational
// ============================================================================

//! ## Overview
//! A project groups a customer's tenants (e.g. every tenant belonging to one
//! business unit). [`compute_project`] sums the group's
//! [`crate::operational::OperationalReport`]s, using each report's
//! `violated_resource_ids` set to count cross-tenant resource overlap once
//! rather than once per tenant.

use std::collections::BTreeSet;

use sentinel_core::CustomerId;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::operational::Overview;

/// Stage 2 output: one tenant group's summed compliance posture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    /// Customer owning this tenant group.
    pub customer_id: CustomerId,
    /// Project (tenant group) name.
    pub project: String,
    /// Summed severity counts across every tenant in the group.
    pub overview: Overview,
    /// Distinct resources in violation across the whole group, deduplicated
    /// across tenants that share a resource.
    pub total_resources_violated: u64,
    /// Tenants contributing to this project.
    pub tenant_count: u64,
    /// Resources scanned, summed across the group.
    pub resources_scanned: u64,
    /// Timestamp this report was derived.
    pub computed_at: Timestamp,
}

/// Sums `reports` (one tenant group's operational reports) into a single
/// [`ProjectReport`]. A resource id appearing in more than one tenant's
/// `violated_resource_ids` is counted once toward
/// `total_resources_violated`, matching the "uniq-by-resource" aggregation
/// spec.md requires when rolling tenants up into a project.
#[must_use]
pub fn compute_project(customer_id: CustomerId, project: String, reports: &[crate::operational::OperationalReport], now: Timestamp) -> ProjectReport {
    let mut overview = Overview::default();
    let mut resources_scanned = 0u64;
    let mut violated: BTreeSet<&str> = BTreeSet::new();

    for report in reports {
        overview.info += report.overview.info;
        overview.low += report.overview.low;
        overview.medium += report.overview.medium;
        overview.high += report.overview.high;
        overview.critical += report.overview.critical;
        resources_scanned += report.resources_scanned;
        violated.extend(report.violated_resource_ids.iter().map(String::as_str));
    }
    overview.total_resources_violated = violated.len() as u64;

    ProjectReport {
        customer_id,
        project,
        total_resources_violated: violated.len() as u64,
        overview,
        tenant_count: reports.len() as u64,
        resources_scanned,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use sentinel_core::PartitionKey;
    use sentinel_core::TenantId;

    use super::*;
    use crate::operational::OperationalReport;

    fn report(tenant: &str, resource_ids: &[&str]) -> OperationalReport {
        OperationalReport {
            partition: PartitionKey { customer_id: CustomerId::new("cust-1"), tenant_id: TenantId::new(tenant), region: "*".to_string() },
            overview: Overview { high: resource_ids.len() as u64, total_resources_violated: resource_ids.len() as u64, ..Overview::default() },
            compliance: vec![],
            resources: vec![],
            rules: vec![],
            mitre: vec![],
            violated_resource_ids: resource_ids.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
            resources_scanned: 10,
            computed_at: Timestamp::from_epoch_millis(0),
        }
    }

    #[test]
    fn resources_shared_across_tenants_count_once() {
        let reports = vec![report("tenant-a", &["shared", "a-only"]), report("tenant-b", &["shared", "b-only"])];
        let project = compute_project(CustomerId::new("cust-1"), "team-platform".to_string(), &reports, Timestamp::from_epoch_millis(0));
        assert_eq!(project.total_resources_violated, 3);
        assert_eq!(project.tenant_count, 2);
    }

    #[test]
    fn severity_counts_sum_without_deduplication() {
        let reports = vec![report("tenant-a", &["shared"]), report("tenant-b", &["shared"])];
        let project = compute_project(CustomerId::new("cust-1"), "team-platform".to_string(), &reports, Timestamp::from_epoch_millis(0));
        assert_eq!(project.overview.high, 2);
    }
}
