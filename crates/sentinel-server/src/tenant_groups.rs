// crates/sentinel-server/src/tenant_groups.rs
// ============================================================================
// Module: Tenant Group Map
// Description: Configured project/department grouping for the metrics
// pipeline's roll-up stages.
// Purpose: Give `run_metrics_and_delivery_tick` a real, operator-declared
// project/department for each tenant, since neither `Tenant` nor `Customer`
// stores one.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! A project is a user-defined cluster of tenants, not something derivable
//! from a tenant's own identifier. [`TenantGroupMap`] is configuration, not
//! derived state: a platform operator declares which project each tenant
//! belongs to and which department each project rolls up under, mirroring
//! how [`sentinel_events::EventRuleMap`] declares event-name-to-rule
//! mappings. A tenant or project absent from the map falls back to being its
//! own ungrouped project/department, so the metrics pipeline still runs
//! (just without cross-tenant dedup) before an operator seeds the mapping.

use std::collections::HashMap;

use sentinel_core::TenantId;

/// Department every ungrouped project rolls up under.
const DEFAULT_DEPARTMENT: &str = "unassigned";

/// Operator-declared tenant-to-project and project-to-department grouping.
#[derive(Debug, Clone, Default)]
pub struct TenantGroupMap {
    project_by_tenant: HashMap<TenantId, String>,
    department_by_project: HashMap<String, String>,
}

impl TenantGroupMap {
    /// Builds a map from `(tenant_id, project)` and `(project, department)`
    /// configuration entries.
    #[must_use]
    pub fn new(projects: impl IntoIterator<Item = (TenantId, String)>, departments: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { project_by_tenant: projects.into_iter().collect(), department_by_project: departments.into_iter().collect() }
    }

    /// Returns the project `tenant_id` is grouped under, falling back to the
    /// tenant's own id (an ungrouped, single-tenant project) if the operator
    /// has not assigned one.
    #[must_use]
    pub fn project_for(&self, tenant_id: &TenantId) -> String {
        self.project_by_tenant.get(tenant_id).cloned().unwrap_or_else(|| tenant_id.as_str().to_string())
    }

    /// Returns the department `project` rolls up under, falling back to
    /// [`DEFAULT_DEPARTMENT`] if the operator has not assigned one.
    #[must_use]
    pub fn department_for(&self, project: &str) -> String {
        self.department_by_project.get(project).cloned().unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_tenant_is_its_own_project() {
        let map = TenantGroupMap::default();
        assert_eq!(map.project_for(&TenantId::new("tenant-a")), "tenant-a");
    }

    #[test]
    fn mapped_tenant_resolves_to_its_configured_project() {
        let map = TenantGroupMap::new([(TenantId::new("tenant-a"), "team-platform".to_string())], []);
        assert_eq!(map.project_for(&TenantId::new("tenant-a")), "team-platform");
    }

    #[test]
    fn unmapped_project_falls_back_to_default_department() {
        let map = TenantGroupMap::default();
        assert_eq!(map.department_for("team-platform"), DEFAULT_DEPARTMENT);
    }

    #[test]
    fn mapped_project_resolves_to_its_configured_department() {
        let map = TenantGroupMap::new([], [("team-platform".to_string(), "engineering".to_string())]);
        assert_eq!(map.department_for("team-platform"), "engineering");
    }

    #[test]
    fn two_tenants_sharing_a_configured_project_group_together() {
        let map = TenantGroupMap::new(
            [(TenantId::new("tenant-a"), "team-platform".to_string()), (TenantId::new("tenant-b"), "team-platform".to_string())],
            [],
        );
        assert_eq!(map.project_for(&TenantId::new("tenant-a")), map.project_for(&TenantId::new("tenant-b")));
    }
}
