// crates/sentinel-jobs/src/lock.rs
// ============================================================================
// Module: Tenant Job Lock
// Description: In-process conditional lock enforcing one running job per
// tenant.
// Purpose: Stand in for the row-level conditional write on
// `tenants.current_job == null` against a single-node deployment.
// Dependencies: sentinel-core, tokio
// ============================================================================

//! ## Overview
//! [`TenantLockTable`] mirrors the conditional-write semantics a
//! document-store-backed deployment would get from a compare-and-swap on
//! `tenants.current_job`: `try_acquire` fails closed (returns `Conflict`)
//! rather than queuing, and `release` is unconditional so a terminal
//! transition always frees the tenant even if the in-memory map drifted.

use std::collections::HashMap;

use sentinel_core::JobId;
use sentinel_core::TenantId;
use thiserror::Error;
use tokio::sync::Mutex;

/// Raised when a tenant already has a job running.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("tenant {tenant_id} already has job {running_job_id} in flight")]
pub struct TenantLockConflict {
    /// Tenant that was already locked.
    pub tenant_id: TenantId,
    /// Job currently holding the lock.
    pub running_job_id: JobId,
}

/// Tracks at most one in-flight job per tenant.
#[derive(Default)]
pub struct TenantLockTable {
    held: Mutex<HashMap<TenantId, JobId>>,
}

impl TenantLockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `tenant_id` on behalf of `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TenantLockConflict`] when the tenant already holds a lock.
    pub async fn try_acquire(&self, tenant_id: &TenantId, job_id: &JobId) -> Result<(), TenantLockConflict> {
        let mut held = self.held.lock().await;
        if let Some(running_job_id) = held.get(tenant_id) {
            return Err(TenantLockConflict { tenant_id: tenant_id.clone(), running_job_id: running_job_id.clone() });
        }
        held.insert(tenant_id.clone(), job_id.clone());
        Ok(())
    }

    /// Releases the lock for `tenant_id`, unconditionally. A no-op if the
    /// tenant does not currently hold one.
    pub async fn release(&self, tenant_id: &TenantId) {
        self.held.lock().await.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_conflicts_while_first_holds() {
        let table = TenantLockTable::new();
        let tenant_id = TenantId::new("tenant-1");
        table.try_acquire(&tenant_id, &JobId::new("job-1")).await.expect("first acquire");
        let result = table.try_acquire(&tenant_id, &JobId::new("job-2")).await;
        assert_eq!(result, Err(TenantLockConflict { tenant_id, running_job_id: JobId::new("job-1") }));
    }

    #[tokio::test]
    async fn release_then_acquire_succeeds() {
        let table = TenantLockTable::new();
        let tenant_id = TenantId::new("tenant-1");
        table.try_acquire(&tenant_id, &JobId::new("job-1")).await.expect("first acquire");
        table.release(&tenant_id).await;
        table.try_acquire(&tenant_id, &JobId::new("job-2")).await.expect("second acquire");
    }
}
