// crates/sentinel-jobs/src/timeout.rs
// ============================================================================
// Module: Job Timeout Sweep
// Description: Periodic scan that turns stalled jobs into terminal states.
// Purpose: Enforce the submitted->running grace period and the running hard
// cap without a per-job timer task.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`TimeoutSweep::run`] is driven by the server's scheduler tick, the same
//! way `retry_send_reports` drives [`sentinel_license::LicenseClient`]'s
//! pending-notification flush. It pages through the `jobs` collection,
//! evaluates each non-terminal job against its deadline, and writes the
//! terminal transition plus an unconditional tenant-lock release.
//!
//! The state diagram only allows `TimedOut` from `Running`; a job stuck past
//! its `submitted→running` grace period is instead moved straight to
//! `Failed` via the already-legal `(Submitted, Failed)` transition, with a
//! reason naming the grace-period breach.

use std::sync::Arc;

use sentinel_core::DocumentStore;
use sentinel_core::Job;
use sentinel_core::JobStatus;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;

use crate::lock::TenantLockTable;

const JOB_COLLECTION: &str = "jobs";

/// Deadlines enforced by [`TimeoutSweep`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutSweepConfig {
    /// Grace period a job may spend in `Submitted` before it is failed.
    pub submitted_grace_seconds: i64,
    /// Default `running→terminal` hard cap when a job did not request one.
    pub default_running_hard_cap_seconds: i64,
}

impl Default for TimeoutSweepConfig {
    fn default() -> Self {
        Self { submitted_grace_seconds: 600, default_running_hard_cap_seconds: 10_800 }
    }
}

/// Scans non-terminal jobs and applies timeout transitions.
pub struct TimeoutSweep {
    store: Arc<dyn DocumentStore>,
    locks: Arc<TenantLockTable>,
    config: TimeoutSweepConfig,
}

impl TimeoutSweep {
    /// Creates a sweep against `store`, releasing locks in `locks`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, locks: Arc<TenantLockTable>, config: TimeoutSweepConfig) -> Self {
        Self { store, locks, config }
    }

    /// Pages through every job and times out those that exceeded their
    /// deadline, returning the jobs that were transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a listing or persistence failure; a failure
    /// partway through still returns the jobs transitioned so far by
    /// propagating the error only after the current page finishes.
    pub async fn run(&self, now: Timestamp) -> Result<Vec<Job>, StoreError> {
        let mut transitioned = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.list(JOB_COLLECTION, "", cursor.as_deref()).await?;
            for key in &page.keys {
                if let Some(job) = self.sweep_one(key, now).await? {
                    transitioned.push(job);
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(transitioned)
    }

    async fn sweep_one(&self, key: &str, now: Timestamp) -> Result<Option<Job>, StoreError> {
        let Some(bytes) = self.store.get(JOB_COLLECTION, key).await? else {
            return Ok(None);
        };
        let mut job: Job = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if job.status.is_terminal() {
            return Ok(None);
        }

        let expired = match job.status {
            JobStatus::Submitted => now.seconds_since(job.submitted_at) > self.config.submitted_grace_seconds,
            JobStatus::Running => {
                let started_at = job.started_at.unwrap_or(job.submitted_at);
                let hard_cap = if job.timeout_seconds > 0 { i64::try_from(job.timeout_seconds).unwrap_or(i64::MAX) } else { self.config.default_running_hard_cap_seconds };
                now.seconds_since(started_at) > hard_cap
            }
            _ => false,
        };
        if !expired {
            return Ok(None);
        }

        let applied = match job.status {
            JobStatus::Submitted => job.fail("submitted-to-running grace period exceeded", now).is_ok(),
            JobStatus::Running => job.apply_transition(JobStatus::TimedOut, now).is_ok(),
            _ => false,
        };
        if !applied {
            return Ok(None);
        }

        let bytes = serde_json::to_vec(&job).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.store.put(JOB_COLLECTION, key, &bytes).await?;
        self.locks.release(&job.tenant_id).await;
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use sentinel_core::CustomerId;
    use sentinel_core::JobId;
    use sentinel_core::ListPage;
    use sentinel_core::RulesetName;
    use sentinel_core::TenantId;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct InMemoryDocumentStore {
        documents: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl DocumentStore for InMemoryDocumentStore {
        async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.documents.lock().await.get(&format!("{collection}/{key}")).cloned())
        }

        async fn put(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.documents.lock().await.insert(format!("{collection}/{key}"), value.to_vec());
            Ok(())
        }

        async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
            self.documents.lock().await.remove(&format!("{collection}/{key}"));
            Ok(())
        }

        async fn list(&self, _collection: &str, _prefix: &str, _cursor: Option<&str>) -> Result<ListPage, StoreError> {
            let documents = self.documents.lock().await;
            let keys = documents.keys().filter_map(|full| full.split_once('/').map(|(_, key)| key.to_string())).collect();
            Ok(ListPage { keys, next_cursor: None })
        }
    }

    fn stalled_job(status: JobStatus, submitted_at: Timestamp, started_at: Option<Timestamp>) -> Job {
        Job {
            id: JobId::new("job-1"),
            customer_id: CustomerId::new("cust-1"),
            tenant_id: TenantId::new("tenant-1"),
            ruleset_names: vec![RulesetName::new("baseline")],
            rule_filter: None,
            regions: vec!["us-east-1".to_string()],
            status,
            submitted_at,
            started_at,
            finished_at: None,
            timeout_seconds: 3600,
            failure_reason: None,
        }
    }

    async fn seed(store: &InMemoryDocumentStore, job: &Job) {
        let bytes = serde_json::to_vec(job).expect("serialize job");
        store.put(JOB_COLLECTION, job.id.as_str(), &bytes).await.expect("seed job");
    }

    #[tokio::test]
    async fn submitted_past_grace_period_is_failed() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let job = stalled_job(JobStatus::Submitted, Timestamp::from_epoch_millis(0), None);
        seed(&store, &job).await;

        let locks = Arc::new(TenantLockTable::new());
        locks.try_acquire(&job.tenant_id, &job.id).await.expect("acquire");
        let sweep = TimeoutSweep::new(store, locks.clone(), TimeoutSweepConfig::default());

        let now = Timestamp::from_epoch_millis(700_000);
        let transitioned = sweep.run(now).await.expect("run");
        assert_eq!(transitioned.len(), 1);
        assert_eq!(transitioned[0].status, JobStatus::Failed);
        assert!(locks.try_acquire(&job.tenant_id, &JobId::new("job-2")).await.is_ok());
    }

    #[tokio::test]
    async fn running_within_hard_cap_is_untouched() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let started_at = Timestamp::from_epoch_millis(0);
        let job = stalled_job(JobStatus::Running, started_at, Some(started_at));
        seed(&store, &job).await;

        let locks = Arc::new(TenantLockTable::new());
        let sweep = TimeoutSweep::new(store, locks, TimeoutSweepConfig::default());

        let now = started_at.plus_seconds(60);
        let transitioned = sweep.run(now).await.expect("run");
        assert!(transitioned.is_empty());
    }

    #[tokio::test]
    async fn running_past_hard_cap_times_out_and_releases_lock() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let started_at = Timestamp::from_epoch_millis(0);
        let mut job = stalled_job(JobStatus::Running, started_at, Some(started_at));
        job.timeout_seconds = 3600;
        seed(&store, &job).await;

        let locks = Arc::new(TenantLockTable::new());
        locks.try_acquire(&job.tenant_id, &job.id).await.expect("acquire");
        let sweep = TimeoutSweep::new(store, locks.clone(), TimeoutSweepConfig::default());

        let now = started_at.plus_seconds(3601);
        let transitioned = sweep.run(now).await.expect("run");
        assert_eq!(transitioned.len(), 1);
        assert_eq!(transitioned[0].status, JobStatus::TimedOut);
        assert!(locks.try_acquire(&job.tenant_id, &JobId::new("job-2")).await.is_ok());
    }
}
