// crates/sentinel-jobs/src/manager.rs
// ============================================================================
// Module: Job Manager
// Description: Admission pipeline, persistence, and dispatch for jobs.
// Purpose: Implement submit/terminate/get/query over the Job lifecycle.
// Dependencies: sentinel-core, sentinel-credentials, sentinel-license,
// crate::lock
// ============================================================================

//! ## Overview
//! [`JobManager::submit`] runs the serial admission pipeline from
//! authorization through dispatch, persisting a `Job` in `Submitted` before
//! handing it to an injected [`JobDispatcher`] (implemented by
//! `sentinel-worker`/`sentinel-server`, not depended on here to keep the
//! dependency graph acyclic). [`JobManager::terminate`] implements
//! cooperative cancellation by flipping the job's `CancellationToken` and
//! writing `Cancelled` if the job is still pre-terminal.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::Job;
use sentinel_core::JobId;
use sentinel_core::JobStatus;
use sentinel_core::RulesetName;
use sentinel_core::StoreError;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use sentinel_credentials::CredentialLinkRegistry;
use sentinel_credentials::InstanceDefaultCredentials;
use sentinel_license::DenialReason;
use sentinel_license::LicenseClient;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::lock::TenantLockConflict;
use crate::lock::TenantLockTable;

/// Request to start a new job.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Target tenant.
    pub tenant_id: TenantId,
    /// Cloud platform of the tenant, used to validate requested rulesets.
    pub cloud: CloudProvider,
    /// Cloud-native identifier substituted into role ARN templates.
    pub cloud_identifier: String,
    /// Ruleset names requested for this run.
    pub ruleset_names: Vec<RulesetName>,
    /// Restricts execution to this subset of rules, set by the event
    /// batcher for event-driven jobs; `None` for ordinary submissions.
    pub rule_filter: Option<Vec<sentinel_core::RuleId>>,
    /// Regions to scan; empty means the tenant's default set.
    pub regions: Vec<String>,
    /// Wall-clock timeout for the running state; defaults applied by the
    /// caller (`sentinel-config`) when not set explicitly.
    pub timeout_seconds: u64,
}

/// Authorizes a caller for a tenant scope (step 1 of admission).
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` when the caller may operate on `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError`] when the caller is not authorized.
    fn authorize(&self, customer_id: &CustomerId, tenant_id: &TenantId) -> Result<(), AuthorizationError>;
}

/// Raised by an [`Authorizer`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("caller is not authorized for tenant {tenant_id}")]
pub struct AuthorizationError {
    /// Tenant the caller was denied access to.
    pub tenant_id: TenantId,
}

/// Hands an admitted job to the worker runtime (step 7 of admission).
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Dispatches `job` for execution.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the job could not be handed off.
    async fn dispatch(&self, job: &Job, cancellation: CancellationToken) -> Result<(), DispatchError>;
}

/// Raised by a [`JobDispatcher`].
#[derive(Debug, Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(
    /// Human-readable reason the dispatch failed.
    pub String,
);

/// Describes which rulesets are valid and licensed for a tenant's cloud,
/// resolved by the caller before calling [`JobManager::submit`].
#[derive(Debug, Clone, Default)]
pub struct RulesetEligibility {
    /// Ruleset names that are active for the tenant's cloud.
    pub valid_for_cloud: Vec<RulesetName>,
    /// Ruleset names covered by an active license.
    pub licensed: Vec<RulesetName>,
    /// License key covering `licensed`, if any ruleset is licensed.
    pub license_key: Option<sentinel_core::LicenseKey>,
}

/// Errors [`JobManager::submit`] returns before a `Job` is persisted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Step 1: caller not authorized for the tenant.
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    /// Step 2: a requested ruleset is not valid for the tenant's cloud.
    #[error("ruleset not valid for tenant cloud: {0}")]
    InvalidRuleset(RulesetName),
    /// Step 3: the tenant already has a job running.
    #[error(transparent)]
    Conflict(#[from] TenantLockConflict),
    /// Underlying storage failure persisting the job.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coordinates the admission pipeline, persistence, and lifecycle of jobs.
pub struct JobManager {
    store: Arc<dyn DocumentStore>,
    locks: Arc<TenantLockTable>,
    authorizer: Arc<dyn Authorizer>,
    license: Arc<LicenseClient>,
    credential_links: Arc<CredentialLinkRegistry>,
    instance_defaults: Arc<dyn InstanceDefaultCredentials>,
    dispatcher: Arc<dyn JobDispatcher>,
    cancellations: Mutex<HashMap<JobId, CancellationToken>>,
}

const DOCUMENT_COLLECTION: &str = "jobs";

impl JobManager {
    /// Creates a job manager wired to its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        authorizer: Arc<dyn Authorizer>,
        license: Arc<LicenseClient>,
        credential_links: Arc<CredentialLinkRegistry>,
        instance_defaults: Arc<dyn InstanceDefaultCredentials>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            store,
            locks: Arc::new(TenantLockTable::new()),
            authorizer,
            license,
            credential_links,
            instance_defaults,
            dispatcher,
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared tenant lock table, for wiring into a
    /// [`crate::timeout::TimeoutSweep`] run against the same locks.
    #[must_use]
    pub fn locks(&self) -> Arc<TenantLockTable> {
        Arc::clone(&self.locks)
    }

    /// Runs the serial admission pipeline and dispatches the admitted job.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] for any pipeline step failing before the job
    /// is persisted. Failures after persistence (credential resolution,
    /// license admission) are recorded on the returned `Job` itself via
    /// `Failed`/`failure_reason`, per `spec.md`.
    pub async fn submit(&self, request: JobSubmission, eligibility: &RulesetEligibility, job_id: JobId, now: Timestamp) -> Result<Job, SubmitError> {
        self.authorizer.authorize(&request.customer_id, &request.tenant_id)?;

        for name in &request.ruleset_names {
            if !eligibility.valid_for_cloud.contains(name) {
                return Err(SubmitError::InvalidRuleset(name.clone()));
            }
        }

        self.locks.try_acquire(&request.tenant_id, &job_id).await?;

        let mut job = Job {
            id: job_id.clone(),
            customer_id: request.customer_id.clone(),
            tenant_id: request.tenant_id.clone(),
            ruleset_names: request.ruleset_names.clone(),
            rule_filter: request.rule_filter.clone(),
            regions: request.regions.clone(),
            status: JobStatus::Submitted,
            submitted_at: now,
            started_at: None,
            finished_at: None,
            timeout_seconds: request.timeout_seconds,
            failure_reason: None,
        };

        let requires_license = request.ruleset_names.iter().any(|name| eligibility.licensed.contains(name));

        let credentials = sentinel_credentials::resolve(
            &request.customer_id,
            &request.tenant_id,
            request.cloud,
            &request.cloud_identifier,
            None,
            &self.credential_links,
            self.instance_defaults.as_ref(),
        );

        let admission_failure = if credentials.is_err() {
            Some("Could not resolve any credentials".to_string())
        } else if requires_license {
            match &eligibility.license_key {
                None => Some(DenialReason::NotAllowed.to_string()),
                Some(license_key) => {
                    match self.license.admit(&request.customer_id, license_key, &job_id, now.epoch_millis().unsigned_abs()).await {
                        Ok(_) => None,
                        Err(reason) => Some(reason.to_string()),
                    }
                }
            }
        } else {
            None
        };

        if let Some(reason) = admission_failure {
            job.fail(reason, now).map_err(|_| StoreError::Conflict("job already terminal".to_string()))?;
            self.persist(&job).await?;
            self.locks.release(&request.tenant_id).await;
            return Ok(job);
        }

        self.persist(&job).await?;

        let cancellation = CancellationToken::new();
        self.cancellations.lock().await.insert(job_id.clone(), cancellation.clone());

        if let Err(err) = self.dispatcher.dispatch(&job, cancellation).await {
            tracing::warn!(job_id = %job_id, error = %err, "dispatch failed after admission");
        }

        Ok(job)
    }

    /// Writes `Cancelled` if `job_id` is still `Submitted`/`Running`, and
    /// signals the worker's cooperative cancellation token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on persistence failure. Returns `Ok(())`
    /// (acking a no-op) if the job is already terminal, matching the "any
    /// illegal transition is a no-op" rule.
    pub async fn terminate(&self, job_id: &JobId, now: Timestamp) -> Result<(), StoreError> {
        let Some(mut job) = self.get(job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        if job.apply_transition(JobStatus::Cancelled, now).is_ok() {
            self.persist(&job).await?;
            self.locks.release(&job.tenant_id).await;
        }
        if let Some(token) = self.cancellations.lock().await.get(job_id) {
            token.cancel();
        }
        Ok(())
    }

    /// Loads a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn get(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let Some(bytes) = self.store.get(DOCUMENT_COLLECTION, job_id.as_str()).await? else {
            return Ok(None);
        };
        let job: Job = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(job))
    }

    /// Pages through jobs matching `filter`, most recent page first as
    /// returned by the underlying store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn query(&self, filter: &JobQueryFilter, cursor: Option<&str>) -> Result<JobQueryPage, StoreError> {
        let page = self.store.list(DOCUMENT_COLLECTION, "", cursor).await?;
        let mut jobs = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            let Some(bytes) = self.store.get(DOCUMENT_COLLECTION, key).await? else { continue };
            let job: Job = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
            if filter.matches(&job) {
                jobs.push(job);
            }
        }
        Ok(JobQueryPage { jobs, next_cursor: page.next_cursor })
    }

    async fn persist(&self, job: &Job) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(job).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.store.put(DOCUMENT_COLLECTION, job.id.as_str(), &bytes).await
    }
}

/// Narrows a [`JobManager::query`] call; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobQueryFilter {
    /// Restrict to this tenant.
    pub tenant_id: Option<TenantId>,
    /// Restrict to this status.
    pub status: Option<JobStatus>,
}

impl JobQueryFilter {
    fn matches(&self, job: &Job) -> bool {
        self.tenant_id.as_ref().is_none_or(|tenant_id| tenant_id == &job.tenant_id) && self.status.is_none_or(|status| status == job.status)
    }
}

/// One page of [`JobManager::query`] results.
#[derive(Debug, Clone, Default)]
pub struct JobQueryPage {
    /// Jobs matching the filter in this page.
    pub jobs: Vec<Job>,
    /// Opaque cursor for the next page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sentinel_core::JobId;
    use sentinel_core::ListPage;
    use sentinel_credentials::AlwaysAvailable;
    use sentinel_license::LicenseClientConfig;

    use super::*;

    struct AllowAll;
    impl Authorizer for AllowAll {
        fn authorize(&self, _customer_id: &CustomerId, _tenant_id: &TenantId) -> Result<(), AuthorizationError> {
            Ok(())
        }
    }

    struct NoopDispatcher;
    #[async_trait]
    impl JobDispatcher for NoopDispatcher {
        async fn dispatch(&self, _job: &Job, _cancellation: CancellationToken) -> Result<(), DispatchError> {
            Ok(())
        }
    }

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

    fn manager() -> JobManager {
        JobManager::new(
            Arc::new(InMemoryDocumentStore::default()),
            Arc::new(AllowAll),
            Arc::new(LicenseClient::new(LicenseClientConfig::default())),
            Arc::new(CredentialLinkRegistry::new()),
            Arc::new(AlwaysAvailable),
            Arc::new(NoopDispatcher),
        )
    }

    fn submission() -> JobSubmission {
        JobSubmission {
            customer_id: CustomerId::new("cust-1"),
            tenant_id: TenantId::new("tenant-1"),
            cloud: CloudProvider::Aws,
            cloud_identifier: "111111111111".to_string(),
            ruleset_names: vec![RulesetName::new("baseline")],
            rule_filter: None,
            regions: vec!["us-east-1".to_string()],
            timeout_seconds: 3600,
        }
    }

    #[tokio::test]
    async fn unlicensed_ruleset_with_resolvable_credentials_submits_cleanly() {
        let manager = manager();
        let eligibility = RulesetEligibility { valid_for_cloud: vec![RulesetName::new("baseline")], ..Default::default() };
        let job = manager.submit(submission(), &eligibility, JobId::new("job-1"), Timestamp::now()).await.expect("submit");
        assert_eq!(job.status, JobStatus::Submitted);
    }

    #[tokio::test]
    async fn second_submit_against_same_tenant_conflicts() {
        let manager = manager();
        let eligibility = RulesetEligibility { valid_for_cloud: vec![RulesetName::new("baseline")], ..Default::default() };
        manager.submit(submission(), &eligibility, JobId::new("job-1"), Timestamp::now()).await.expect("first submit");
        let result = manager.submit(submission(), &eligibility, JobId::new("job-2"), Timestamp::now()).await;
        assert!(matches!(result, Err(SubmitError::Conflict(_))));
    }

    #[tokio::test]
    async fn invalid_ruleset_is_rejected_before_lock_is_taken() {
        let manager = manager();
        let eligibility = RulesetEligibility::default();
        let result = manager.submit(submission(), &eligibility, JobId::new("job-1"), Timestamp::now()).await;
        assert!(matches!(result, Err(SubmitError::InvalidRuleset(_))));
    }

    #[tokio::test]
    async fn terminate_of_unknown_job_is_a_no_op_ack() {
        let manager = manager();
        manager.terminate(&JobId::new("missing"), Timestamp::now()).await.expect("terminate");
    }

    #[tokio::test]
    async fn query_filters_by_tenant() {
        let manager = manager();
        let eligibility = RulesetEligibility { valid_for_cloud: vec![RulesetName::new("baseline")], ..Default::default() };
        manager.submit(submission(), &eligibility, JobId::new("job-1"), Timestamp::now()).await.expect("submit");

        let mut other = submission();
        other.tenant_id = TenantId::new("tenant-2");
        manager.submit(other, &eligibility, JobId::new("job-2"), Timestamp::now()).await.expect("submit other tenant");

        let filter = JobQueryFilter { tenant_id: Some(TenantId::new("tenant-1")), status: None };
        let page = manager.query(&filter, None).await.expect("query");
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].id, JobId::new("job-1"));
    }
}
