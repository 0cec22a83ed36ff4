// crates/sentinel-server/src/dispatch.rs
// ============================================================================
// Module: Worker Job Dispatcher
// Description: Implements sentinel_jobs::manager::JobDispatcher by running
// the job against the worker runtime and persisting its outcome.
// Purpose: Bridge the admission pipeline (sentinel-jobs) to the scan
// pipeline (sentinel-worker) and the findings shard store
// (sentinel-shards), and notify the License Manager of the result.
// Dependencies: sentinel-core, sentinel-credentials, sentinel-jobs,
// sentinel-license, sentinel-shards, sentinel-worker, tokio
// ============================================================================

//! ## Overview
//! [`JobManager::submit`] hands an admitted [`Job`] to a
//! [`JobDispatcher`] and does not wait for it to finish, so
//! [`WorkerJobDispatcher::dispatch`] spawns the run as a background task:
//! it re-resolves the tenant's cloud/region/credentials (the admission
//! pipeline discards its own resolution once past the admission check),
//! loads the job's rules, runs [`sentinel_worker::run_job`], persists the
//! resulting shards and terminal job status, and notifies
//! [`LicenseClient`] if the job was admitted under a license.

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::DocumentStore;
use sentinel_core::Job;
use sentinel_core::JobStatus;
use sentinel_core::ObjectStore;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::StoreError;
use sentinel_core::Tenant;
use sentinel_core::Timestamp;
use sentinel_credentials::CredentialLinkRegistry;
use sentinel_credentials::InstanceDefaultCredentials;
use sentinel_jobs::DispatchError;
use sentinel_jobs::JobDispatcher;
use sentinel_license::LicenseClient;
use sentinel_shards::store::FindingsShardStore;
use sentinel_worker::PipelineConfig;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::authorizer::TENANTS_COLLECTION;
use crate::calendar::shard_date;
use crate::licensing::LicenseAdmissionLedger;
use crate::licensing::RULESETS_COLLECTION;

/// Collection individual rule documents are stored under, keyed by
/// [`RuleId`].
pub const RULES_COLLECTION: &str = "rules";

/// Collection one finished job's [`sentinel_core::JobStatistics`] are stored
/// under, keyed by [`sentinel_core::JobId`]. Neither `Job` nor any library
/// crate persists statistics past the license notification call, but the
/// metrics pipeline's C-level stage needs a customer's completed-job
/// statistics for the week, so this server keeps its own small record.
pub const JOB_STATISTICS_COLLECTION: &str = "job_statistics";

/// A finished job's statistics alongside the tenant/customer/time context
/// the metrics tick needs to select this week's records for one customer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredJobStatistics {
    /// Owning customer.
    pub customer_id: sentinel_core::CustomerId,
    /// Owning tenant.
    pub tenant_id: sentinel_core::TenantId,
    /// The run's aggregated statistics.
    pub statistics: sentinel_core::JobStatistics,
    /// When the job reached a terminal status.
    pub finished_at: Timestamp,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tenant {0} not found")]
    TenantNotFound(String),
    #[error("could not resolve any credentials")]
    CredentialsUnresolved,
}

/// Dispatches admitted jobs onto [`sentinel_worker::scheduler::run_job`].
pub struct WorkerJobDispatcher {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    shards: Arc<FindingsShardStore>,
    credential_links: Arc<CredentialLinkRegistry>,
    instance_defaults: Arc<dyn InstanceDefaultCredentials>,
    license: Arc<LicenseClient>,
    admissions: Arc<LicenseAdmissionLedger>,
    pipeline_config: PipelineConfig,
}

impl WorkerJobDispatcher {
    /// Creates a dispatcher wired to its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        shards: Arc<FindingsShardStore>,
        credential_links: Arc<CredentialLinkRegistry>,
        instance_defaults: Arc<dyn InstanceDefaultCredentials>,
        license: Arc<LicenseClient>,
        admissions: Arc<LicenseAdmissionLedger>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        Self { store, objects, shards, credential_links, instance_defaults, license, admissions, pipeline_config }
    }

    async fn load_tenant(&self, tenant_id: &str) -> Result<Tenant, RunError> {
        let Some(bytes) = self.store.get(TENANTS_COLLECTION, tenant_id).await? else {
            return Err(RunError::TenantNotFound(tenant_id.to_string()));
        };
        serde_json::from_slice(&bytes).map_err(|err| RunError::Store(StoreError::Corrupt(err.to_string())))
    }

    async fn load_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>, StoreError> {
        let Some(bytes) = self.store.get(RULES_COLLECTION, rule_id.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?))
    }

    async fn load_rules(&self, job: &Job, cloud: CloudProvider) -> Result<Vec<Rule>, StoreError> {
        let mut rule_ids = Vec::new();
        for name in &job.ruleset_names {
            let key = format!("{}/{}/{name}", job.customer_id.as_str(), sentinel_shards::cloud_segment(cloud));
            if let Some(bytes) = self.store.get(RULESETS_COLLECTION, &key).await? {
                let ruleset: sentinel_core::Ruleset = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                rule_ids.extend(ruleset.rule_ids);
            }
        }
        if let Some(filter) = &job.rule_filter {
            rule_ids.retain(|id| filter.contains(id));
        }
        rule_ids.sort();
        rule_ids.dedup();

        let mut rules = Vec::with_capacity(rule_ids.len());
        for rule_id in &rule_ids {
            if let Some(rule) = self.load_rule(rule_id).await? {
                rules.push(rule);
            } else {
                tracing::warn!(job_id = %job.id, rule_id = %rule_id, "ruleset referenced a rule with no stored definition");
            }
        }
        Ok(rules)
    }

    async fn run(self: Arc<Self>, job: Job, cancellation: CancellationToken) {
        let job_id = job.id.clone();
        if let Err(err) = self.run_inner(job, cancellation).await {
            tracing::error!(job_id = %job_id, error = %err, "job run failed before producing a terminal status");
        }
    }

    async fn run_inner(&self, mut job: Job, cancellation: CancellationToken) -> Result<(), RunError> {
        let tenant = self.load_tenant(job.tenant_id.as_str()).await?;
        let cloud = tenant.cloud;
        let regions = if job.regions.is_empty() { tenant.regions.clone() } else { job.regions.clone() };

        let credentials = sentinel_credentials::resolve(
            &job.customer_id,
            &job.tenant_id,
            cloud,
            &tenant.native_id,
            None,
            &self.credential_links,
            self.instance_defaults.as_ref(),
        );

        let now = Timestamp::now();
        let Ok(credentials) = credentials else {
            job.fail("Could not resolve any credentials", now).ok();
            self.persist_job(&job).await?;
            return Err(RunError::CredentialsUnresolved);
        };

        job.apply_transition(JobStatus::Running, now).ok();
        self.persist_job(&job).await?;

        let rules = self.load_rules(&job, cloud).await?;
        let provider = Arc::new(crate::provider::InventoryResourceProvider::new(Arc::clone(&self.objects)));

        let outcomes = sentinel_worker::run_job(
            provider,
            cloud,
            &regions,
            Arc::new(rules),
            Arc::new(credentials),
            cancellation,
            self.pipeline_config,
            now,
        )
        .await;

        let statistics = sentinel_worker::aggregate_statistics(&outcomes);
        let terminal_status = statistics.terminal_job_status();

        let date = shard_date(now);
        let fresh_shards: Vec<(u32, sentinel_core::Shard)> = outcomes.into_iter().flat_map(|outcome| outcome.shards).collect();
        self.shards.apply_run(job.tenant_id.as_str(), cloud, &date, fresh_shards, now).await.map_err(|err| StoreError::Backend(err.to_string()))?;

        let finished_at = Timestamp::now();
        job.apply_transition(terminal_status, finished_at).ok();
        self.persist_job(&job).await?;
        self.persist_job_statistics(&job, statistics, finished_at).await?;

        if let Some(license_key) = self.admissions.license_key_for(&job.id).await {
            self.license.notify(&job.customer_id, &license_key, &job.id, job.status, statistics).await;
            self.admissions.forget(&job.id).await;
        }

        Ok(())
    }

    async fn persist_job(&self, job: &Job) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(job).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.store.put("jobs", job.id.as_str(), &bytes).await
    }

    async fn persist_job_statistics(&self, job: &Job, statistics: sentinel_core::JobStatistics, finished_at: Timestamp) -> Result<(), StoreError> {
        let record = StoredJobStatistics { customer_id: job.customer_id.clone(), tenant_id: job.tenant_id.clone(), statistics, finished_at };
        let bytes = serde_json::to_vec(&record).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.store.put(JOB_STATISTICS_COLLECTION, job.id.as_str(), &bytes).await
    }
}

#[async_trait]
impl JobDispatcher for WorkerJobDispatcher {
    async fn dispatch(&self, job: &Job, cancellation: CancellationToken) -> Result<(), DispatchError> {
        let job = job.clone();
        let job_id = job.id.clone();
        let this = Arc::new(Self {
            store: Arc::clone(&self.store),
            objects: Arc::clone(&self.objects),
            shards: Arc::clone(&self.shards),
            credential_links: Arc::clone(&self.credential_links),
            instance_defaults: Arc::clone(&self.instance_defaults),
            license: Arc::clone(&self.license),
            admissions: Arc::clone(&self.admissions),
            pipeline_config: self.pipeline_config,
        });
        tokio::spawn(this.run(job, cancellation).instrument(tracing::info_span!("job_run", job_id = %job_id)));
        Ok(())
    }
}
