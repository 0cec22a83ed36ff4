// crates/sentinel-server/src/events.rs
// ============================================================================
// Module: Event-Driven Job Submission and License Filtering
// Description: Implements sentinel_events::submitter::EventDrivenJobSubmitter
// and sentinel_events::license_filter::RuleLicenseFilter against the stored
// ruleset/license documents and the job admission pipeline.
// Purpose: Give EventDrainer a way to turn "these rule ids fired for this
// tenant" into an admitted job, without sentinel-events depending on
// sentinel-jobs or sentinel-license directly.
// Dependencies: sentinel-core, sentinel-events, sentinel-jobs
// ============================================================================

//! ## Overview
//! [`EventJobSubmitter`] resolves the ruleset name(s) an event-driven rule
//! subset belongs to, builds a [`JobSubmission`] restricted to those rules
//! via `rule_filter`, and submits it through [`JobSubmissionService`].
//! [`MirroredLicenseFilter`] answers [`EventDrainer`](sentinel_events::EventDrainer)'s
//! pre-submission license check using the same stored license/ruleset
//! documents, so an event batch never even reaches admission for rules the
//! customer is not licensed to run.

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::JobId;
use sentinel_core::RuleId;
use sentinel_core::StoreError;
use sentinel_core::Tenant;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use sentinel_events::EventSubmitError;
use sentinel_events::EventDrivenJobSubmitter;
use sentinel_events::RuleLicenseFilter;
use sentinel_jobs::JobManager;
use sentinel_jobs::JobSubmission;

use crate::authorizer::TENANTS_COLLECTION;
use crate::ids::random_id;
use crate::licensing::JobSubmissionService;

async fn load_tenant(store: &dyn DocumentStore, tenant_id: &TenantId) -> Result<Tenant, StoreError> {
    let Some(bytes) = store.get(TENANTS_COLLECTION, tenant_id.as_str()).await? else {
        return Err(StoreError::Backend(format!("tenant {tenant_id} not found")));
    };
    serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))
}

/// Submits event-driven jobs restricted to the rule ids an event window
/// admitted.
pub struct EventJobSubmitter {
    store: Arc<dyn DocumentStore>,
    job_manager: Arc<JobManager>,
    submissions: Arc<JobSubmissionService>,
    default_timeout_seconds: u64,
}

impl EventJobSubmitter {
    /// Creates a submitter wired to the job admission pipeline.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, job_manager: Arc<JobManager>, submissions: Arc<JobSubmissionService>, default_timeout_seconds: u64) -> Self {
        Self { store, job_manager, submissions, default_timeout_seconds }
    }
}

#[async_trait]
impl EventDrivenJobSubmitter for EventJobSubmitter {
    async fn submit(&self, customer_id: &CustomerId, tenant_id: &TenantId, cloud: CloudProvider, rule_ids: Vec<RuleId>, now: Timestamp) -> Result<JobId, EventSubmitError> {
        let tenant = load_tenant(self.store.as_ref(), tenant_id).await.map_err(|err| EventSubmitError(err.to_string()))?;

        let ruleset_names = self
            .submissions
            .ruleset_names_containing(customer_id, cloud, &rule_ids, now)
            .await
            .map_err(|err| EventSubmitError(err.to_string()))?;
        if ruleset_names.is_empty() {
            return Err(EventSubmitError("no licensed ruleset contains the fired rules".to_string()));
        }

        let submission = JobSubmission {
            customer_id: customer_id.clone(),
            tenant_id: tenant_id.clone(),
            cloud,
            cloud_identifier: tenant.native_id,
            ruleset_names,
            rule_filter: Some(rule_ids),
            regions: Vec::new(),
            timeout_seconds: self.default_timeout_seconds,
        };

        let job_id = JobId::new(random_id("job"));
        let job = self
            .submissions
            .submit(self.job_manager.as_ref(), submission, job_id, now)
            .await
            .map_err(|err| EventSubmitError(err.to_string()))?;
        Ok(job.id)
    }
}

/// Narrows an event batch's candidate rules to the subset the customer's
/// active license covers.
pub struct MirroredLicenseFilter {
    submissions: Arc<JobSubmissionService>,
}

impl MirroredLicenseFilter {
    /// Creates a filter backed by the same eligibility resolution the
    /// admission pipeline uses.
    #[must_use]
    pub fn new(submissions: Arc<JobSubmissionService>) -> Self {
        Self { submissions }
    }
}

#[async_trait]
impl RuleLicenseFilter for MirroredLicenseFilter {
    async fn allowed_rules(&self, customer_id: &CustomerId, candidate_rules: &[RuleId]) -> Vec<RuleId> {
        match self.submissions.licensed_subset(customer_id, candidate_rules, Timestamp::now()).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(customer_id = %customer_id, error = %err, "license lookup failed, denying event-driven rules for this window");
                Vec::new()
            }
        }
    }
}
