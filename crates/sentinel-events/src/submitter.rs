// crates/sentinel-events/src/submitter.rs
// ============================================================================
// Module: Event-Driven Job Submission Port
// Description: Trait a drain result is handed to in order to become a Job.
// Purpose: Keep `sentinel-events` from depending on `sentinel-jobs`'
// admission pipeline (ruleset/license eligibility assembly is a
// `sentinel-server` wiring concern).
// Dependencies: async-trait, sentinel-core
// ============================================================================

//! ## Overview
//! [`drain`](crate::drain::drain) only knows "these rule ids should run for
//! this tenant now". Turning that into a full job submission requires
//! resolving which ruleset(s) those rules belong to and building a
//! `RulesetEligibility`, which needs both the license mirror and the ruleset
//! composer — concerns this crate does not own. `sentinel-server` implements
//! [`EventDrivenJobSubmitter`] against `sentinel_jobs::JobManager`.

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::JobId;
use sentinel_core::RuleId;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use thiserror::Error;

/// Submits an event-driven job restricted to a rule-id subset.
#[async_trait]
pub trait EventDrivenJobSubmitter: Send + Sync {
    /// Submits a job for `tenant_id` restricted to `rule_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`EventSubmitError`] when the job cannot be admitted.
    async fn submit(&self, customer_id: &CustomerId, tenant_id: &TenantId, cloud: CloudProvider, rule_ids: Vec<RuleId>, now: Timestamp) -> Result<JobId, EventSubmitError>;
}

/// Raised by an [`EventDrivenJobSubmitter`].
#[derive(Debug, Error)]
#[error("event-driven job submission failed: {0}")]
pub struct EventSubmitError(pub String);
