// crates/sentinel-server/src/licensing.rs
// ============================================================================
// Module: Licensing and Ruleset Eligibility Wiring
// Description: Resolves sentinel_jobs::manager::RulesetEligibility from
// stored Ruleset/License documents, and tracks the LicenseKey <-> CustomerId
// and Job <-> LicenseKey relationships the library crates deliberately do
// not own.
// Purpose: sentinel_jobs::JobManager::submit takes a caller-resolved
// RulesetEligibility rather than resolving it itself, so something at the
// binary boundary has to read the Ruleset and License documents and build
// one. sentinel_license::LicenseClient tracks licenses by key, not by
// (job, customer), so the server keeps the small mapping notify/resync need.
// Dependencies: sentinel-core, sentinel-jobs, sentinel-license, sentinel-shards
// ============================================================================

//! ## Overview
//! [`JobSubmissionService`] is the caller [`sentinel_jobs::manager::JobManager::submit`]'s
//! doc comment describes: it reads the customer's Ruleset documents to build
//! `valid_for_cloud`, reads the customer's License document to build
//! `licensed`/`license_key`, and records the license admission for later
//! notification. [`LicenseKeyRegistry`] answers
//! [`sentinel_license::LicenseClient::flush_pending_notifications`]'s
//! `customer_id_of` closure. [`LicenseAdmissionLedger`] answers "what license,
//! if any, was this job admitted under" for [`crate::dispatch::WorkerJobDispatcher`].

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock;

use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::Job;
use sentinel_core::JobId;
use sentinel_core::License;
use sentinel_core::LicenseKey;
use sentinel_core::Ruleset;
use sentinel_core::RuleId;
use sentinel_core::RulesetName;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;
use sentinel_jobs::JobManager;
use sentinel_jobs::JobSubmission;
use sentinel_jobs::RulesetEligibility;
use sentinel_jobs::SubmitError;
use sentinel_shards::ALL_CLOUDS;
use sentinel_shards::cloud_segment;

/// Collection ruleset documents are stored under, keyed by
/// `{customer_id}/{cloud}/{name}` and holding that name's current active,
/// released version.
pub const RULESETS_COLLECTION: &str = "rulesets";

/// Collection license documents are stored under, keyed by `customer_id`
/// and holding the customer's current license.
pub const LICENSES_COLLECTION: &str = "licenses";

fn ruleset_key(customer_id: &CustomerId, cloud: CloudProvider, name: &RulesetName) -> String {
    format!("{}/{}/{name}", customer_id.as_str(), cloud_segment(cloud))
}

async fn read_ruleset(store: &dyn DocumentStore, customer_id: &CustomerId, cloud: CloudProvider, name: &RulesetName) -> Result<Option<Ruleset>, StoreError> {
    match store.get(RULESETS_COLLECTION, &ruleset_key(customer_id, cloud, name)).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?)),
        None => Ok(None),
    }
}

async fn read_license(store: &dyn DocumentStore, customer_id: &CustomerId, now: Timestamp) -> Result<Option<License>, StoreError> {
    let Some(bytes) = store.get(LICENSES_COLLECTION, customer_id.as_str()).await? else {
        return Ok(None);
    };
    let license: License = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    if license.expires_at <= now { Ok(None) } else { Ok(Some(license)) }
}

/// Resolves ruleset/license eligibility and submits jobs through a
/// [`JobManager`], recording the license admission for later notification.
pub struct JobSubmissionService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<LicenseKeyRegistry>,
    ledger: Arc<LicenseAdmissionLedger>,
}

impl JobSubmissionService {
    /// Creates a submission service reading documents from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<LicenseKeyRegistry>, ledger: Arc<LicenseAdmissionLedger>) -> Self {
        Self { store, registry, ledger }
    }

    /// Builds a [`RulesetEligibility`] for `ruleset_names` under `cloud`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn resolve_eligibility(&self, customer_id: &CustomerId, cloud: CloudProvider, ruleset_names: &[RulesetName], now: Timestamp) -> Result<RulesetEligibility, StoreError> {
        let mut valid_for_cloud = Vec::new();
        for name in ruleset_names {
            if let Some(ruleset) = read_ruleset(self.store.as_ref(), customer_id, cloud, name).await? {
                if ruleset.released && ruleset.active {
                    valid_for_cloud.push(name.clone());
                }
            }
        }

        let Some(license) = read_license(self.store.as_ref(), customer_id, now).await? else {
            return Ok(RulesetEligibility { valid_for_cloud, licensed: Vec::new(), license_key: None });
        };
        self.registry.register(license.key.clone(), customer_id.clone());
        let licensed = ruleset_names.iter().filter(|name| license.ruleset_names.contains(name)).cloned().collect();
        Ok(RulesetEligibility { valid_for_cloud, licensed, license_key: Some(license.key) })
    }

    /// Returns every rule id entitled by `customer_id`'s current license,
    /// across every cloud and every licensed ruleset, intersected with
    /// `candidate_rules`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn licensed_subset(&self, customer_id: &CustomerId, candidate_rules: &[RuleId], now: Timestamp) -> Result<Vec<RuleId>, StoreError> {
        let Some(license) = read_license(self.store.as_ref(), customer_id, now).await? else {
            return Ok(Vec::new());
        };
        self.registry.register(license.key.clone(), customer_id.clone());
        let mut entitled: HashSet<RuleId> = HashSet::new();
        for name in &license.ruleset_names {
            for cloud in ALL_CLOUDS {
                if let Some(ruleset) = read_ruleset(self.store.as_ref(), customer_id, cloud, name).await? {
                    if ruleset.released {
                        entitled.extend(ruleset.rule_ids);
                    }
                }
            }
        }
        Ok(candidate_rules.iter().filter(|id| entitled.contains(id)).cloned().collect())
    }

    /// Finds the ruleset names entitled by `customer_id`'s current license
    /// (or, absent a license, every released ruleset for `cloud`) that
    /// contain at least one of `rule_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn ruleset_names_containing(&self, customer_id: &CustomerId, cloud: CloudProvider, rule_ids: &[RuleId], now: Timestamp) -> Result<Vec<RulesetName>, StoreError> {
        let candidate_names = match read_license(self.store.as_ref(), customer_id, now).await? {
            Some(license) => license.ruleset_names,
            None => Vec::new(),
        };
        let mut matches = Vec::new();
        for name in candidate_names {
            if let Some(ruleset) = read_ruleset(self.store.as_ref(), customer_id, cloud, &name).await? {
                if ruleset.released && rule_ids.iter().any(|id| ruleset.rule_ids.contains(id)) {
                    matches.push(name);
                }
            }
        }
        Ok(matches)
    }

    /// Resolves eligibility for `submission` and submits it through
    /// `job_manager`, recording the license admission (if any) so
    /// [`crate::dispatch::WorkerJobDispatcher`] can notify the License
    /// Manager once the job finishes.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] on authorization, validation, lock conflict,
    /// or store failure.
    pub async fn submit(&self, job_manager: &JobManager, submission: JobSubmission, job_id: JobId, now: Timestamp) -> Result<Job, SubmitError> {
        let eligibility = self.resolve_eligibility(&submission.customer_id, submission.cloud, &submission.ruleset_names, now).await?;
        if let Some(license_key) = eligibility.license_key.clone() {
            self.ledger.record(job_id.clone(), license_key).await;
        }
        job_manager.submit(submission, &eligibility, job_id, now).await
    }
}

/// Maps a [`LicenseKey`] back to the [`CustomerId`] it was issued for, so
/// [`sentinel_license::LicenseClient::flush_pending_notifications`] can
/// re-sign queued notifications without the license client needing to own
/// that relationship itself.
#[derive(Default)]
pub struct LicenseKeyRegistry {
    map: RwLock<HashMap<LicenseKey, CustomerId>>,
}

impl LicenseKeyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `license_key` belongs to `customer_id`.
    pub fn register(&self, license_key: LicenseKey, customer_id: CustomerId) {
        self.map.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(license_key, customer_id);
    }

    /// Looks up the customer a license key was issued for.
    #[must_use]
    pub fn customer_id_of(&self, license_key: &LicenseKey) -> Option<CustomerId> {
        self.map.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(license_key).cloned()
    }
}

/// Tracks which [`LicenseKey`], if any, a given job was admitted under.
#[derive(Default)]
pub struct LicenseAdmissionLedger {
    admissions: tokio::sync::RwLock<HashMap<JobId, LicenseKey>>,
}

impl LicenseAdmissionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `job_id` was admitted under `license_key`.
    pub async fn record(&self, job_id: JobId, license_key: LicenseKey) {
        self.admissions.write().await.insert(job_id, license_key);
    }

    /// Returns the license key `job_id` was admitted under, if any.
    pub async fn license_key_for(&self, job_id: &JobId) -> Option<LicenseKey> {
        self.admissions.read().await.get(job_id).cloned()
    }

    /// Drops the tracked admission for `job_id`, once its terminal
    /// notification has been sent.
    pub async fn forget(&self, job_id: &JobId) {
        self.admissions.write().await.remove(job_id);
    }
}
