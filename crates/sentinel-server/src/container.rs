// crates/sentinel-server/src/container.rs
// ============================================================================
// Module: Dependency Container
// Description: Constructs every concrete adapter this binary needs and wires
// them into a running scheduler loop.
// Purpose: Keep every other crate's ports generic while still giving the
// process exactly one place that knows which concrete types back them.
// Dependencies: every crate in this workspace
// ============================================================================

//! ## Overview
//! [`Container::bootstrap`] reads [`SentinelConfig`], builds the storage
//! backend it selects, and constructs every adapter in
//! [`crate::authorizer`], [`crate::dispatch`], [`crate::events`],
//! [`crate::health`], [`crate::licensing`], and [`crate::provider`] on top of
//! it, finally assembling a [`SchedulerTicks`]. Nothing here is reused by a
//! library crate; this module only exists because something has to hold the
//! concrete types the ports erase.

use std::sync::Arc;

use sentinel_config::SentinelConfig;
use sentinel_config::StoreBackend;
use sentinel_core::DocumentStore;
use sentinel_core::ObjectStore;
use sentinel_core::SecretStore;
use sentinel_credentials::AlwaysAvailable;
use sentinel_credentials::CredentialLinkRegistry;
use sentinel_credentials::InstanceDefaultCredentials;
use sentinel_delivery::HttpPushSink;
use sentinel_delivery::ReportDispatcher;
use sentinel_events::EventDrainer;
use sentinel_events::EventRuleMap;
use sentinel_jobs::JobManager;
use sentinel_jobs::TimeoutSweep;
use sentinel_jobs::TimeoutSweepConfig;
use sentinel_license::LicenseClient;
use sentinel_license::LicenseClientConfig;
use sentinel_shards::FindingsShardStore;
use sentinel_worker::PipelineConfig;
use thiserror::Error;

use crate::authorizer::StoreBackedAuthorizer;
use crate::authorizer::TenantCache;
use crate::dispatch::WorkerJobDispatcher;
use crate::events::EventJobSubmitter;
use crate::events::MirroredLicenseFilter;
use crate::health::FatalConditionCheck;
use crate::licensing::JobSubmissionService;
use crate::licensing::LicenseAdmissionLedger;
use crate::licensing::LicenseKeyRegistry;
use crate::scheduler::SchedulerTicks;
use crate::tenant_groups::TenantGroupMap;

/// Collection one JSON document of operator-declared event-name-to-rule
/// entries is stored under. A platform operator seeds this document rather
/// than it being derived; absent, the event batcher simply never maps any
/// event name to a rule, which is a safe (if inert) default.
const EVENT_RULE_MAP_COLLECTION: &str = "config";
const EVENT_RULE_MAP_KEY: &str = "event_rule_map";

/// Collection and key of the operator-declared tenant project/department
/// grouping document. Like the event-rule map, this is seeded by an
/// operator rather than derived; absent, every tenant is its own ungrouped
/// project and the metrics pipeline's project/department roll-up stages
/// degrade to one tenant per project.
const TENANT_GROUP_MAP_COLLECTION: &str = "config";
const TENANT_GROUP_MAP_KEY: &str = "tenant_groups";

/// How long a document store outage must persist before [`FatalConditionCheck`]
/// escalates it to a fatal condition. Not exposed as a config field; chosen
/// to tolerate a single restart or short network partition on the backing
/// store without killing the process.
const DOCUMENT_STORE_GRACE_SECONDS: u64 = 120;

/// Scheduler tick period. Not exposed as a config field: every periodic
/// operation this process runs (event drain, license resync, metrics,
/// delivery retry, timeout sweep, shard sweep) shares this one cadence
/// rather than each having its own, so a single `tokio::time::interval`
/// drives all of them.
const SCHEDULER_TICK_INTERVAL_SECONDS: u64 = 60;

/// Name of the master key this process reads from whichever [`SecretStore`]
/// is wired, used to derive each customer's license request-signing seed.
const LICENSE_SIGNING_MASTER_KEY_NAME: &str = "license-signing-master-key";

/// Failures raised while constructing the container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A storage backend failed to initialize.
    #[error("storage backend initialization failed: {0}")]
    Storage(String),
    /// Reading or parsing a bootstrap document failed.
    #[error("failed to read bootstrap document: {0}")]
    Bootstrap(String),
}

/// Every concrete adapter this process wires together, plus the assembled
/// scheduler.
pub struct Container {
    /// Accepts job submissions through the full admission pipeline.
    pub job_manager: Arc<JobManager>,
    /// Resolves ruleset/license eligibility for job submissions.
    pub submissions: Arc<JobSubmissionService>,
    /// Submits event-driven jobs from a drain outcome.
    pub event_submitter: Arc<EventJobSubmitter>,
    /// Periodic drain over ingested events.
    pub event_drainer: Arc<EventDrainer>,
    /// Runs every scheduled operation on one timer.
    pub scheduler: Arc<SchedulerTicks>,
    /// Startup and periodic health gate.
    pub health: Arc<FatalConditionCheck>,
}

impl Container {
    /// Builds every adapter described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] when the configured storage backend
    /// cannot be initialized, or when bootstrap documents (the license
    /// signing key, the event-rule map) cannot be read.
    pub async fn bootstrap(config: &SentinelConfig) -> Result<Self, ContainerError> {
        let (store, objects, secrets) = build_storage(config).await?;

        let tenant_cache = Arc::new(TenantCache::new());
        tenant_cache.refresh(store.as_ref()).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))?;
        let authorizer = Arc::new(StoreBackedAuthorizer::new(Arc::clone(&tenant_cache)));

        let credential_links = Arc::new(CredentialLinkRegistry::new());
        let instance_defaults: Arc<dyn InstanceDefaultCredentials> = Arc::new(AlwaysAvailable);

        let license_client = Arc::new(LicenseClient::new(LicenseClientConfig {
            endpoint: config.license.endpoint.clone(),
            ..LicenseClientConfig::default()
        }));
        let license_registry = Arc::new(LicenseKeyRegistry::new());
        let license_ledger = Arc::new(LicenseAdmissionLedger::new());
        register_license_signers(secrets.as_ref(), &license_client, store.as_ref()).await?;

        let submissions = Arc::new(JobSubmissionService::new(Arc::clone(&store), Arc::clone(&license_registry), Arc::clone(&license_ledger)));

        let shard_count = config.shards.shard_count;
        let shards = Arc::new(FindingsShardStore::new(Arc::clone(&objects), Arc::clone(&store), shard_count));
        let pipeline_config = PipelineConfig { shard_count, ..PipelineConfig::default() };

        let dispatcher = Arc::new(WorkerJobDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&objects),
            Arc::clone(&shards),
            Arc::clone(&credential_links),
            Arc::clone(&instance_defaults),
            Arc::clone(&license_client),
            Arc::clone(&license_ledger),
            pipeline_config,
        ));

        let job_manager = Arc::new(JobManager::new(
            Arc::clone(&store),
            authorizer,
            Arc::clone(&license_client),
            Arc::clone(&credential_links),
            Arc::clone(&instance_defaults),
            dispatcher,
        ));

        let event_submitter = Arc::new(EventJobSubmitter::new(Arc::clone(&store), Arc::clone(&job_manager), Arc::clone(&submissions), config.jobs.default_timeout_seconds));
        let license_filter = Arc::new(MirroredLicenseFilter::new(Arc::clone(&submissions)));
        let rule_map = load_event_rule_map(store.as_ref()).await?;
        let event_drainer = Arc::new(EventDrainer::new(Arc::clone(&store), rule_map, license_filter, Arc::clone(&event_submitter)));

        let health = Arc::new(FatalConditionCheck::new(Arc::clone(&store), Arc::clone(&objects), Arc::clone(&secrets), DOCUMENT_STORE_GRACE_SECONDS));

        let timeout_sweep = Arc::new(TimeoutSweep::new(Arc::clone(&store), job_manager.locks(), TimeoutSweepConfig::default()));

        let report_dispatcher = Arc::new(ReportDispatcher::new(Arc::clone(&store)).with_sink(Arc::new(HttpPushSink::new(reqwest::Client::new()))));

        let tenant_groups = load_tenant_groups(store.as_ref()).await?;

        let scheduler = Arc::new(SchedulerTicks::new(
            Arc::clone(&tenant_cache),
            Arc::clone(&store),
            Arc::clone(&objects),
            Arc::clone(&health),
            Arc::clone(&event_drainer),
            i64::try_from(config.events.batch_window_seconds).unwrap_or(i64::MAX),
            Arc::clone(&license_client),
            Arc::clone(&license_registry),
            timeout_sweep,
            shards,
            shard_count,
            report_dispatcher,
            SCHEDULER_TICK_INTERVAL_SECONDS,
            tenant_groups,
        ));

        Ok(Self { job_manager, submissions, event_submitter, event_drainer, scheduler, health })
    }
}

#[allow(clippy::type_complexity)]
async fn build_storage(config: &SentinelConfig) -> Result<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>, Arc<dyn SecretStore>), ContainerError> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = sentinel_store_sqlite::SqliteStore::open(&config.store.sqlite_path).map_err(|err| ContainerError::Storage(err.to_string()))?;
            let store = Arc::new(store);
            let document_store: Arc<dyn DocumentStore> = store.clone();
            let object_store: Arc<dyn ObjectStore> = store.clone();
            let secret_store: Arc<dyn SecretStore> = store;
            Ok((document_store, object_store, secret_store))
        }
        StoreBackend::Enterprise => build_enterprise_storage(config).await,
    }
}

#[cfg(feature = "enterprise-store")]
#[allow(clippy::type_complexity)]
async fn build_enterprise_storage(config: &SentinelConfig) -> Result<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>, Arc<dyn SecretStore>), ContainerError> {
    let postgres_url = config.store.postgres_url.clone().ok_or_else(|| ContainerError::Storage("enterprise backend requires store.postgres_url".to_string()))?;
    let s3_bucket = config.store.s3_bucket.clone().ok_or_else(|| ContainerError::Storage("enterprise backend requires store.s3_bucket".to_string()))?;

    let postgres_config = sentinel_store_enterprise::PostgresStoreConfig { connection: postgres_url, ..Default::default() };
    let document_store: Arc<dyn DocumentStore> = Arc::new(sentinel_store_enterprise::PostgresStore::connect(&postgres_config).map_err(|err| ContainerError::Storage(err.to_string()))?);

    let s3_config = sentinel_store_enterprise::S3StoreConfig { bucket: s3_bucket, region: None, prefix: None };
    let object_store: Arc<dyn ObjectStore> = Arc::new(sentinel_store_enterprise::S3Store::connect(s3_config).await);

    // Neither `PostgresStore` nor `S3Store` implements `SecretStore`; the
    // enterprise backend has no Postgres/S3-equivalent secret storage in
    // this workspace, so secrets still come from the environment even when
    // documents and objects are enterprise-backed.
    const ENV_SECRET_PREFIX: &str = "SENTINEL_SECRET";
    let secret_store: Arc<dyn SecretStore> = Arc::new(sentinel_secrets::EnvSecretStore::new(ENV_SECRET_PREFIX));

    Ok((document_store, object_store, secret_store))
}

#[cfg(not(feature = "enterprise-store"))]
#[allow(clippy::type_complexity)]
async fn build_enterprise_storage(_config: &SentinelConfig) -> Result<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>, Arc<dyn SecretStore>), ContainerError> {
    Err(ContainerError::Storage("enterprise backend selected but this binary was not built with the \"enterprise-store\" feature".to_string()))
}

async fn register_license_signers(secrets: &dyn SecretStore, license_client: &LicenseClient, store: &dyn DocumentStore) -> Result<(), ContainerError> {
    let Some(master_key) = secrets.get_secret(LICENSE_SIGNING_MASTER_KEY_NAME).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))? else {
        tracing::warn!("no license signing master key configured, license requests will not be signed for any customer");
        return Ok(());
    };

    let mut cursor = None;
    loop {
        let page = store.list(crate::scheduler::CUSTOMERS_COLLECTION, "", cursor.as_deref()).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))?;
        for key in &page.keys {
            let Some(bytes) = store.get(crate::scheduler::CUSTOMERS_COLLECTION, key).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))? else {
                continue;
            };
            let customer: sentinel_core::Customer = serde_json::from_slice(&bytes).map_err(|err| ContainerError::Bootstrap(err.to_string()))?;
            let seed = derive_signing_seed(&master_key, customer.id.as_str());
            license_client.register_signer(customer.id, seed).await;
        }
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }
    Ok(())
}

/// Derives a per-customer signing seed as `sha256(master_key || customer_id)`,
/// so every customer gets a distinct, deterministic signer without storing
/// one secret per customer.
fn derive_signing_seed(master_key: &str, customer_id: &str) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(master_key.as_bytes());
    hasher.update(b"\0");
    hasher.update(customer_id.as_bytes());
    hasher.finalize().into()
}

async fn load_event_rule_map(store: &dyn DocumentStore) -> Result<EventRuleMap, ContainerError> {
    let Some(bytes) = store.get(EVENT_RULE_MAP_COLLECTION, EVENT_RULE_MAP_KEY).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))? else {
        tracing::info!("no event-rule map document found, event-driven jobs will never trigger until one is seeded");
        return Ok(EventRuleMap::default());
    };
    let entries: std::collections::HashMap<String, Vec<sentinel_core::RuleId>> =
        serde_json::from_slice(&bytes).map_err(|err| ContainerError::Bootstrap(err.to_string()))?;
    Ok(EventRuleMap::new(entries))
}

/// Document shape of the tenant group map: `projects` maps a tenant id to
/// its project name, `departments` maps a project name to its department.
#[derive(serde::Deserialize)]
struct TenantGroupDocument {
    #[serde(default)]
    projects: std::collections::HashMap<sentinel_core::TenantId, String>,
    #[serde(default)]
    departments: std::collections::HashMap<String, String>,
}

async fn load_tenant_groups(store: &dyn DocumentStore) -> Result<TenantGroupMap, ContainerError> {
    let Some(bytes) = store.get(TENANT_GROUP_MAP_COLLECTION, TENANT_GROUP_MAP_KEY).await.map_err(|err| ContainerError::Bootstrap(err.to_string()))? else {
        tracing::info!("no tenant-group map document found, every tenant will roll up as its own ungrouped project");
        return Ok(TenantGroupMap::default());
    };
    let document: TenantGroupDocument = serde_json::from_slice(&bytes).map_err(|err| ContainerError::Bootstrap(err.to_string()))?;
    Ok(TenantGroupMap::new(document.projects, document.departments))
}
