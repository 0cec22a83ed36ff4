// crates/sentinel-server/src/scheduler.rs
// ============================================================================
// Module: Scheduler Ticks
// Description: Drives every periodic operation the library crates document
// as "caller-scheduled" on one tokio::time::interval loop.
// Purpose: Nothing in this workspace runs its own cron; every crate that
// needs periodic work (event drain, license resync, metrics, delivery
// retry, job timeout, shard archival) says so in its own module doc and
// expects the binary boundary to call it on a timer. This is that timer.
// Dependencies: sentinel-core, sentinel-delivery, sentinel-events,
// sentinel-jobs, sentinel-license, sentinel-metrics, sentinel-shards, tokio
// ============================================================================

//! ## Overview
//! [`SchedulerTicks::run`] loops on a fixed [`tokio::time::interval`] and,
//! in order, runs: [`crate::authorizer::TenantCache::refresh`] (every later
//! tick reads its snapshot), a document-store health check, the event
//! drain, the license pending-notification flush, the metrics pipeline and
//! report dispatch, the report delivery retry, the job timeout sweep, and
//! the findings shard inactivity sweep. A [`sentinel_core::FatalCondition`]
//! from the health check ends the loop immediately; every other tick's
//! failure is logged and the loop continues, since a single tenant's event
//! drain or metrics run failing should never stop every other tenant's.

use std::collections::HashMap;
use std::sync::Arc;

use sentinel_core::BatchResultId;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::Customer;
use sentinel_core::DocumentStore;
use sentinel_core::FatalCondition;
use sentinel_core::Integration;
use sentinel_core::MetricRecord;
use sentinel_core::ObjectStore;
use sentinel_core::ReportId;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::Shard;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use sentinel_delivery::Report;
use sentinel_delivery::ReportDispatcher;
use sentinel_events::EventDrainer;
use sentinel_jobs::TimeoutSweep;
use sentinel_license::LicenseClient;
use sentinel_metrics::PipelineInput;
use sentinel_metrics::PipelineOutput;
use sentinel_metrics::TenantInput;
use sentinel_shards::FindingsShardStore;
use sentinel_shards::TenantActivity;
use sentinel_shards::live_key;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::authorizer::TenantCache;
use crate::dispatch::JOB_STATISTICS_COLLECTION;
use crate::dispatch::RULES_COLLECTION;
use crate::dispatch::StoredJobStatistics;
use crate::health::FatalConditionCheck;
use crate::ids::random_id;
use crate::licensing::LicenseKeyRegistry;
use crate::tenant_groups::TenantGroupMap;

/// How far back the metrics tick looks for completed job statistics when
/// building a customer's `weekly_job_statistics`.
const METRICS_LOOKBACK_SECONDS: i64 = 60 * 60 * 24 * 7;

/// Collection [`Customer`] documents are stored under, keyed by
/// `customer_id`.
pub const CUSTOMERS_COLLECTION: &str = "customers";
/// Collection [`Integration`] documents are stored under, keyed by
/// `integration_id`.
pub const INTEGRATIONS_COLLECTION: &str = "integrations";
/// Collection this server's last-computed [`MetricRecord`] per tenant is
/// stored under, so the delta stage has a prior week to compare against.
pub const METRIC_RECORDS_COLLECTION: &str = "metric_records";
/// Mirrors `sentinel_shards::store`'s private bookkeeping collection name,
/// since that crate exposes [`TenantActivity`] as a type but not a read
/// path: this server reads the same document directly off the shared
/// document store instead of asking the crate to expose one.
const SHARD_ACTIVITY_COLLECTION: &str = "shard_activity";

/// Number of top projects each department ranking keeps. `sentinel-config`
/// has no corresponding field for this; `sentinel_metrics::PipelineInput`
/// takes it as a bare `usize` the caller is expected to decide, so it is a
/// fixed constant here rather than a config knob nobody else would tune.
const DEPARTMENT_TOP_N: usize = 10;

/// Upper bound on how many not-yet-confirmed-delivered reports this process
/// carries forward for the next `retry_send_reports` tick, so an unbounded
/// stream of dispatch failures cannot grow this registry without limit.
const MAX_PENDING_REPORTS: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetricRecord {
    record: MetricRecord,
    resources_compliant: u64,
}

/// One customer's tenants, grouped for a single metrics pipeline run.
struct CustomerGroup {
    customer_id: CustomerId,
    tenants: Vec<(TenantId, CloudProvider)>,
}

/// Drives every scheduled operation in this process.
pub struct SchedulerTicks {
    tenant_cache: Arc<TenantCache>,
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    health: Arc<FatalConditionCheck>,
    event_drainer: Arc<EventDrainer>,
    batch_window_seconds: i64,
    license_client: Arc<LicenseClient>,
    license_registry: Arc<LicenseKeyRegistry>,
    timeout_sweep: Arc<TimeoutSweep>,
    shards: Arc<FindingsShardStore>,
    shard_count: u32,
    report_dispatcher: Arc<ReportDispatcher>,
    pending_reports: Mutex<Vec<(Integration, ReportId, Report)>>,
    tick_interval_seconds: u64,
    tenant_groups: TenantGroupMap,
}

impl SchedulerTicks {
    /// Creates a scheduler over every collaborator its ticks drive.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_cache: Arc<TenantCache>,
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        health: Arc<FatalConditionCheck>,
        event_drainer: Arc<EventDrainer>,
        batch_window_seconds: i64,
        license_client: Arc<LicenseClient>,
        license_registry: Arc<LicenseKeyRegistry>,
        timeout_sweep: Arc<TimeoutSweep>,
        shards: Arc<FindingsShardStore>,
        shard_count: u32,
        report_dispatcher: Arc<ReportDispatcher>,
        tick_interval_seconds: u64,
        tenant_groups: TenantGroupMap,
    ) -> Self {
        Self {
            tenant_cache,
            store,
            objects,
            health,
            event_drainer,
            batch_window_seconds,
            license_client,
            license_registry,
            timeout_sweep,
            shards,
            shard_count,
            report_dispatcher,
            pending_reports: Mutex::new(Vec::new()),
            tick_interval_seconds,
            tenant_groups,
        }
    }

    /// Runs the tick loop until `shutdown` is cancelled or a tick observes a
    /// [`FatalCondition`], in which case `fatal` is cancelled so `main` can
    /// exit the process.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken, fatal: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.tick_interval_seconds.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(condition) = self.tick_once(Timestamp::now()).await {
                        tracing::error!(error = %condition, "fatal condition observed on scheduler tick");
                        fatal.cancel();
                        return;
                    }
                }
            }
        }
    }

    /// Runs one full round of every scheduled operation.
    ///
    /// # Errors
    ///
    /// Returns [`FatalCondition`] only when the document-store health check
    /// reports sustained failure beyond its grace period; every other
    /// sub-tick's failure is logged and does not abort the round.
    pub async fn tick_once(&self, now: Timestamp) -> Result<(), FatalCondition> {
        match self.tenant_cache.refresh(self.store.as_ref()).await {
            Ok(count) => tracing::debug!(tenants = count, "tenant cache refreshed"),
            Err(err) => tracing::warn!(error = %err, "tenant cache refresh failed"),
        }

        self.health.check_tick(now).await?;

        self.run_event_drain_tick(now).await;
        self.run_license_resync_tick().await;
        self.run_metrics_and_delivery_tick(now).await;
        self.run_delivery_retry_tick(now).await;
        self.run_timeout_sweep_tick(now).await;
        self.run_shard_sweep_tick(now).await;

        Ok(())
    }

    async fn run_event_drain_tick(&self, now: Timestamp) {
        let window_start = now.plus_seconds(-self.batch_window_seconds);
        for (tenant_id, customer_id, cloud) in self.tenant_cache.active_tenants() {
            let batch_result_id = BatchResultId::new(random_id("batch"));
            match self.event_drainer.drain(&customer_id, &tenant_id, cloud, window_start, now, batch_result_id, now).await {
                Ok(outcome) => {
                    if outcome.job_id.is_some() {
                        tracing::info!(tenant_id = %tenant_id, rules = outcome.rules_triggered.len(), "event-driven job submitted");
                    }
                }
                Err(err) => tracing::warn!(tenant_id = %tenant_id, error = %err, "event drain failed"),
            }
        }
    }

    async fn run_license_resync_tick(&self) {
        let registry = Arc::clone(&self.license_registry);
        let flushed = self.license_client.flush_pending_notifications(move |key| registry.customer_id_of(key)).await;
        if flushed > 0 {
            tracing::info!(flushed, "license pending notifications flushed");
        }
    }

    async fn run_timeout_sweep_tick(&self, now: Timestamp) {
        match self.timeout_sweep.run(now).await {
            Ok(transitioned) if !transitioned.is_empty() => tracing::info!(count = transitioned.len(), "jobs timed out"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "job timeout sweep failed"),
        }
    }

    async fn run_shard_sweep_tick(&self, now: Timestamp) {
        for (tenant_id, _customer_id, _cloud) in self.tenant_cache.active_tenants() {
            match self.shards.sweep_inactive_tenant(tenant_id.as_str(), now).await {
                Ok(true) => tracing::info!(tenant_id = %tenant_id, "tenant archived for inactivity"),
                Ok(false) => {}
                Err(err) => tracing::warn!(tenant_id = %tenant_id, error = %err, "shard inactivity sweep failed"),
            }
        }
    }

    async fn run_delivery_retry_tick(&self, now: Timestamp) {
        let pending = self.pending_reports.lock().await.clone();
        if pending.is_empty() {
            return;
        }
        match self.report_dispatcher.retry_send_reports(&pending, now).await {
            Ok(outcome) => {
                tracing::info!(retried = outcome.retried, still_failing = outcome.still_failing, skipped = outcome.skipped_exhausted, "delivery retry tick");
                if outcome.still_failing == 0 {
                    self.pending_reports.lock().await.clear();
                }
            }
            Err(err) => tracing::warn!(error = %err, "delivery retry tick failed"),
        }
    }

    async fn read_customer(&self, customer_id: &CustomerId) -> Option<Customer> {
        match self.store.get(CUSTOMERS_COLLECTION, customer_id.as_str()).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(customer_id = %customer_id, error = %err, "failed to read customer document");
                None
            }
        }
    }

    async fn integrations_for(&self, customer_id: &CustomerId, tenant_id: &TenantId) -> Vec<Integration> {
        let mut matches = Vec::new();
        let mut cursor = None;
        loop {
            let page = match self.store.list(INTEGRATIONS_COLLECTION, "", cursor.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(customer_id = %customer_id, error = %err, "failed to list integrations");
                    return matches;
                }
            };
            for key in &page.keys {
                if let Ok(Some(bytes)) = self.store.get(INTEGRATIONS_COLLECTION, key).await {
                    if let Ok(integration) = serde_json::from_slice::<Integration>(&bytes) {
                        if &integration.customer_id == customer_id && (integration.tenant_ids.is_empty() || integration.tenant_ids.contains(tenant_id)) {
                            matches.push(integration);
                        }
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        matches
    }

    async fn read_previous_metric_record(&self, tenant_id: &TenantId) -> Option<StoredMetricRecord> {
        match self.store.get(METRIC_RECORDS_COLLECTION, tenant_id.as_str()).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            _ => None,
        }
    }

    async fn write_metric_record(&self, tenant_id: &TenantId, record: &StoredMetricRecord) {
        if let Ok(bytes) = serde_json::to_vec(record) {
            if let Err(err) = self.store.put(METRIC_RECORDS_COLLECTION, tenant_id.as_str(), &bytes).await {
                tracing::warn!(tenant_id = %tenant_id, error = %err, "failed to persist metric record");
            }
        }
    }

    async fn read_weekly_job_statistics(&self, customer_id: &CustomerId, now: Timestamp) -> HashMap<TenantId, Vec<sentinel_core::JobStatistics>> {
        let mut by_tenant: HashMap<TenantId, Vec<sentinel_core::JobStatistics>> = HashMap::new();
        let mut cursor = None;
        loop {
            let page = match self.store.list(JOB_STATISTICS_COLLECTION, "", cursor.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(customer_id = %customer_id, error = %err, "failed to list job statistics");
                    return by_tenant;
                }
            };
            for key in &page.keys {
                if let Ok(Some(bytes)) = self.store.get(JOB_STATISTICS_COLLECTION, key).await {
                    if let Ok(record) = serde_json::from_slice::<StoredJobStatistics>(&bytes) {
                        if &record.customer_id == customer_id && now.seconds_since(record.finished_at) <= METRICS_LOOKBACK_SECONDS {
                            by_tenant.entry(record.tenant_id.clone()).or_default().push(record.statistics);
                        }
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        by_tenant
    }

    async fn read_rule(&self, rule_id: &RuleId) -> Option<Rule> {
        match self.store.get(RULES_COLLECTION, rule_id.as_str()).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            _ => None,
        }
    }

    async fn gather_tenant_shards(&self, tenant_id: &TenantId, cloud: CloudProvider) -> Vec<Shard> {
        let activity: Option<TenantActivity> = match self.store.get(SHARD_ACTIVITY_COLLECTION, tenant_id.as_str()).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            _ => None,
        };
        let Some(activity) = activity else {
            return Vec::new();
        };

        let mut shards = Vec::new();
        for date in &activity.dates {
            for bucket in 0..self.shard_count {
                let key = live_key(tenant_id.as_str(), date, cloud, bucket);
                match self.objects.get_object(&key).await {
                    Ok(Some(bytes)) => match sentinel_shards::codec::decode(&bytes) {
                        Ok(decoded) => shards.extend(decoded),
                        Err(err) => tracing::warn!(tenant_id = %tenant_id, key, error = %err, "failed to decode shard bucket"),
                    },
                    Ok(None) => {}
                    Err(err) => tracing::warn!(tenant_id = %tenant_id, key, error = %err, "failed to read shard bucket"),
                }
            }
        }
        shards
    }

    fn group_active_tenants_by_customer(&self) -> Vec<CustomerGroup> {
        let mut groups: HashMap<CustomerId, Vec<(TenantId, CloudProvider)>> = HashMap::new();
        for (tenant_id, customer_id, cloud) in self.tenant_cache.active_tenants() {
            groups.entry(customer_id).or_default().push((tenant_id, cloud));
        }
        groups.into_iter().map(|(customer_id, tenants)| CustomerGroup { customer_id, tenants }).collect()
    }

    async fn run_metrics_and_delivery_tick(&self, now: Timestamp) {
        for group in self.group_active_tenants_by_customer() {
            let Some(customer) = self.read_customer(&group.customer_id).await else {
                tracing::warn!(customer_id = %group.customer_id, "skipping metrics run, customer document missing");
                continue;
            };

            let statistics_by_tenant = self.read_weekly_job_statistics(&group.customer_id, now).await;
            let weekly_job_statistics = statistics_by_tenant.values().flatten().copied().collect();

            let mut tenant_inputs = Vec::with_capacity(group.tenants.len());
            let mut rules_by_id: HashMap<RuleId, Rule> = HashMap::new();

            for (tenant_id, cloud) in &group.tenants {
                let shards = self.gather_tenant_shards(tenant_id, *cloud).await;
                for shard in &shards {
                    if !rules_by_id.contains_key(&shard.rule_id) {
                        if let Some(rule) = self.read_rule(&shard.rule_id).await {
                            rules_by_id.insert(shard.rule_id.clone(), rule);
                        }
                    }
                }

                let resources_scanned = statistics_by_tenant.get(tenant_id).map_or(0, |runs| runs.iter().map(|stats| stats.resources_scanned).sum());
                let previous = self.read_previous_metric_record(tenant_id).await;
                let previous_resources_compliant = previous.as_ref().map_or(0, |stored| stored.resources_compliant);
                let previous_metric_record = previous.as_ref().map(|stored| stored.record);

                let project = self.tenant_groups.project_for(tenant_id);
                let department = self.tenant_groups.department_for(&project);

                tenant_inputs.push(TenantInput {
                    partition: sentinel_core::PartitionKey { customer_id: group.customer_id.clone(), tenant_id: tenant_id.clone(), region: "*".to_string() },
                    project,
                    department,
                    shards,
                    resources_scanned,
                    previous_metric_record,
                    previous_resources_compliant,
                });
            }

            let input = PipelineInput {
                customer_id: group.customer_id.clone(),
                tenants: tenant_inputs,
                rules_by_id,
                weekly_job_statistics,
                department_top_n: DEPARTMENT_TOP_N,
                now,
            };

            let output = sentinel_metrics::run_pipeline(input).await;
            self.dispatch_reports(&customer, &output, now).await;
            self.persist_metric_records(&output, now).await;
        }
    }

    async fn persist_metric_records(&self, output: &PipelineOutput, now: Timestamp) {
        for (tenant_id, operational) in &output.operational {
            let record = sentinel_metrics::to_metric_record(operational, now);
            let resources_compliant = operational.resources_scanned.saturating_sub(operational.overview.total_resources_violated);
            self.write_metric_record(tenant_id, &StoredMetricRecord { record, resources_compliant }).await;
        }
    }

    async fn dispatch_reports(&self, customer: &Customer, output: &PipelineOutput, now: Timestamp) {
        for (tenant_id, operational) in &output.operational {
            let report = Report { tenant_id: tenant_id.clone(), kind: "operational".to_string(), body: serde_json::json!(operational), generated_at: now };
            self.dispatch_one(customer, tenant_id, report, now).await;
        }
        for (tenant_id, delta) in &output.delta {
            let report = Report { tenant_id: tenant_id.clone(), kind: "delta".to_string(), body: serde_json::json!(delta), generated_at: now };
            self.dispatch_one(customer, tenant_id, report, now).await;
        }
        for (tenant_id, views) in &output.finops {
            let report = Report { tenant_id: tenant_id.clone(), kind: "finops".to_string(), body: serde_json::json!(views), generated_at: now };
            self.dispatch_one(customer, tenant_id, report, now).await;
        }
        for (tenant_id, view) in &output.kubernetes {
            let report = Report { tenant_id: tenant_id.clone(), kind: "kubernetes".to_string(), body: serde_json::json!(view), generated_at: now };
            self.dispatch_one(customer, tenant_id, report, now).await;
        }
    }

    async fn dispatch_one(&self, customer: &Customer, tenant_id: &TenantId, report: Report, now: Timestamp) {
        let integrations = self.integrations_for(&customer.id, tenant_id).await;
        let report_id = ReportId::new(random_id("report"));
        if let Err(err) = self.report_dispatcher.dispatch(customer.send_reports, &integrations, report_id.clone(), &report, now).await {
            tracing::warn!(tenant_id = %tenant_id, error = %err, "report dispatch failed");
        }
        let mut pending = self.pending_reports.lock().await;
        for integration in integrations {
            if pending.len() >= MAX_PENDING_REPORTS {
                tracing::warn!("pending report registry at capacity, dropping oldest entry");
                pending.remove(0);
            }
            pending.push((integration, report_id.clone(), report.clone()));
        }
    }
}
