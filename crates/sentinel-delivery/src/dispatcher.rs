// crates/sentinel-delivery/src/dispatcher.rs
// ============================================================================
// Module: Report Dispatcher
// Description: Fans a report out to every integration activated for its
// tenant, tracks per-(integration, report) delivery status, and drains
// failed deliveries on retry.
// Purpose: Implement spec.md §4.10's dispatch, retry-cap, and send-reports
// toggle semantics, grounded on decision-gate-broker::CompositeBroker's
// sink-registry-plus-dispatch shape.
// Dependencies: sentinel-core, crate::{report, retry, sink}
// ============================================================================

//! ## Overview
//! [`ReportDispatcher`] holds one [`crate::sink::Sink`] per `kind` (mirroring
//! `CompositeBroker`'s scheme-keyed source registry) and one
//! [`sentinel_core::DocumentStore`] for [`sentinel_core::ReportStatus`]
//! records. [`ReportDispatcher::dispatch`] is a no-op, by design, when the
//! owning customer has disabled `send_reports`: the report artifact itself
//! is produced and stored by the metrics pipeline regardless, so disabling
//! delivery never loses data, only suppresses the outbound side effect.

use std::collections::HashMap;
use std::sync::Arc;

use sentinel_core::DocumentStore;
use sentinel_core::Integration;
use sentinel_core::ReportId;
use sentinel_core::ReportStatus;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;
use thiserror::Error;

use crate::report::Report;
use crate::retry::should_retry;
use crate::sink::Sink;
use crate::sink::SinkError;

/// Errors raised while dispatching a report.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No registered sink matches the integration's `kind`.
    #[error("no sink registered for integration kind {0:?}")]
    UnknownSinkKind(String),
    /// The sink itself failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The report-status store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Collection report-status records are persisted under.
const STATUS_COLLECTION: &str = "report_status";

/// Fans reports out to activated integrations and tracks delivery status.
pub struct ReportDispatcher {
    sinks: HashMap<String, Arc<dyn Sink>>,
    status_store: Arc<dyn DocumentStore>,
}

impl ReportDispatcher {
    /// Creates a dispatcher with no sinks registered yet, tracking status in
    /// `status_store`.
    #[must_use]
    pub fn new(status_store: Arc<dyn DocumentStore>) -> Self {
        Self { sinks: HashMap::new(), status_store }
    }

    /// Registers a sink, keyed by its [`Sink::kind`].
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.insert(sink.kind().to_string(), sink);
        self
    }

    /// Delivers `report` to every integration activated for its tenant,
    /// unless `customer_send_reports_enabled` is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if a targeted integration names an
    /// unregistered sink kind, or the status store fails. Individual sink
    /// delivery failures are recorded on the report's status record, not
    /// propagated, matching spec.md §4.10's "failure never blocks other
    /// reports" rule.
    pub async fn dispatch(&self, customer_send_reports_enabled: bool, integrations: &[Integration], report_id: ReportId, report: &Report, now: Timestamp) -> Result<(), DeliveryError> {
        if !customer_send_reports_enabled {
            tracing::debug!(tenant_id = report.tenant_id.as_str(), "send_reports disabled; report artifact kept, delivery skipped");
            return Ok(());
        }
        for integration in integrations.iter().filter(|integration| integration.tenant_ids.contains(&report.tenant_id)) {
            self.deliver_one(integration, report_id.clone(), report, now).await?;
        }
        Ok(())
    }

    /// Re-attempts delivery for a set of previously failed deliveries. Skips
    /// any whose status already shows delivery succeeded or the attempt cap
    /// already reached.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] on store or sink-registry failure.
    pub async fn retry_send_reports(&self, pending: &[(Integration, ReportId, Report)], now: Timestamp) -> Result<RetryOutcome, DeliveryError> {
        let mut outcome = RetryOutcome::default();
        for (integration, report_id, report) in pending {
            let status = self.read_status(integration, report_id).await?;
            let attempts = status.map_or(0, |status| status.attempts);
            if !should_retry(attempts) {
                outcome.skipped_exhausted += 1;
                continue;
            }
            match self.deliver_one(integration, report_id.clone(), report, now).await {
                Ok(()) => outcome.retried += 1,
                Err(DeliveryError::Sink(_)) => outcome.still_failing += 1,
                Err(other) => return Err(other),
            }
        }
        Ok(outcome)
    }

    async fn deliver_one(&self, integration: &Integration, report_id: ReportId, report: &Report, now: Timestamp) -> Result<(), DeliveryError> {
        let Some(sink) = self.sinks.get(&integration.kind) else {
            return Err(DeliveryError::UnknownSinkKind(integration.kind.clone()));
        };

        let mut status = self.read_status(integration, &report_id).await?.unwrap_or(ReportStatus {
            id: report_id,
            integration_id: integration.id.clone(),
            tenant_id: report.tenant_id.clone(),
            attempts: 0,
            delivered: false,
            last_error: None,
            last_attempted_at: now,
        });
        status.attempts += 1;
        status.last_attempted_at = now;

        let result = sink.deliver(integration, report).await;
        match &result {
            Ok(()) => {
                status.delivered = true;
                status.last_error = None;
            }
            Err(err) => {
                status.last_error = Some(err.to_string());
                tracing::warn!(tenant_id = report.tenant_id.as_str(), integration_id = %integration.id, attempt = status.attempts, error = %err, "report delivery failed");
            }
        }
        self.write_status(&status).await?;
        result.map_err(DeliveryError::from)
    }

    fn status_key(integration: &Integration, report_id: &ReportId) -> String {
        format!("{}/{report_id}", integration.id)
    }

    async fn read_status(&self, integration: &Integration, report_id: &ReportId) -> Result<Option<ReportStatus>, StoreError> {
        match self.status_store.get(STATUS_COLLECTION, &Self::status_key(integration, report_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn write_status(&self, status: &ReportStatus) -> Result<(), StoreError> {
        let key = format!("{}/{}", status.integration_id, status.id);
        let bytes = serde_json::to_vec(status).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.status_store.put(STATUS_COLLECTION, &key, &bytes).await
    }
}

/// Summary of one `retry_send_reports` drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Deliveries that succeeded this pass.
    pub retried: u32,
    /// Deliveries that failed again but remain under the attempt cap.
    pub still_failing: u32,
    /// Deliveries skipped because the attempt cap was already reached.
    pub skipped_exhausted: u32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use async_trait::async_trait;
    use sentinel_core::CustomerId;
    use sentinel_core::IntegrationId;
    use sentinel_core::ListPage;
    use sentinel_core::TenantId;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct InMemoryDocumentStore {
        documents: Mutex<StdHashMap<String, Vec<u8>>>,
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
            Ok(ListPage { keys: Vec::new(), next_cursor: None })
        }
    }

    struct AlwaysFailsSink;

    #[async_trait]
    impl Sink for AlwaysFailsSink {
        async fn deliver(&self, _integration: &Integration, _report: &Report) -> Result<(), SinkError> {
            Err(SinkError::Transport("simulated failure".to_string()))
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }
    }

    struct AlwaysSucceedsSink;

    #[async_trait]
    impl Sink for AlwaysSucceedsSink {
        async fn deliver(&self, _integration: &Integration, _report: &Report) -> Result<(), SinkError> {
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }
    }

    fn integration() -> Integration {
        Integration { id: IntegrationId::new("int-1"), customer_id: CustomerId::new("cust-1"), kind: "flaky".to_string(), config: serde_json::json!({}), tenant_ids: vec![TenantId::new("tenant-1")] }
    }

    fn report() -> Report {
        Report { tenant_id: TenantId::new("tenant-1"), kind: "operational".to_string(), body: serde_json::json!({}), generated_at: Timestamp::from_epoch_millis(0) }
    }

    #[tokio::test]
    async fn disabled_send_reports_skips_every_integration() {
        let dispatcher = ReportDispatcher::new(Arc::new(InMemoryDocumentStore::default())).with_sink(Arc::new(AlwaysFailsSink));
        let result = dispatcher.dispatch(false, &[integration()], ReportId::new("r1"), &report(), Timestamp::from_epoch_millis(0)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failed_delivery_is_recorded_and_surfaced_without_panicking() {
        let dispatcher = ReportDispatcher::new(Arc::new(InMemoryDocumentStore::default())).with_sink(Arc::new(AlwaysFailsSink));
        let result = dispatcher.dispatch(true, &[integration()], ReportId::new("r1"), &report(), Timestamp::from_epoch_millis(0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retry_skips_deliveries_that_already_exhausted_the_attempt_cap() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let dispatcher = ReportDispatcher::new(store.clone()).with_sink(Arc::new(AlwaysFailsSink));
        let report_id = ReportId::new("r1");
        for attempt in 0..crate::retry::MAX_ATTEMPTS {
            let _ = dispatcher.dispatch(true, &[integration()], report_id.clone(), &report(), Timestamp::from_epoch_millis(i64::from(attempt))).await;
        }
        let outcome = dispatcher.retry_send_reports(&[(integration(), report_id, report())], Timestamp::from_epoch_millis(100)).await.expect("retry");
        assert_eq!(outcome.skipped_exhausted, 1);
        assert_eq!(outcome.retried, 0);
    }

    #[tokio::test]
    async fn retry_succeeds_once_the_sink_recovers() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let failing = ReportDispatcher::new(store.clone()).with_sink(Arc::new(AlwaysFailsSink));
        let report_id = ReportId::new("r1");
        let _ = failing.dispatch(true, &[integration()], report_id.clone(), &report(), Timestamp::from_epoch_millis(0)).await;

        let recovered = ReportDispatcher::new(store).with_sink(Arc::new(AlwaysSucceedsSink));
        let outcome = recovered.retry_send_reports(&[(integration(), report_id, report())], Timestamp::from_epoch_millis(1)).await.expect("retry");
        assert_eq!(outcome.retried, 1);
    }
}
