// crates/sentinel-events/src/drain.rs
// ============================================================================
// Module: Event Drain
// Description: Periodic windowed drain turning ingested events into a
// bounded number of event-driven job submissions.
// Purpose: Implement the event batcher's `drain(window)` operation.
// Dependencies: sentinel-core, crate::{ingest, mapping, license_filter,
// submitter}
// ============================================================================

//! ## Overview
//! [`EventDrainer::drain`] scans one tenant's events inside `[window_start,
//! window_end)`, deduplicates by `(event_name, resource_fingerprint)`, maps
//! surviving event names to candidate rules, narrows them to the tenant's
//! licensed rules, and submits a single event-driven job when any rule
//! survives. A [`sentinel_core::BatchResult`] records every event id the
//! drain consumed (not just the deduplicated survivors) so a second drain
//! over an overlapping window never re-triggers a job for events already
//! accounted for — the at-least-once/idempotent-redrain guarantee.

use std::collections::HashSet;

use sentinel_core::BatchResult;
use sentinel_core::BatchResultId;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::Event;
use sentinel_core::RuleId;
use sentinel_core::StoreError;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use std::sync::Arc;

use crate::ingest::collection;
use crate::license_filter::RuleLicenseFilter;
use crate::mapping::EventRuleMap;
use crate::submitter::EventDrivenJobSubmitter;

const BATCH_RESULTS_COLLECTION: &str = "batch_results";

/// Default sliding window size for [`EventDrainer::drain`], in seconds.
pub const DEFAULT_WINDOW_SECONDS: i64 = 15 * 60;

/// Summary of one [`EventDrainer::drain`] call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// Events observed inside the window.
    pub events_seen: usize,
    /// Events already consumed by a prior drain over an overlapping window.
    pub events_already_consumed: usize,
    /// Distinct `(event_name, resource_fingerprint)` pairs after dedup.
    pub distinct_resource_events: usize,
    /// Rule identifiers that survived the license filter.
    pub rules_triggered: Vec<RuleId>,
    /// Job submitted for this drain, if any rule survived.
    pub job_id: Option<sentinel_core::JobId>,
}

/// Drains ingested events into event-driven job submissions.
pub struct EventDrainer {
    store: Arc<dyn DocumentStore>,
    rule_map: EventRuleMap,
    license_filter: Arc<dyn RuleLicenseFilter>,
    submitter: Arc<dyn EventDrivenJobSubmitter>,
}

impl EventDrainer {
    /// Creates a drainer over `store`'s event collection.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, rule_map: EventRuleMap, license_filter: Arc<dyn RuleLicenseFilter>, submitter: Arc<dyn EventDrivenJobSubmitter>) -> Self {
        Self { store, rule_map, license_filter, submitter }
    }

    /// Drains `tenant_id`'s events inside `[window_start, window_end)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure reading or writing the
    /// event or batch-result collections.
    pub async fn drain(
        &self,
        customer_id: &CustomerId,
        tenant_id: &TenantId,
        cloud: CloudProvider,
        window_start: Timestamp,
        window_end: Timestamp,
        batch_result_id: BatchResultId,
        now: Timestamp,
    ) -> Result<DrainOutcome, StoreError> {
        let events = self.events_in_window(tenant_id, window_start, window_end).await?;
        let consumed = self.consumed_event_ids(tenant_id).await?;

        let mut outcome = DrainOutcome { events_seen: events.len(), ..DrainOutcome::default() };

        let mut seen_resource_events = HashSet::new();
        let mut candidate_rules = HashSet::new();
        let mut drained_event_ids = Vec::with_capacity(events.len());

        for event in &events {
            if event.cloud != cloud {
                continue;
            }
            drained_event_ids.push(event.id.clone());
            if consumed.contains(&event.id) {
                outcome.events_already_consumed += 1;
                continue;
            }
            if !seen_resource_events.insert((event.event_name.clone(), event.resource_fingerprint.clone())) {
                continue;
            }
            for rule_id in self.rule_map.rules_for(&event.event_name) {
                candidate_rules.insert(rule_id.clone());
            }
        }
        outcome.distinct_resource_events = seen_resource_events.len();

        if drained_event_ids.is_empty() {
            return Ok(outcome);
        }

        let candidate_rules: Vec<RuleId> = candidate_rules.into_iter().collect();
        let allowed_rules = self.license_filter.allowed_rules(customer_id, &candidate_rules).await;
        outcome.rules_triggered = allowed_rules.clone();

        let batch_result = BatchResult { id: batch_result_id, tenant_id: tenant_id.clone(), event_ids: drained_event_ids, window_start, window_end };
        self.persist_batch_result(&batch_result).await?;

        if !allowed_rules.is_empty() {
            match self.submitter.submit(customer_id, tenant_id, cloud, allowed_rules, now).await {
                Ok(job_id) => outcome.job_id = Some(job_id),
                Err(err) => tracing::warn!(tenant_id = %tenant_id, error = %err, "event-driven job submission failed"),
            }
        }

        Ok(outcome)
    }

    async fn events_in_window(&self, tenant_id: &TenantId, window_start: Timestamp, window_end: Timestamp) -> Result<Vec<Event>, StoreError> {
        let mut events = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.list(&collection(tenant_id.as_str()), "", cursor.as_deref()).await?;
            for key in &page.keys {
                let Some(bytes) = self.store.get(&collection(tenant_id.as_str()), key).await? else {
                    continue;
                };
                let event: Event = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                if event.received_at >= window_start && event.received_at < window_end {
                    events.push(event);
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(events)
    }

    async fn consumed_event_ids(&self, tenant_id: &TenantId) -> Result<HashSet<sentinel_core::EventId>, StoreError> {
        let mut consumed = HashSet::new();
        let mut cursor = None;
        loop {
            let page = self.store.list(BATCH_RESULTS_COLLECTION, tenant_id.as_str(), cursor.as_deref()).await?;
            for key in &page.keys {
                let Some(bytes) = self.store.get(BATCH_RESULTS_COLLECTION, key).await? else {
                    continue;
                };
                let batch_result: BatchResult = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                consumed.extend(batch_result.event_ids);
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(consumed)
    }

    async fn persist_batch_result(&self, batch_result: &BatchResult) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(batch_result).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let key = format!("{}/{}", batch_result.tenant_id.as_str(), batch_result.id.as_str());
        self.store.put(BATCH_RESULTS_COLLECTION, &key, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use sentinel_core::EventId;
    use sentinel_core::JobId;
    use sentinel_core::ListPage;
    use tokio::sync::Mutex;

    use super::*;
    use crate::ingest::EventIngestor;
    use crate::license_filter::AllowAllRules;

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

        async fn list(&self, collection: &str, prefix: &str, _cursor: Option<&str>) -> Result<ListPage, StoreError> {
            let documents = self.documents.lock().await;
            let keys = documents
                .keys()
                .filter_map(|full| full.split_once('/').filter(|(full_collection, _)| *full_collection == collection).map(|(_, key)| key.to_string()))
                .filter(|key| key.starts_with(prefix))
                .collect();
            Ok(ListPage { keys, next_cursor: None })
        }
    }

    struct RecordingSubmitter {
        calls: Mutex<Vec<Vec<RuleId>>>,
    }

    #[async_trait]
    impl EventDrivenJobSubmitter for RecordingSubmitter {
        async fn submit(&self, _customer_id: &CustomerId, _tenant_id: &TenantId, _cloud: CloudProvider, rule_ids: Vec<RuleId>, _now: Timestamp) -> Result<JobId, crate::submitter::EventSubmitError> {
            self.calls.lock().await.push(rule_ids);
            Ok(JobId::new("job-1"))
        }
    }

    async fn ingest_one(store: &Arc<InMemoryDocumentStore>, event_id: &str, event_name: &str, resource_id: &str, received_at: Timestamp) {
        let ingestor = EventIngestor::new(store.clone(), 4);
        let envelope = crate::ingest::EventEnvelope {
            customer_id: CustomerId::new("cust-1"),
            tenant_id: TenantId::new("tenant-1"),
            cloud: CloudProvider::Aws,
            account_id: "111111111111".to_string(),
            resource_type: "aws.s3.bucket".to_string(),
            resource_id: resource_id.to_string(),
            region: "eu-west-1".to_string(),
            event_name: event_name.to_string(),
        };
        ingestor.ingest(envelope, EventId::new(event_id), 0, received_at).await.expect("ingest");
    }

    #[tokio::test]
    async fn drain_submits_a_job_for_mapped_rules() {
        let store = Arc::new(InMemoryDocumentStore::default());
        ingest_one(&store, "evt-1", "s3.PutBucketAcl", "bucket-a", Timestamp::from_epoch_millis(1_000)).await;

        let rule_map = EventRuleMap::new([("s3.PutBucketAcl".to_string(), vec![RuleId::new("r1")])]);
        let submitter = Arc::new(RecordingSubmitter { calls: Mutex::new(Vec::new()) });
        let drainer = EventDrainer::new(store.clone(), rule_map, Arc::new(AllowAllRules), submitter.clone());

        let outcome = drainer
            .drain(
                &CustomerId::new("cust-1"),
                &TenantId::new("tenant-1"),
                CloudProvider::Aws,
                Timestamp::from_epoch_millis(0),
                Timestamp::from_epoch_millis(2_000),
                BatchResultId::new("batch-1"),
                Timestamp::from_epoch_millis(2_000),
            )
            .await
            .expect("drain");

        assert_eq!(outcome.events_seen, 1);
        assert_eq!(outcome.rules_triggered, vec![RuleId::new("r1")]);
        assert!(outcome.job_id.is_some());
        assert_eq!(submitter.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn redrain_of_the_same_window_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::default());
        ingest_one(&store, "evt-1", "s3.PutBucketAcl", "bucket-a", Timestamp::from_epoch_millis(1_000)).await;

        let rule_map = EventRuleMap::new([("s3.PutBucketAcl".to_string(), vec![RuleId::new("r1")])]);
        let submitter = Arc::new(RecordingSubmitter { calls: Mutex::new(Vec::new()) });
        let drainer = EventDrainer::new(store.clone(), rule_map, Arc::new(AllowAllRules), submitter.clone());

        for batch_id in ["batch-1", "batch-2"] {
            drainer
                .drain(
                    &CustomerId::new("cust-1"),
                    &TenantId::new("tenant-1"),
                    CloudProvider::Aws,
                    Timestamp::from_epoch_millis(0),
                    Timestamp::from_epoch_millis(2_000),
                    BatchResultId::new(batch_id),
                    Timestamp::from_epoch_millis(2_000),
                )
                .await
                .expect("drain");
        }

        assert_eq!(submitter.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_resource_events_collapse_to_one_rule_trigger() {
        let store = Arc::new(InMemoryDocumentStore::default());
        ingest_one(&store, "evt-1", "s3.PutBucketAcl", "bucket-a", Timestamp::from_epoch_millis(1_000)).await;
        ingest_one(&store, "evt-2", "s3.PutBucketAcl", "bucket-a", Timestamp::from_epoch_millis(1_500)).await;

        let rule_map = EventRuleMap::new([("s3.PutBucketAcl".to_string(), vec![RuleId::new("r1")])]);
        let submitter = Arc::new(RecordingSubmitter { calls: Mutex::new(Vec::new()) });
        let drainer = EventDrainer::new(store.clone(), rule_map, Arc::new(AllowAllRules), submitter);

        let outcome = drainer
            .drain(
                &CustomerId::new("cust-1"),
                &TenantId::new("tenant-1"),
                CloudProvider::Aws,
                Timestamp::from_epoch_millis(0),
                Timestamp::from_epoch_millis(2_000),
                BatchResultId::new("batch-1"),
                Timestamp::from_epoch_millis(2_000),
            )
            .await
            .expect("drain");

        assert_eq!(outcome.events_seen, 2);
        assert_eq!(outcome.distinct_resource_events, 1);
    }
}
