// crates/sentinel-events/src/ingest.rs
// ============================================================================
// Module: Event Ingestion
// Description: Normalizes a raw change-notification into the canonical
// Event shape and persists it with a spread-load partition key.
// Purpose: Implement the event batcher's `ingest` operation.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`EventIngestor::ingest`] normalizes a [`EventEnvelope`] into a
//! [`sentinel_core::Event`], computes its resource fingerprint, and writes it
//! under a partitioned key so writes spread across the document store rather
//! than hotspotting one key range. The partition number is supplied by the
//! caller (the `sentinel-server` dependency container), matching the existing
//! pattern of caller-supplied identifiers ([`sentinel_core::JobId`] at
//! submission, the nonce at license admission) rather than reaching for
//! randomness inside library code.

use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::Event;
use sentinel_core::EventId;
use sentinel_core::StoreError;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;
use sentinel_core::hashing::DEFAULT_HASH_ALGORITHM;
use sentinel_core::hashing::hash_canonical_json;
use serde::Serialize;
use std::sync::Arc;

/// A raw cloud change-notification, already mapped to Sentinel's field
/// names by the upstream cloud-specific adapter.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Tenant the event was observed in.
    pub tenant_id: TenantId,
    /// Cloud platform the event originated on.
    pub cloud: CloudProvider,
    /// Cloud account identifier the event was raised under.
    pub account_id: String,
    /// Resource type affected.
    pub resource_type: String,
    /// Cloud-native resource identifier.
    pub resource_id: String,
    /// Region the event occurred in.
    pub region: String,
    /// Name of the change-notification event.
    pub event_name: String,
}

#[derive(Serialize)]
struct FingerprintKey<'a> {
    cloud: CloudProvider,
    resource_type: &'a str,
    resource_id: &'a str,
    region: &'a str,
}

/// Computes the stable fingerprint used for dedup within a drain window.
#[must_use]
pub fn resource_fingerprint(envelope: &EventEnvelope) -> String {
    let key = FingerprintKey {
        cloud: envelope.cloud,
        resource_type: &envelope.resource_type,
        resource_id: &envelope.resource_id,
        region: &envelope.region,
    };
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &key).map(|digest| digest.value).unwrap_or_default()
}

/// Ingests cloud change events into the event store.
pub struct EventIngestor {
    store: Arc<dyn DocumentStore>,
    partition_count: u32,
}

impl EventIngestor {
    /// Creates an ingestor writing into `store`, spreading keys across
    /// `partition_count` partitions per tenant.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, partition_count: u32) -> Self {
        Self { store, partition_count: partition_count.max(1) }
    }

    /// Normalizes `envelope` and persists it, returning the assigned
    /// [`EventId`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn ingest(&self, envelope: EventEnvelope, event_id: EventId, partition: u32, now: Timestamp) -> Result<EventId, StoreError> {
        let fingerprint = resource_fingerprint(&envelope);
        let event = Event {
            id: event_id.clone(),
            customer_id: envelope.customer_id,
            tenant_id: envelope.tenant_id.clone(),
            cloud: envelope.cloud,
            account_id: envelope.account_id,
            resource_type: envelope.resource_type,
            resource_id: envelope.resource_id,
            region: envelope.region,
            event_name: envelope.event_name,
            resource_fingerprint: fingerprint,
            received_at: now,
        };
        let bytes = serde_json::to_vec(&event).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let bucket = partition % self.partition_count;
        let key = format!("{bucket}/{event_id}");
        self.store.put(&collection(event.tenant_id.as_str()), &key, &bytes).await?;
        tracing::debug!(tenant_id = %event.tenant_id, event_id = %event.id, "ingested event");
        Ok(event_id)
    }
}

/// Collection name events for `tenant_id` are stored under.
#[must_use]
pub fn collection(tenant_id: &str) -> String {
    format!("events/{tenant_id}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use sentinel_core::ListPage;
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

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            customer_id: CustomerId::new("cust-1"),
            tenant_id: TenantId::new("tenant-1"),
            cloud: CloudProvider::Aws,
            account_id: "111111111111".to_string(),
            resource_type: "aws.s3.bucket".to_string(),
            resource_id: "arn:aws:s3:::bucket-a".to_string(),
            region: "eu-west-1".to_string(),
            event_name: "s3.PutBucketAcl".to_string(),
        }
    }

    #[tokio::test]
    async fn ingest_persists_under_partitioned_key() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let ingestor = EventIngestor::new(store.clone(), 8);
        ingestor.ingest(envelope(), EventId::new("evt-1"), 3, Timestamp::from_epoch_millis(0)).await.expect("ingest");
        let page = store.list(&collection("tenant-1"), "", None).await.expect("list");
        assert_eq!(page.keys, vec!["3/evt-1".to_string()]);
    }

    #[test]
    fn fingerprint_is_stable_across_identical_resources() {
        let a = resource_fingerprint(&envelope());
        let b = resource_fingerprint(&envelope());
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_resource_id() {
        let mut other = envelope();
        other.resource_id = "arn:aws:s3:::bucket-b".to_string();
        assert_ne!(resource_fingerprint(&envelope()), resource_fingerprint(&other));
    }
}
