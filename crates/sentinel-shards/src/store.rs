// crates/sentinel-shards/src/store.rs
// ============================================================================
// Module: Findings Shard Store
// Description: Merge-on-write persistence of per-run shards into live
// buckets, plus the inactivity archival sweep.
// Purpose: Implement spec.md §4.8's Findings Shard Store operation end to
// end: bucket read, merge, bucket write, and archival.
// Dependencies: sentinel-core, crate::{codec, layout}
// ============================================================================

//! ## Overview
//! [`FindingsShardStore::apply_run`] is called once per finished job run with
//! the shards that run produced, already bucketed by
//! [`sentinel_worker::shard_builder::ShardBuilder`] upstream. For each
//! bucket it reads the current live bucket object, merges the fresh shard
//! into whichever prior shard shares its `(rule_id, region)` key using
//! [`sentinel_core::merge_shard`], and writes the bucket back. A shard in the
//! prior bucket whose `(rule_id, region)` was not produced this run is left
//! untouched, which is exactly spec.md §4.8's "rule not executed, prior
//! entries preserved" rule: this store only ever merges keys the caller
//! actually hands it.
//!
//! Archival tracks tenant activity in a small bookkeeping document rather
//! than listing the object store, since [`sentinel_core::ObjectStore`]
//! exposes no enumeration method and the set of dates a tenant has written
//! shards for is already known to this store at write time.

use std::sync::Arc;

use sentinel_core::CloudProvider;
use sentinel_core::DocumentStore;
use sentinel_core::ObjectStore;
use sentinel_core::Shard;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;
use sentinel_core::merge_shard;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::codec;
use crate::codec::CodecError;
use crate::layout::archive_key;
use crate::layout::live_key;

/// Every cloud platform a tenant's shards may be written under.
pub const ALL_CLOUDS: [CloudProvider; 4] = [CloudProvider::Aws, CloudProvider::Azure, CloudProvider::Gcp, CloudProvider::Kubernetes];

/// A tenant is archived after this many seconds without a successful scan
/// (four weeks), per `spec.md` §4.8.
pub const ARCHIVAL_THRESHOLD_SECONDS: i64 = 60 * 60 * 24 * 7 * 4;

/// Errors raised while reading or writing the findings shard store.
#[derive(Debug, Error)]
pub enum ShardStoreError {
    /// The underlying object or document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stored bucket could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Bookkeeping record tracking one tenant's scan activity and the dates it
/// has written shards for, so the archival sweep knows what to move without
/// listing the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantActivity {
    /// Timestamp of the tenant's most recent successful scan.
    pub last_successful_scan: Timestamp,
    /// Distinct `YYYY-MM-DD` dates this tenant has live shards under.
    pub dates: Vec<String>,
    /// Whether this tenant's shards have already been archived.
    pub archived: bool,
}

impl TenantActivity {
    fn record_date(&mut self, date: &str) {
        if !self.dates.iter().any(|existing| existing == date) {
            self.dates.push(date.to_string());
        }
    }
}

/// Collection bookkeeping documents for the findings shard store live under.
const ACTIVITY_COLLECTION: &str = "shard_activity";

/// Persists job-run shards with merge-on-write semantics and sweeps inactive
/// tenants into cold storage.
pub struct FindingsShardStore {
    objects: Arc<dyn ObjectStore>,
    bookkeeping: Arc<dyn DocumentStore>,
    shard_count: u32,
}

impl FindingsShardStore {
    /// Creates a store writing shard buckets to `objects` and tracking
    /// tenant activity in `bookkeeping`, bucketing into `shard_count`
    /// buckets (must match the bucket count `ShardBuilder` was configured
    /// with).
    #[must_use]
    pub fn new(objects: Arc<dyn ObjectStore>, bookkeeping: Arc<dyn DocumentStore>, shard_count: u32) -> Self {
        Self { objects, bookkeeping, shard_count: shard_count.max(1) }
    }

    /// Merges one job run's freshly produced shards into the tenant's live
    /// buckets for `cloud` on `date` (`YYYY-MM-DD`), then records the
    /// tenant's activity so an archival sweep knows this date exists.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError`] on backend failure or a corrupt stored
    /// bucket.
    pub async fn apply_run(&self, tenant_id: &str, cloud: CloudProvider, date: &str, fresh_shards: Vec<(u32, Shard)>, now: Timestamp) -> Result<(), ShardStoreError> {
        for (bucket, fresh) in fresh_shards {
            self.merge_into_bucket(tenant_id, cloud, date, bucket, fresh).await?;
        }
        self.record_successful_scan(tenant_id, date, now).await?;
        Ok(())
    }

    async fn merge_into_bucket(&self, tenant_id: &str, cloud: CloudProvider, date: &str, bucket: u32, fresh: Shard) -> Result<(), ShardStoreError> {
        let key = live_key(tenant_id, date, cloud, bucket % self.shard_count);
        let mut bucket_shards = match self.objects.get_object(&key).await? {
            Some(bytes) => codec::decode(&bytes)?,
            None => Vec::new(),
        };

        let existing = bucket_shards.iter().position(|shard| shard.rule_id == fresh.rule_id && shard.region == fresh.region);
        match existing {
            Some(index) => {
                let fresh_resource_ids: std::collections::BTreeSet<&str> = fresh.findings.iter().map(|finding| finding.resource_id.as_str()).collect();
                let remediated: Vec<String> = bucket_shards[index]
                    .findings
                    .iter()
                    .map(|finding| finding.resource_id.as_str())
                    .filter(|resource_id| !fresh_resource_ids.contains(resource_id))
                    .map(str::to_string)
                    .collect();
                bucket_shards[index] = merge_shard(&bucket_shards[index], &fresh, &remediated);
            }
            None => bucket_shards.push(fresh),
        }

        let encoded = codec::encode(&bucket_shards)?;
        self.objects.put_object(&key, &encoded, "application/gzip").await?;
        let cloud = cloud_segment_for_log(cloud);
        tracing::debug!(tenant_id, cloud, date, bucket, "merged shard bucket");
        Ok(())
    }

    async fn record_successful_scan(&self, tenant_id: &str, date: &str, now: Timestamp) -> Result<(), ShardStoreError> {
        let mut activity = self.read_activity(tenant_id).await?.unwrap_or(TenantActivity { last_successful_scan: now, dates: Vec::new(), archived: false });
        activity.last_successful_scan = now;
        activity.archived = false;
        activity.record_date(date);
        self.write_activity(tenant_id, &activity).await
    }

    async fn read_activity(&self, tenant_id: &str) -> Result<Option<TenantActivity>, ShardStoreError> {
        match self.bookkeeping.get(ACTIVITY_COLLECTION, tenant_id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn write_activity(&self, tenant_id: &str, activity: &TenantActivity) -> Result<(), ShardStoreError> {
        let bytes = serde_json::to_vec(activity).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.bookkeeping.put(ACTIVITY_COLLECTION, tenant_id, &bytes).await?;
        Ok(())
    }

    /// Moves every live shard bucket a tenant has written to `archive/...`
    /// if the tenant has had no successful scan in
    /// [`ARCHIVAL_THRESHOLD_SECONDS`]. Returns `true` if archival ran.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError`] on backend failure.
    pub async fn sweep_inactive_tenant(&self, tenant_id: &str, now: Timestamp) -> Result<bool, ShardStoreError> {
        let Some(mut activity) = self.read_activity(tenant_id).await? else {
            return Ok(false);
        };
        if activity.archived || now.seconds_since(activity.last_successful_scan) < ARCHIVAL_THRESHOLD_SECONDS {
            return Ok(false);
        }

        for date in &activity.dates {
            for cloud in ALL_CLOUDS {
                for bucket in 0..self.shard_count {
                    self.archive_bucket(tenant_id, cloud, date, bucket).await?;
                }
            }
        }

        activity.archived = true;
        self.write_activity(tenant_id, &activity).await?;
        tracing::info!(tenant_id, "archived inactive tenant's findings shards");
        Ok(true)
    }

    async fn archive_bucket(&self, tenant_id: &str, cloud: CloudProvider, date: &str, bucket: u32) -> Result<(), ShardStoreError> {
        let live = live_key(tenant_id, date, cloud, bucket);
        let Some(bytes) = self.objects.get_object(&live).await? else {
            return Ok(());
        };
        let archived = archive_key(tenant_id, date, cloud, bucket);
        self.objects.put_object(&archived, &bytes, "application/gzip").await?;
        self.objects.delete_object(&live).await?;
        Ok(())
    }
}

fn cloud_segment_for_log(cloud: CloudProvider) -> &'static str {
    crate::layout::cloud_segment(cloud)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use sentinel_core::Finding;
    use sentinel_core::ListPage;
    use sentinel_core::RuleId;
    use sentinel_core::Severity;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct InMemoryObjectStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.objects.lock().await.get(key).cloned())
        }

        async fn put_object(&self, key: &str, value: &[u8], _content_type: &str) -> Result<(), StoreError> {
            self.objects.lock().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
            self.objects.lock().await.remove(key);
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
            Ok(ListPage { keys: Vec::new(), next_cursor: None })
        }
    }

    fn finding(resource_id: &str, first_seen: i64) -> Finding {
        Finding {
            rule_id: RuleId::new("r1"),
            resource_id: resource_id.to_string(),
            region: "eu-west-1".to_string(),
            severity: Severity::High,
            first_seen: Timestamp::from_epoch_millis(first_seen),
            last_seen: Timestamp::from_epoch_millis(first_seen),
            evidence: serde_json::json!({}),
        }
    }

    fn store() -> FindingsShardStore {
        FindingsShardStore::new(Arc::new(InMemoryObjectStore::default()), Arc::new(InMemoryDocumentStore::default()), 16)
    }

    #[tokio::test]
    async fn first_run_writes_a_new_bucket() {
        let store = store();
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 100)]);
        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, shard)], Timestamp::from_epoch_millis(1_000)).await.expect("apply run");

        let key = live_key("tenant-1", "2026-07-28", CloudProvider::Aws, 0);
        let bytes = store.objects.get_object(&key).await.expect("get").expect("present");
        let decoded = codec::decode(&bytes).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].findings.len(), 1);
    }

    #[tokio::test]
    async fn second_run_replaces_reconfirmed_findings_and_drops_remediated_ones() {
        let store = store();
        let first = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 100), finding("bucket-b", 100)]);
        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, first)], Timestamp::from_epoch_millis(1_000)).await.expect("first run");

        let second = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 500)]);
        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, second)], Timestamp::from_epoch_millis(2_000)).await.expect("second run");

        let key = live_key("tenant-1", "2026-07-28", CloudProvider::Aws, 0);
        let bytes = store.objects.get_object(&key).await.expect("get").expect("present");
        let decoded = codec::decode(&bytes).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].findings.len(), 1);
        assert_eq!(decoded[0].findings[0].resource_id, "bucket-a");
        assert_eq!(decoded[0].findings[0].first_seen, Timestamp::from_epoch_millis(100));
    }

    #[tokio::test]
    async fn an_unexecuted_rule_region_pair_in_the_same_bucket_is_untouched() {
        let store = store();
        let r1 = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 100)]);
        let r2 = Shard::new(RuleId::new("r2"), "eu-west-1".to_string(), vec![finding("bucket-c", 100)]);
        store
            .apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, r1.clone()), (0, r2.clone())], Timestamp::from_epoch_millis(1_000))
            .await
            .expect("first run");

        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, r1)], Timestamp::from_epoch_millis(2_000)).await.expect("second run, r2 not executed");

        let key = live_key("tenant-1", "2026-07-28", CloudProvider::Aws, 0);
        let bytes = store.objects.get_object(&key).await.expect("get").expect("present");
        let decoded = codec::decode(&bytes).expect("decode");
        let r2_shard = decoded.iter().find(|shard| shard.rule_id == RuleId::new("r2")).expect("r2 preserved");
        assert_eq!(r2_shard.findings.len(), 1);
    }

    #[tokio::test]
    async fn sweep_is_a_no_op_before_the_inactivity_threshold() {
        let store = store();
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 100)]);
        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, shard)], Timestamp::from_epoch_millis(0)).await.expect("apply run");

        let archived = store.sweep_inactive_tenant("tenant-1", Timestamp::from_epoch_millis(1_000)).await.expect("sweep");
        assert!(!archived);
    }

    #[tokio::test]
    async fn sweep_moves_live_buckets_to_archive_after_the_threshold() {
        let store = store();
        let shard = Shard::new(RuleId::new("r1"), "eu-west-1".to_string(), vec![finding("bucket-a", 100)]);
        store.apply_run("tenant-1", CloudProvider::Aws, "2026-07-28", vec![(0, shard)], Timestamp::from_epoch_millis(0)).await.expect("apply run");

        let later = Timestamp::from_epoch_millis(0).plus_seconds(ARCHIVAL_THRESHOLD_SECONDS + 1);
        let archived = store.sweep_inactive_tenant("tenant-1", later).await.expect("sweep");
        assert!(archived);

        let live_bytes = store.objects.get_object(&live_key("tenant-1", "2026-07-28", CloudProvider::Aws, 0)).await.expect("get live");
        assert!(live_bytes.is_none());
        let archive_bytes = store.objects.get_object(&archive_key("tenant-1", "2026-07-28", CloudProvider::Aws, 0)).await.expect("get archive");
        assert!(archive_bytes.is_some());

        let redundant = store.sweep_inactive_tenant("tenant-1", later).await.expect("second sweep");
        assert!(!redundant);
    }
}
