// crates/sentinel-server/src/authorizer.rs
// ============================================================================
// Module: Store-Backed Authorizer
// Description: Implements sentinel_jobs::manager::Authorizer against a
// periodically refreshed in-memory tenant cache.
// Purpose: Give JobManager::submit a caller-is-authorized check grounded on
// the stored Tenant -> Customer relationship, without making the
// (synchronous) Authorizer trait block on I/O per call.
// Dependencies: sentinel-core, sentinel-jobs
// ============================================================================

//! ## Overview
//! `sentinel_jobs::manager::Authorizer::authorize` is synchronous, so it
//! cannot read the document store directly without blocking the async
//! runtime per call. [`TenantCache`] holds the current `(customer, active)`
//! state for every known tenant in memory, refreshed by
//! [`TenantCache::refresh`] on the scheduler's health tick.
//! [`StoreBackedAuthorizer`] denies a submission whenever the tenant is
//! absent from the cache, inactive, or owned by a different customer than the
//! caller claims.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::DocumentStore;
use sentinel_core::StoreError;
use sentinel_core::Tenant;
use sentinel_core::TenantId;
use sentinel_jobs::AuthorizationError;
use sentinel_jobs::Authorizer;

/// Collection tenant documents are stored under.
pub const TENANTS_COLLECTION: &str = "tenants";

/// In-memory mirror of every tenant's owning customer, cloud, and active
/// flag, refreshed wholesale on a scheduler tick.
#[derive(Default)]
pub struct TenantCache {
    tenants: RwLock<HashMap<TenantId, (CustomerId, CloudProvider, bool)>>,
}

impl TenantCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads every tenant document from `store` and replaces the cache
    /// contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure or a corrupt tenant
    /// document.
    pub async fn refresh(&self, store: &dyn DocumentStore) -> Result<usize, StoreError> {
        let mut tenants = HashMap::new();
        let mut cursor = None;
        loop {
            let page = store.list(TENANTS_COLLECTION, "", cursor.as_deref()).await?;
            for key in &page.keys {
                let Some(bytes) = store.get(TENANTS_COLLECTION, key).await? else {
                    continue;
                };
                let tenant: Tenant = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                tenants.insert(tenant.id, (tenant.customer_id, tenant.cloud, tenant.active));
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        let count = tenants.len();
        *self.tenants.write().unwrap_or_else(std::sync::PoisonError::into_inner) = tenants;
        Ok(count)
    }

    fn lookup(&self, tenant_id: &TenantId) -> Option<(CustomerId, bool)> {
        self.tenants
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(tenant_id)
            .map(|(customer_id, _cloud, active)| (customer_id.clone(), *active))
    }

    /// Returns every currently active tenant, for scheduler ticks that must
    /// iterate every tenant (event drain, shard inactivity sweep, metrics).
    #[must_use]
    pub fn active_tenants(&self) -> Vec<(TenantId, CustomerId, CloudProvider)> {
        self.tenants
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|(_, (_, _, active))| *active)
            .map(|(tenant_id, (customer_id, cloud, _))| (tenant_id.clone(), customer_id.clone(), *cloud))
            .collect()
    }
}

/// Authorizes a submission against a [`TenantCache`] snapshot.
pub struct StoreBackedAuthorizer {
    cache: Arc<TenantCache>,
}

impl StoreBackedAuthorizer {
    /// Creates an authorizer reading from `cache`.
    #[must_use]
    pub fn new(cache: Arc<TenantCache>) -> Self {
        Self { cache }
    }
}

impl Authorizer for StoreBackedAuthorizer {
    fn authorize(&self, customer_id: &CustomerId, tenant_id: &TenantId) -> Result<(), AuthorizationError> {
        let denied = || AuthorizationError { tenant_id: tenant_id.clone() };
        match self.cache.lookup(tenant_id) {
            Some((owner, true)) if &owner == customer_id => Ok(()),
            _ => Err(denied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use async_trait::async_trait;
    use sentinel_core::CloudProvider;
    use sentinel_core::ListPage;
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

    fn tenant(customer_id: &str, active: bool) -> Tenant {
        Tenant {
            id: TenantId::new("tenant-1"),
            customer_id: CustomerId::new(customer_id),
            cloud: CloudProvider::Aws,
            native_id: "111111111111".to_string(),
            regions: vec!["eu-west-1".to_string()],
            active,
        }
    }

    #[tokio::test]
    async fn authorizes_an_active_tenant_owned_by_the_caller() {
        let store = InMemoryDocumentStore::default();
        store.put(TENANTS_COLLECTION, "tenant-1", &serde_json::to_vec(&tenant("cust-1", true)).unwrap()).await.unwrap();
        let cache = Arc::new(TenantCache::new());
        cache.refresh(&store).await.unwrap();
        let authorizer = StoreBackedAuthorizer::new(cache);
        assert!(authorizer.authorize(&CustomerId::new("cust-1"), &TenantId::new("tenant-1")).is_ok());
    }

    #[tokio::test]
    async fn denies_a_tenant_owned_by_a_different_customer() {
        let store = InMemoryDocumentStore::default();
        store.put(TENANTS_COLLECTION, "tenant-1", &serde_json::to_vec(&tenant("cust-2", true)).unwrap()).await.unwrap();
        let cache = Arc::new(TenantCache::new());
        cache.refresh(&store).await.unwrap();
        let authorizer = StoreBackedAuthorizer::new(cache);
        assert!(authorizer.authorize(&CustomerId::new("cust-1"), &TenantId::new("tenant-1")).is_err());
    }

    #[tokio::test]
    async fn denies_an_unknown_tenant() {
        let cache = Arc::new(TenantCache::new());
        let authorizer = StoreBackedAuthorizer::new(cache);
        assert!(authorizer.authorize(&CustomerId::new("cust-1"), &TenantId::new("tenant-1")).is_err());
    }
}
