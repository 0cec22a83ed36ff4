// crates/sentinel-server/src/provider.rs
// ============================================================================
// Module: Inventory-Backed Cloud Resource Provider
// Description: Implements sentinel_worker::CloudResourceProvider by reading
// pre-collected resource inventory from the object store, rather than
// calling a cloud SDK.
// Purpose: Give the worker pipeline a concrete resource source within scope
// (real cloud SDK calls inside rule evaluation are explicitly out of scope),
// grounded on the fail-closed, config-driven shape of a local evidence
// provider.
// Dependencies: sentinel-core, sentinel-worker, serde_json
// ============================================================================

//! ## Overview
//! Cloud-provider SDK calls are out of scope (`spec.md` §1), so a real
//! deployment's inventory collector (run outside this process) writes one
//! JSON array of resource attribute maps per `(cloud, region, resource_type)`
//! to the object store, and [`InventoryResourceProvider::enumerate`] reads it
//! back. This mirrors the fail-closed posture of a local evidence provider:
//! a resource missing its `id` field, a payload over the configured size
//! limit, or a store failure are all treated as fatal for the region rather
//! than silently skipped, since a worker that cannot trust its inventory
//! should not report findings against it.

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::ObjectStore;
use sentinel_core::WorkerExitCode;
use sentinel_credentials::ResolvedCredentials;
use sentinel_worker::CloudResourceProvider;
use sentinel_worker::RegionFailure;
use sentinel_worker::RegionFailureClass;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on the number of resources one `(cloud, region, resource_type)`
/// inventory file may contain, guarding against a runaway collector payload.
const MAX_RESOURCES_PER_TYPE: usize = 250_000;

/// Errors raised while reading inventory for one region/resource type.
#[derive(Debug, Error)]
pub enum InventoryProviderError {
    /// The object store itself failed.
    #[error("inventory object store failed: {0}")]
    Store(String),
    /// The stored inventory was not a JSON array of objects.
    #[error("inventory payload for {0} is not a JSON array of resource objects")]
    MalformedPayload(String),
    /// An inventory entry carried no `id` field.
    #[error("inventory entry for {0} is missing its resource id")]
    MissingResourceId(String),
    /// The inventory file exceeded [`MAX_RESOURCES_PER_TYPE`].
    #[error("inventory for {0} exceeds the maximum resource count")]
    TooManyResources(String),
}

impl RegionFailure for InventoryProviderError {
    fn classify(&self) -> RegionFailureClass {
        RegionFailureClass::Fatal(WorkerExitCode::NonRetryableFailure)
    }
}

/// Reads cloud resource inventory from an [`ObjectStore`] instead of calling
/// a cloud SDK.
pub struct InventoryResourceProvider {
    objects: Arc<dyn ObjectStore>,
}

impl InventoryResourceProvider {
    /// Creates a provider reading inventory snapshots from `objects`.
    #[must_use]
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Key an inventory snapshot for `(cloud, region, resource_type)` is
    /// stored under.
    #[must_use]
    pub fn inventory_key(cloud: CloudProvider, region: &str, resource_type: &str) -> String {
        format!("inventory/{}/{region}/{resource_type}.json", cloud_segment(cloud))
    }
}

fn cloud_segment(cloud: CloudProvider) -> &'static str {
    match cloud {
        CloudProvider::Aws => "aws",
        CloudProvider::Azure => "azure",
        CloudProvider::Gcp => "gcp",
        CloudProvider::Kubernetes => "kubernetes",
    }
}

#[async_trait]
impl CloudResourceProvider for InventoryResourceProvider {
    type Error = InventoryProviderError;

    async fn enumerate(&self, cloud: CloudProvider, region: &str, resource_type: &str, _credentials: &ResolvedCredentials) -> Result<Vec<Value>, Self::Error> {
        let key = Self::inventory_key(cloud, region, resource_type);
        let Some(bytes) = self.objects.get_object(&key).await.map_err(|err| InventoryProviderError::Store(err.to_string()))? else {
            return Ok(Vec::new());
        };
        let Value::Array(resources) = serde_json::from_slice::<Value>(&bytes).map_err(|_| InventoryProviderError::MalformedPayload(resource_type.to_string()))? else {
            return Err(InventoryProviderError::MalformedPayload(resource_type.to_string()));
        };
        if resources.len() > MAX_RESOURCES_PER_TYPE {
            return Err(InventoryProviderError::TooManyResources(resource_type.to_string()));
        }
        for resource in &resources {
            if sentinel_worker::resource_identifier(resource).is_none() {
                return Err(InventoryProviderError::MissingResourceId(resource_type.to_string()));
            }
        }
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sentinel_core::StoreError;
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

    fn credentials() -> ResolvedCredentials {
        ResolvedCredentials::InstanceDefault
    }

    #[tokio::test]
    async fn missing_inventory_is_an_empty_list_not_an_error() {
        let provider = InventoryResourceProvider::new(Arc::new(InMemoryObjectStore::default()));
        let result = provider.enumerate(CloudProvider::Aws, "eu-west-1", "aws.s3.bucket", &credentials()).await.expect("enumerate");
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn resources_without_an_id_field_are_rejected() {
        let objects = Arc::new(InMemoryObjectStore::default());
        let key = InventoryResourceProvider::inventory_key(CloudProvider::Aws, "eu-west-1", "aws.s3.bucket");
        objects.put_object(&key, br#"[{"name": "no-id-here"}]"#, "application/json").await.unwrap();
        let provider = InventoryResourceProvider::new(objects);
        let result = provider.enumerate(CloudProvider::Aws, "eu-west-1", "aws.s3.bucket", &credentials()).await;
        assert!(matches!(result, Err(InventoryProviderError::MissingResourceId(_))));
    }

    #[tokio::test]
    async fn well_formed_inventory_is_returned_as_is() {
        let objects = Arc::new(InMemoryObjectStore::default());
        let key = InventoryResourceProvider::inventory_key(CloudProvider::Aws, "eu-west-1", "aws.s3.bucket");
        objects.put_object(&key, br#"[{"id": "arn:aws:s3:::bucket-a"}]"#, "application/json").await.unwrap();
        let provider = InventoryResourceProvider::new(objects);
        let result = provider.enumerate(CloudProvider::Aws, "eu-west-1", "aws.s3.bucket", &credentials()).await.expect("enumerate");
        assert_eq!(result.len(), 1);
    }
}
