// crates/sentinel-store-enterprise/src/s3_store.rs
// ============================================================================
// Module: S3 Object Store
// Description: S3-backed ObjectStore for managed deployments.
// Purpose: Store raw shard archives and rule bundles in object storage.
// Dependencies: aws-config, aws-sdk-s3, sentinel-core
// ============================================================================

//! ## Overview
//! Gated behind the `s3-backend` feature. Objects are addressed directly by
//! key; no archive packing is performed here (shard gzip framing is owned by
//! `sentinel-shards`, which calls this store with already-compressed bytes).

#![cfg(feature = "s3-backend")]

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use sentinel_core::ObjectStore;
use sentinel_core::StoreError;
use serde::Deserialize;
use serde::Serialize;

/// S3 bucket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3StoreConfig {
    /// Bucket name.
    pub bucket: String,
    /// AWS region; falls back to the environment/profile default when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Optional key prefix applied to every object.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// S3-backed `ObjectStore`.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    /// Builds an S3 client from the ambient AWS configuration (environment,
    /// profile, or instance role) and targets the configured bucket.
    pub async fn connect(config: S3StoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self { client: Client::new(&sdk_config), bucket: config.bucket, prefix: config.prefix }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self.client.get_object().bucket(&self.bucket).key(self.full_key(key)).send().await;
        match result {
            Ok(output) => {
                let bytes = output.body.collect().await.map_err(|err| StoreError::Io(err.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => Ok(None),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    async fn put_object(&self, key: &str, value: &[u8], content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(ByteStream::from(value.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn readiness(&self) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }
}
