// crates/sentinel-core/src/ports.rs
// ============================================================================
// Module: Sentinel Storage Ports
// Description: Backend-agnostic storage interfaces: documents, blobs, secrets.
// Purpose: Define the contract surfaces storage backends implement, so the
// rest of the workspace depends on traits rather than concrete drivers.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! Ports are backend-agnostic: [`sentinel-store-sqlite`](../../sentinel_store_sqlite)
//! implements them for single-node deployments, `sentinel-store-enterprise`
//! implements them against Postgres and S3. Every port is `Send + Sync` so it
//! can be shared across worker tasks behind an `Arc`, and every trait carries
//! a default `readiness()` check a caller can poll at startup and on a health
//! tick without needing a backend-specific health API.

use async_trait::async_trait;
use thiserror::Error;

/// Errors common to all storage ports.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O error (connection, disk, network).
    #[error("store io error: {0}")]
    Io(String),
    /// Stored data failed an integrity or schema check on read.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Write was rejected due to a conflicting concurrent write.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Backend reported an error not covered above.
    #[error("store error: {0}")]
    Backend(String),
}

/// A namespaced, versioned JSON document store.
///
/// Documents are addressed by `(collection, key)`; callers serialize their
/// own entities before calling [`DocumentStore::put`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document's raw bytes, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a document's raw bytes, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn put(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Deletes a document, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Lists keys in a collection with a given prefix, paginated via an
    /// opaque cursor returned in [`ListPage::next_cursor`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn list(&self, collection: &str, prefix: &str, cursor: Option<&str>) -> Result<ListPage, StoreError>;

    /// Checks that the backend is reachable and able to serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached. The default
    /// implementation performs a no-op read and reports success.
    async fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// One page of keys returned from [`DocumentStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// Matching keys in this page.
    pub keys: Vec<String>,
    /// Opaque cursor for the next page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// A content-addressed or path-addressed binary object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object's bytes, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes an object's bytes, replacing any existing value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn put_object(&self, key: &str, value: &[u8], content_type: &str) -> Result<(), StoreError>;

    /// Deletes an object, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// Checks that the configured bucket/container exists and is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached.
    async fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A write-locked, TTL-aware secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads a secret's current value, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn get_secret(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Writes a secret value with an optional TTL in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn put_secret(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError>;

    /// Checks that the backend is reachable at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached.
    async fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
