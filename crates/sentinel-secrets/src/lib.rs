// crates/sentinel-secrets/src/lib.rs
// ============================================================================
// Module: Sentinel Secrets
// Description: In-memory and environment-backed SecretStore implementations.
// Purpose: Cover development/testing deployments that do not run the
// enterprise SecretStore (Postgres/SQLite-backed, see sentinel-store-*).
// Dependencies: sentinel-core, tokio
// ============================================================================

//! ## Overview
//! [`InMemorySecretStore`] is a per-process, TTL-aware `SecretStore` writer
//! locked per name via a single [`tokio::sync::RwLock`] over the whole map
//! (contention is acceptable: secret writes are rare compared to reads).
//! [`EnvSecretStore`] reads from process environment variables and never
//! accepts writes, matching a sealed/immutable deployment secret source.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use sentinel_core::SecretStore;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;
use tokio::sync::RwLock;

struct Entry {
    value: String,
    expires_at: Option<Timestamp>,
}

/// A per-process, TTL-aware secret store held entirely in memory.
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(name) else {
            return Ok(None);
        };
        if let Some(expires_at) = entry.expires_at {
            if expires_at <= Timestamp::now() {
                return Ok(None);
            }
        }
        Ok(Some(entry.value.clone()))
    }

    async fn put_secret(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        let expires_at = ttl_seconds.map(|ttl| Timestamp::now().plus_seconds(i64::try_from(ttl).unwrap_or(i64::MAX)));
        let mut entries = self.entries.write().await;
        entries.insert(name.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }
}

/// A read-only secret store backed by process environment variables.
///
/// Secret names are upper-cased and prefixed with `prefix` to form the
/// environment variable name (e.g. prefix `SENTINEL_SECRET` and name
/// `license-signing-key` reads `SENTINEL_SECRET_LICENSE_SIGNING_KEY`).
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    /// Creates a store reading variables under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn env_var_name(&self, name: &str) -> String {
        let normalized = name.to_uppercase().replace(['-', '.'], "_");
        format!("{}_{}", self.prefix, normalized)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(env::var(self.env_var_name(name)).ok())
    }

    async fn put_secret(&self, _name: &str, _value: &str, _ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        Err(StoreError::Backend("env secret store is read-only".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_without_ttl() {
        let store = InMemorySecretStore::new();
        store.put_secret("license-key", "abc123", None).await.expect("put");
        assert_eq!(store.get_secret("license-key").await.expect("get"), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn in_memory_expires_after_ttl() {
        let store = InMemorySecretStore::new();
        store.put_secret("license-key", "abc123", Some(0)).await.expect("put");
        assert_eq!(store.get_secret("license-key").await.expect("get"), None);
    }

    #[test]
    fn env_var_name_is_upper_cased_and_prefixed() {
        let store = EnvSecretStore::new("SENTINEL_SECRET");
        assert_eq!(store.env_var_name("license-signing-key"), "SENTINEL_SECRET_LICENSE_SIGNING_KEY");
    }
}
