// crates/sentinel-server/src/health.rs
// ============================================================================
// Module: Fatal Condition Check
// Description: Polls the wired storage ports' readiness() and turns a
// sustained failure into a FatalCondition.
// Purpose: Give main.rs a startup gate and the scheduler a health tick that
// both resolve to the same small set of process-exit conditions.
// Dependencies: sentinel-core, tokio
// ============================================================================

//! ## Overview
//! [`FatalConditionCheck::check_startup`] runs once before the server
//! accepts any work: the secret store and object store must answer
//! [`SecretStore::readiness`]/[`ObjectStore::readiness`] immediately, since
//! neither has a grace period at startup. [`FatalConditionCheck::check_tick`]
//! runs on every scheduler tick and only escalates a document store failure
//! to [`FatalCondition::DocumentStoreLost`] once it has been failing
//! continuously for `grace_seconds`, tracking the first failure with a
//! [`tokio::sync::Mutex`] rather than treating one transient error as fatal.

use std::sync::Arc;

use sentinel_core::DocumentStore;
use sentinel_core::FatalCondition;
use sentinel_core::ObjectStore;
use sentinel_core::SecretStore;
use sentinel_core::Timestamp;
use tokio::sync::Mutex;

/// Polls storage readiness and classifies sustained failure as fatal.
pub struct FatalConditionCheck {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    secrets: Arc<dyn SecretStore>,
    grace_seconds: u64,
    document_store_failing_since: Mutex<Option<Timestamp>>,
}

impl FatalConditionCheck {
    /// Creates a check over the given storage ports, escalating a document
    /// store outage to fatal after `grace_seconds` of continuous failure.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>, secrets: Arc<dyn SecretStore>, grace_seconds: u64) -> Self {
        Self { store, objects, secrets, grace_seconds, document_store_failing_since: Mutex::new(None) }
    }

    /// Runs the startup gate: secret store and object store must be
    /// reachable immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FatalCondition::SecretStoreUnreachable`] or
    /// [`FatalCondition::ObjectStoreBucketMissing`] on failure.
    pub async fn check_startup(&self) -> Result<(), FatalCondition> {
        self.secrets.readiness().await.map_err(|err| FatalCondition::SecretStoreUnreachable(err.to_string()))?;
        self.objects.readiness().await.map_err(|err| FatalCondition::ObjectStoreBucketMissing(err.to_string()))?;
        Ok(())
    }

    /// Runs the periodic health tick: escalates document store failure to
    /// fatal once it has persisted beyond the configured grace period.
    ///
    /// # Errors
    ///
    /// Returns [`FatalCondition::DocumentStoreLost`] once the grace period
    /// has elapsed with the store still unreachable.
    pub async fn check_tick(&self, now: Timestamp) -> Result<(), FatalCondition> {
        let mut failing_since = self.document_store_failing_since.lock().await;
        match self.store.readiness().await {
            Ok(()) => {
                *failing_since = None;
                Ok(())
            }
            Err(_) => {
                let since = *failing_since.get_or_insert(now);
                if now.seconds_since(since) >= i64::try_from(self.grace_seconds).unwrap_or(i64::MAX) {
                    Err(FatalCondition::DocumentStoreLost { grace_seconds: self.grace_seconds })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sentinel_core::StoreError;

    use super::*;

    struct AlwaysReady;

    #[async_trait]
    impl DocumentStore for AlwaysReady {
        async fn get(&self, _collection: &str, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn put(&self, _collection: &str, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete(&self, _collection: &str, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list(&self, _collection: &str, _prefix: &str, _cursor: Option<&str>) -> Result<sentinel_core::ListPage, StoreError> {
            Ok(sentinel_core::ListPage { keys: Vec::new(), next_cursor: None })
        }
    }

    struct NeverReady;

    #[async_trait]
    impl DocumentStore for NeverReady {
        async fn get(&self, _collection: &str, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn put(&self, _collection: &str, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete(&self, _collection: &str, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list(&self, _collection: &str, _prefix: &str, _cursor: Option<&str>) -> Result<sentinel_core::ListPage, StoreError> {
            Ok(sentinel_core::ListPage { keys: Vec::new(), next_cursor: None })
        }

        async fn readiness(&self) -> Result<(), StoreError> {
            Err(StoreError::Io("connection refused".to_string()))
        }
    }

    struct AlwaysReadyBlob;

    #[async_trait]
    impl ObjectStore for AlwaysReadyBlob {
        async fn get_object(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn put_object(&self, _key: &str, _value: &[u8], _content_type: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_object(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct AlwaysReadySecrets;

    #[async_trait]
    impl SecretStore for AlwaysReadySecrets {
        async fn get_secret(&self, _name: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn put_secret(&self, _name: &str, _value: &str, _ttl_seconds: Option<u64>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_single_failing_tick_within_the_grace_period_is_not_fatal() {
        let check = FatalConditionCheck::new(Arc::new(NeverReady), Arc::new(AlwaysReadyBlob), Arc::new(AlwaysReadySecrets), 60);
        let now = Timestamp::from_epoch_millis(0);
        assert!(check.check_tick(now).await.is_ok());
    }

    #[tokio::test]
    async fn failure_past_the_grace_period_is_fatal() {
        let check = FatalConditionCheck::new(Arc::new(NeverReady), Arc::new(AlwaysReadyBlob), Arc::new(AlwaysReadySecrets), 60);
        let start = Timestamp::from_epoch_millis(0);
        check.check_tick(start).await.ok();
        let later = Timestamp::from_epoch_millis(61_000);
        assert!(matches!(check.check_tick(later).await, Err(FatalCondition::DocumentStoreLost { grace_seconds: 60 })));
    }

    #[tokio::test]
    async fn recovery_resets_the_grace_window() {
        let check = FatalConditionCheck::new(Arc::new(AlwaysReady), Arc::new(AlwaysReadyBlob), Arc::new(AlwaysReadySecrets), 60);
        assert!(check.check_tick(Timestamp::from_epoch_millis(0)).await.is_ok());
    }

    #[tokio::test]
    async fn startup_passes_when_every_port_is_reachable() {
        let check = FatalConditionCheck::new(Arc::new(AlwaysReady), Arc::new(AlwaysReadyBlob), Arc::new(AlwaysReadySecrets), 60);
        assert!(check.check_startup().await.is_ok());
    }
}
