// crates/sentinel-worker/src/provider.rs
// ============================================================================
// Module: Cloud Resource Provider
// Description: Backend-agnostic resource enumeration for one region.
// Purpose: Let the region pipeline enumerate cloud resources without knowing
// which cloud SDK produced them.
// Dependencies: async-trait, sentinel-core, sentinel-credentials, serde_json
// ============================================================================

//! ## Overview
//! [`CloudResourceProvider`] is the worker's analogue of an evidence
//! provider: one call enumerates every resource of a given type in a region,
//! returned as JSON attribute maps so [`sentinel_rules::evaluate`] can read
//! them directly. A region-fatal error (expired/denied credentials) is
//! distinguished from a rule-local error via [`RegionFailure::classify`] so
//! the pipeline can fail just that region without failing the whole job.

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::WorkerExitCode;
use sentinel_credentials::ResolvedCredentials;
use serde_json::Value;

/// How a [`CloudResourceProvider`] error should affect the region pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFailureClass {
    /// Confined to the rule that triggered it; recorded and skipped.
    RuleLocal,
    /// Fatal to the whole region; the pipeline stops and reports this exit
    /// code without evaluating further rules.
    Fatal(WorkerExitCode),
}

/// Implemented by a [`CloudResourceProvider`]'s error type so the pipeline
/// can tell a rule-local hiccup from a region-fatal authentication failure.
pub trait RegionFailure: std::error::Error + Send + Sync + 'static {
    /// Classifies this error for region pipeline control flow.
    fn classify(&self) -> RegionFailureClass;
}

/// Enumerates cloud resources of one type in one region.
#[async_trait]
pub trait CloudResourceProvider: Send + Sync {
    /// Error type; implementors classify failures via [`RegionFailure`].
    type Error: RegionFailure;

    /// Lists every resource of `resource_type` in `region`, as JSON
    /// attribute maps keyed by the resource's own schema plus a top-level
    /// `id` field carrying its cloud-native identifier.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` on enumeration failure; the caller inspects
    /// [`RegionFailure::classify`] to decide whether to abort the region.
    async fn enumerate(&self, cloud: CloudProvider, region: &str, resource_type: &str, credentials: &ResolvedCredentials) -> Result<Vec<Value>, Self::Error>;
}

/// Reads a resource's cloud-native identifier from its `id` field.
#[must_use]
pub fn resource_identifier(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_identifier_reads_id_field() {
        let resource = serde_json::json!({"id": "arn:aws:s3:::bucket-a", "public": true});
        assert_eq!(resource_identifier(&resource), Some("arn:aws:s3:::bucket-a"));
    }

    #[test]
    fn resource_identifier_is_none_without_id_field() {
        let resource = serde_json::json!({"public": true});
        assert_eq!(resource_identifier(&resource), None);
    }
}
