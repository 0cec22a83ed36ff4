// crates/sentinel-contract/src/types.rs
// ============================================================================
// Module: Contract DTOs
// Description: Wire-level request/response shapes and the envelope wrapping
// them.
// Purpose: Give every crossing of a process boundary one serializable,
// versioned shape.
// Dependencies: serde, sentinel_core
// ============================================================================

//! ## Overview
//! DTOs here are intentionally duck-free: every variant of every oneOf is a
//! tagged struct or enum, never a loosely-typed map, per the tagged-variant
//! redesign flag. [`Envelope`] wraps every request/response with a schema
//! name and version so [`crate::schemas::SchemaRegistry`] can validate it
//! before the payload reaches domain code.

use serde::Deserialize;
use serde::Serialize;

use sentinel_core::CustomerId;
use sentinel_core::JobId;
use sentinel_core::RulesetName;
use sentinel_core::TenantId;
use sentinel_core::Timestamp;

/// A versioned, schema-addressable wrapper around a request or response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Name of the schema in [`crate::schemas::SchemaRegistry`] this payload
    /// validates against.
    pub schema_name: String,
    /// Schema version; bumped on any breaking field change.
    pub schema_version: u32,
    /// Envelope creation timestamp.
    pub issued_at: Timestamp,
    /// The wrapped payload.
    pub body: T,
}

impl<T> Envelope<T> {
    /// Wraps `body` in an envelope addressed at `schema_name`/`schema_version`.
    #[must_use]
    pub fn new(schema_name: impl Into<String>, schema_version: u32, body: T) -> Self {
        Self {
            schema_name: schema_name.into(),
            schema_version,
            issued_at: Timestamp::now(),
            body,
        }
    }
}

/// Request to submit a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmissionRequest {
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Target tenant.
    pub tenant_id: TenantId,
    /// Ruleset names to apply.
    pub ruleset_names: Vec<RulesetName>,
    /// Regions to scan; empty means the tenant's default set.
    pub regions: Vec<String>,
}

/// Response to a job submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmissionResponse {
    /// Identifier assigned to the newly submitted job.
    pub job_id: JobId,
}

/// Request to query findings for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingQueryRequest {
    /// Tenant to query findings for.
    pub tenant_id: TenantId,
    /// Restrict to this region, or `None` for all regions.
    pub region: Option<String>,
    /// Opaque pagination cursor from a prior response.
    pub cursor: Option<String>,
}

/// One page of findings returned from a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingQueryResponse {
    /// Findings in this page, in canonical shard order.
    pub findings: Vec<sentinel_core::Finding>,
    /// Opaque cursor for the next page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let req = JobSubmissionRequest {
            customer_id: CustomerId::new("acme"),
            tenant_id: TenantId::new("acme-prod"),
            ruleset_names: vec![RulesetName::new("cis-aws")],
            regions: vec!["eu-west-1".to_string()],
        };
        let envelope = Envelope::new("job_submission_request", 1, req.clone());
        let json = serde_json::to_string(&envelope).expect("serialize");
        let back: Envelope<JobSubmissionRequest> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.body, req);
        assert_eq!(back.schema_version, 1);
    }
}
