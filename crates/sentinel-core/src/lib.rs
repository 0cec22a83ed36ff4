// crates/sentinel-core/src/lib.rs
// ============================================================================
// Module: Sentinel Core Library
// Description: Public API surface for the Sentinel core crate.
// Purpose: Expose shared identifiers, entity model, hashing, and storage
// ports used by every other Sentinel crate.
// Dependencies: crate::{error, hashing, identifiers, job, metric, model,
//              ports, shard, time}
// ============================================================================

//! ## Overview
//! `sentinel-core` has no dependency on any other workspace crate; everything
//! else in the workspace depends on it. It carries the entity model
//! (`spec.md` §3), the job lifecycle state machine, canonical shard merge
//! semantics, and the `DocumentStore`/`ObjectStore`/`SecretStore` ports that
//! storage backends implement.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod hashing;
pub mod identifiers;
pub mod job;
pub mod metric;
pub mod model;
pub mod ports;
pub mod shard;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ErrorKind;
pub use error::FatalCondition;
pub use error::HasErrorKind;

pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use hashing::hex_encode;
pub use hashing::shard_key;

pub use identifiers::BatchResultId;
pub use identifiers::CustomerId;
pub use identifiers::EventId;
pub use identifiers::ExceptionId;
pub use identifiers::IntegrationId;
pub use identifiers::JobId;
pub use identifiers::LicenseKey;
pub use identifiers::ReportId;
pub use identifiers::RuleId;
pub use identifiers::RuleSourceId;
pub use identifiers::RulesetName;
pub use identifiers::RulesetVersion;
pub use identifiers::ScheduledJobName;
pub use identifiers::TenantId;

pub use job::Job;
pub use job::JobStatistics;
pub use job::JobStatus;
pub use job::TransitionError;
pub use job::WorkerExitCode;

pub use metric::FinOpsView;
pub use metric::KubernetesView;
pub use metric::MetricDelta;
pub use metric::MetricRecord;
pub use metric::PartitionKey;

pub use model::BatchResult;
pub use model::CloudProvider;
pub use model::Customer;
pub use model::Event;
pub use model::Exception;
pub use model::Integration;
pub use model::License;
pub use model::Rule;
pub use model::RuleSource;
pub use model::RuleSourceSyncState;
pub use model::Ruleset;
pub use model::ReportStatus;
pub use model::RulesetStatus;
pub use model::ScheduledJob;
pub use model::Severity;
pub use model::Tenant;

pub use ports::DocumentStore;
pub use ports::ListPage;
pub use ports::ObjectStore;
pub use ports::SecretStore;
pub use ports::StoreError;

pub use shard::Finding;
pub use shard::RemediatedResourceIds;
pub use shard::Shard;
pub use shard::merge_shard;

pub use time::Timestamp;
