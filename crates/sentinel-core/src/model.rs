// crates/sentinel-core/src/model.rs
// ============================================================================
// Module: Sentinel Entity Model (general entities)
// Description: Customer, Tenant, RuleSource, Rule, Ruleset, License, Event,
// ScheduledJob, Exception, BatchResult.
// Purpose: Shared plain-data entities referenced across crates.
// Dependencies: serde, sentinel_core::{identifiers, time}
// ============================================================================

//! ## Overview
//! Entities here carry no behavior beyond small accessors; state machines
//! ([`crate::job::Job`]) and merge semantics ([`crate::shard::Shard`]) live in
//! their own modules since they have invariants worth isolating.

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CustomerId;
use crate::identifiers::EventId;
use crate::identifiers::ExceptionId;
use crate::identifiers::IntegrationId;
use crate::identifiers::LicenseKey;
use crate::identifiers::RuleId;
use crate::identifiers::RuleSourceId;
use crate::identifiers::RulesetName;
use crate::identifiers::RulesetVersion;
use crate::identifiers::ScheduledJobName;
use crate::identifiers::TenantId;
use crate::time::Timestamp;

/// A top-level billing and tenancy boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Stable identifier.
    pub id: CustomerId,
    /// Human-readable display name.
    pub display_name: String,
    /// Whether the customer is currently allowed to submit jobs.
    pub active: bool,
    /// Customer-level delivery toggle; when `false` the delivery layer
    /// records report artifacts but never sends them.
    pub send_reports: bool,
}

/// Cloud platform a [`Tenant`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    /// Amazon Web Services.
    Aws,
    /// Microsoft Azure.
    Azure,
    /// Google Cloud Platform.
    Gcp,
    /// Kubernetes (cluster, not a hyperscaler account).
    Kubernetes,
}

/// One scannable cloud account, subscription, project, or cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable identifier, unique within the owning customer.
    pub id: TenantId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Cloud platform this tenant scans.
    pub cloud: CloudProvider,
    /// Cloud-native account/subscription/project identifier.
    pub native_id: String,
    /// Regions this tenant scans; empty means the platform default set.
    pub regions: Vec<String>,
    /// Whether the tenant currently accepts new jobs.
    pub active: bool,
}

/// Sync lifecycle of a [`RuleSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSourceSyncState {
    /// No sync in progress or ever attempted.
    Idle,
    /// A sync is currently running; concurrent syncs are rejected.
    Syncing,
    /// The most recent sync completed with at least one rule parsed.
    Synced,
    /// The most recent sync completed with zero rules parsed.
    Failed,
}

/// External origin of rule content (git repository, S3 prefix, HTTP feed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    /// Stable identifier.
    pub id: RuleSourceId,
    /// Owning customer, or `None` for a platform-shared source.
    pub customer_id: Option<CustomerId>,
    /// Fetch location (git URL, object-store prefix, HTTP endpoint).
    pub location: String,
    /// Current sync lifecycle state.
    pub sync_state: RuleSourceSyncState,
    /// Last successful sync timestamp, if any.
    pub last_synced_at: Option<Timestamp>,
}

/// Severity of a single policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; no remediation expected.
    Info,
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Critical severity.
    Critical,
}

/// One atomic policy rule belonging to a [`RuleSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier: `<source>-<cloud>-<n>-<slug>_<version>`.
    pub id: RuleId,
    /// Originating source.
    pub source_id: RuleSourceId,
    /// Cloud platform this rule targets.
    pub cloud: CloudProvider,
    /// Resource type the rule evaluates (e.g. `aws.s3.bucket`).
    pub resource_type: String,
    /// Human-readable rule name.
    pub name: String,
    /// Rule revision, used to break ties when the same logical rule is
    /// produced by more than one sync (highest wins).
    pub version: u32,
    /// Severity assigned to findings produced by this rule.
    pub severity: Severity,
    /// Service grouping used by the `service_section` assembly selector.
    pub service_section: Option<String>,
    /// Compliance standard names this rule maps to (e.g. `cis-aws-1.4`).
    pub standards: Vec<String>,
    /// MITRE ATT&CK technique identifiers this rule maps to, if any.
    pub mitre_techniques: Vec<String>,
    /// Free-form classification tags (e.g. `finops`, `kubernetes`) the
    /// metrics pipeline uses to select disjoint rule subsets per view.
    pub tags: Vec<String>,
    /// Serialized condition tree, evaluated via `ret_logic::Requirement`.
    pub condition: serde_json::Value,
}

/// Assembly lifecycle of a [`Ruleset`] version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulesetStatus {
    /// Rules are still being resolved from their sources.
    Assembling,
    /// Assembly completed and the bundle is eligible to be released.
    ReadyToScan,
    /// Assembly failed (e.g. an unresolvable rule id).
    Failed,
}

/// A named, versioned collection of rules assembled for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Name, stable across versions.
    pub name: RulesetName,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Cloud platform this ruleset targets.
    pub cloud: CloudProvider,
    /// Version number, monotonically increasing per (customer, name, cloud).
    pub version: RulesetVersion,
    /// Rule identifiers included in this version, in assembly order.
    pub rule_ids: Vec<RuleId>,
    /// Assembly lifecycle status.
    pub status: RulesetStatus,
    /// Whether this version has been released (immutable) or is still a draft.
    pub released: bool,
    /// Whether this version is the default served for `name`.
    pub active: bool,
    /// Human-readable label assigned at release, if any.
    pub display_name: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// A license entitlement issued by the License Manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// External key issued by the License Manager.
    pub key: LicenseKey,
    /// Customer this license is admitted for.
    pub customer_id: CustomerId,
    /// Ruleset names this license entitles the customer to run.
    pub ruleset_names: Vec<RulesetName>,
    /// Expiration timestamp.
    pub expires_at: Timestamp,
    /// Maximum concurrent jobs permitted under this license.
    pub max_concurrent_jobs: u32,
}

/// An ingested cloud change-notification event awaiting batching.
///
/// Shape matches the normalized envelope the event batcher's `ingest`
/// operation produces: `{customer, tenant, cloud, account_id, region,
/// event_name, ts, fingerprint}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier.
    pub id: EventId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Tenant the event was observed in.
    pub tenant_id: TenantId,
    /// Cloud platform the event originated on.
    pub cloud: CloudProvider,
    /// Cloud account identifier the event was raised under.
    pub account_id: String,
    /// Resource type affected (e.g. `aws.s3.bucket`).
    pub resource_type: String,
    /// Cloud-native resource identifier (ARN, resource ID, URI).
    pub resource_id: String,
    /// Region the event occurred in.
    pub region: String,
    /// Name of the change-notification event (cloud-native event type).
    pub event_name: String,
    /// Stable fingerprint of the affected resource, used for dedup.
    pub resource_fingerprint: String,
    /// Event ingestion timestamp.
    pub received_at: Timestamp,
}

/// A named recurring job definition (cron-style scheduling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Name, unique per customer.
    pub name: ScheduledJobName,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Tenants this schedule targets.
    pub tenant_ids: Vec<TenantId>,
    /// Cron expression controlling fire times.
    pub cron_expression: String,
    /// Whether the schedule currently fires.
    pub enabled: bool,
}

/// A standing suppression of a (rule, resource) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    /// Stable identifier.
    pub id: ExceptionId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Rule the exception suppresses.
    pub rule_id: RuleId,
    /// Cloud-native resource identifier the exception applies to.
    pub resource_id: String,
    /// Optional expiration; `None` means indefinite.
    pub expires_at: Option<Timestamp>,
    /// Free-text justification.
    pub reason: String,
}

/// Result of one event-driven batch drain: the set of events collapsed into
/// a single job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Stable identifier.
    pub id: crate::identifiers::BatchResultId,
    /// Tenant the batch was drained for.
    pub tenant_id: TenantId,
    /// Event identifiers collapsed into this batch.
    pub event_ids: Vec<EventId>,
    /// Window start timestamp.
    pub window_start: Timestamp,
    /// Window end timestamp.
    pub window_end: Timestamp,
}

/// A delivery-sink activation (message bus topic, HTTP push endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// Stable identifier.
    pub id: IntegrationId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Sink kind discriminant, matched against `sentinel_delivery::Sink` impls.
    pub kind: String,
    /// Sink-specific configuration (endpoint URL, topic name, credentials ref).
    pub config: serde_json::Value,
    /// Tenants this activation delivers reports for.
    pub tenant_ids: Vec<TenantId>,
}

/// Delivery outcome of one report against one sink, tracked for retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatus {
    /// Stable identifier.
    pub id: crate::identifiers::ReportId,
    /// Integration this delivery attempt targeted.
    pub integration_id: IntegrationId,
    /// Tenant the delivered report covers.
    pub tenant_id: TenantId,
    /// Attempts made so far.
    pub attempts: u32,
    /// Whether the report was delivered successfully.
    pub delivered: bool,
    /// Most recent failure message, if any.
    pub last_error: Option<String>,
    /// Timestamp of the most recent delivery attempt.
    pub last_attempted_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::Severity;

    #[test]
    fn severity_orders_info_below_critical() {
        assert!(Severity::Info < Severity::Critical);
        assert!(Severity::High < Severity::Critical);
    }
}
