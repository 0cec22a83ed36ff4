// crates/sentinel-core/src/identifiers.rs
// ============================================================================
// Module: Sentinel Identifiers
// Description: Canonical opaque identifiers for tenants, jobs, rules, and
// related entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire
// forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as strings on the wire. They carry no
//! normalization or validation beyond non-emptiness; scoping (e.g. a
//! [`TenantId`] is always read alongside a [`CustomerId`]) is enforced by the
//! owning entity, not by the identifier type itself.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(CustomerId, "Top-level tenant-boundary identifier, referenced by name.");
opaque_id!(TenantId, "Identifier for one cloud account/subscription/project/cluster.");
opaque_id!(RuleSourceId, "Identifier for an external rule content origin.");
opaque_id!(RuleId, "Identifier for an atomic policy rule (`<source>-<cloud>-<n>-<slug>_<version>`).");
opaque_id!(RulesetName, "Name of a ruleset, stable across versions.");
opaque_id!(LicenseKey, "External license key issued by the License Manager.");
opaque_id!(JobId, "UUIDv4-shaped job identifier.");
opaque_id!(BatchResultId, "Identifier for an event-driven batch execution record.");
opaque_id!(EventId, "Identifier for one ingested cloud change event.");
opaque_id!(ScheduledJobName, "Name of a scheduled job definition.");
opaque_id!(ExceptionId, "Identifier for a suppression exception.");
opaque_id!(ReportId, "Identifier for a report/report-status record.");
opaque_id!(IntegrationId, "Identifier for a delivery-sink activation record.");

/// Immutable ruleset version number.
///
/// # Invariants
/// - Monotonically increasing within a (customer, name, cloud) scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RulesetVersion(pub u32);

impl RulesetVersion {
    /// Returns the next version after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RulesetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::TenantId;

    #[test]
    fn round_trips_through_json() {
        let id = TenantId::new("tenant-1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"tenant-1\"");
        let back: TenantId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn displays_as_raw_string() {
        let id = TenantId::new("tenant-1");
        assert_eq!(id.to_string(), "tenant-1");
    }
}
