// crates/sentinel-core/src/error.rs
// ============================================================================
// Module: Sentinel Error Kinds
// Description: Caller-facing error classification shared across crates.
// Purpose: Give every subsystem the same small vocabulary of error kinds so a
// transport boundary (out of scope here) can translate to HTTP status codes.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Per `spec.md` §7, callers see one of a small number of [`ErrorKind`]s.
//! Individual crates still define their own `thiserror` enums for
//! programmatic matching (e.g. `sentinel_jobs::AdmissionError`); those enums
//! implement [`HasErrorKind`] so the classification is available without
//! collapsing distinct failure modes into a single type.

use thiserror::Error;

/// Caller-facing error classification.
///
/// # Invariants
/// - Variants are stable for programmatic handling and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request failed schema or semantic validation.
    Validation,
    /// Caller is not authenticated.
    Unauthorized,
    /// Caller is authenticated but lacks scope for the resource.
    Forbidden,
    /// Referenced resource does not exist.
    NotFound,
    /// Conflicting concurrent state (tenant lock, duplicate ruleset version).
    Conflict,
    /// Quota exceeded (license denial, store throughput limit).
    Quota,
    /// Dependency is transiently unavailable; safe to retry.
    Unavailable,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the conventional HTTP status code for this kind, for use by an
    /// (out-of-scope) transport layer.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Quota => 429,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }
}

/// Implemented by crate-local error enums so the ambient `ErrorKind` can be
/// recovered without flattening domain-specific variants.
pub trait HasErrorKind {
    /// Returns the caller-facing classification for this error.
    fn kind(&self) -> ErrorKind;
}

/// Fatal process-exit conditions (`spec.md` §7): DS connection loss beyond a
/// grace period, SS unreachable on startup, OS bucket missing.
#[derive(Debug, Error)]
pub enum FatalCondition {
    /// Document store connection has been lost beyond the grace period.
    #[error("document store unreachable for {grace_seconds}s grace period")]
    DocumentStoreLost {
        /// Grace period, in seconds, that was exceeded.
        grace_seconds: u64,
    },
    /// Secret store was unreachable at process startup.
    #[error("secret store unreachable at startup: {0}")]
    SecretStoreUnreachable(String),
    /// Configured object store bucket does not exist.
    #[error("object store bucket missing: {0}")]
    ObjectStoreBucketMissing(String),
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn quota_maps_to_429() {
        assert_eq!(ErrorKind::Quota.http_status(), 429);
    }

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
    }
}
