// crates/sentinel-store-enterprise/src/lib.rs
// ============================================================================
// Module: Sentinel Enterprise Store Library
// Description: Public API surface for Postgres and S3-backed storage.
// Purpose: Expose PostgresStore and S3Store behind their respective features.
// Dependencies: crate::{postgres_store, s3_store}
// ============================================================================

//! ## Overview
//! Backends here are feature-gated so a single-node deployment that never
//! enables `postgres-backend`/`s3-backend` does not pull in `postgres` or
//! the AWS SDK.

#[cfg(feature = "postgres-backend")]
pub mod postgres_store;
#[cfg(feature = "s3-backend")]
pub mod s3_store;

#[cfg(feature = "postgres-backend")]
pub use postgres_store::PostgresStore;
#[cfg(feature = "postgres-backend")]
pub use postgres_store::PostgresStoreConfig;
#[cfg(feature = "postgres-backend")]
pub use postgres_store::PostgresStoreError;

#[cfg(feature = "s3-backend")]
pub use s3_store::S3Store;
#[cfg(feature = "s3-backend")]
pub use s3_store::S3StoreConfig;
