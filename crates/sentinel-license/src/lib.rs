// crates/sentinel-license/src/lib.rs
// ============================================================================
// Module: Sentinel License Library
// Description: Public API for the license coordinator.
// Purpose: Export signed-request primitives and the License Manager client.
// Dependencies: crate::{client, signing}
// ============================================================================

//! ## Overview
//! `sentinel-license` interfaces with an external License Manager over
//! signed HTTP ([`signing`]) through [`client::LicenseClient`], which never
//! blocks non-licensed jobs and degrades admission failures into a bounded
//! retry-then-fail-fast path.

pub mod client;
pub mod signing;

pub use client::AdmissionHandle;
pub use client::DenialReason;
pub use client::LicenseClient;
pub use client::LicenseClientConfig;
pub use client::LicenseError;
pub use signing::NONCE_WINDOW_SECONDS;
pub use signing::NonceTracker;
pub use signing::RequestSigner;
pub use signing::SignedRequest;
pub use signing::SigningError;
