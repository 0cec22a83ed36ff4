// crates/sentinel-delivery/src/report.rs
// ============================================================================
// Module: Delivery Report
// Description: The delivery unit the metrics pipeline hands to a sink.
// Purpose: Decouple sink implementations from the metrics pipeline's
// internal report shapes.
// Dependencies: sentinel-core, serde_json
// ============================================================================

//! ## Overview
//! A [`Report`] is an opaque, already-serialized metrics-pipeline output
//! (operational, project, department, C-level, FinOps, or Kubernetes view)
//! addressed to one tenant. The delivery layer never interprets `body`; it
//! only routes, chunks, and retries it.

use sentinel_core::TenantId;
use sentinel_core::Timestamp;

/// One report artifact ready for delivery.
#[derive(Debug, Clone)]
pub struct Report {
    /// Tenant this report covers.
    pub tenant_id: TenantId,
    /// Report kind label (`operational`, `project`, `department`, `c_level`,
    /// `finops`, `kubernetes`), used for sink-side routing and logging.
    pub kind: String,
    /// Serialized report body.
    pub body: serde_json::Value,
    /// Timestamp the report was generated.
    pub generated_at: Timestamp,
}
