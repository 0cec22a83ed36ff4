// crates/sentinel-delivery/src/sink.rs
// ============================================================================
// Module: Delivery Sink Trait
// Description: The async delivery contract both concrete sinks implement.
// Purpose: Let the dispatcher treat the message bus and HTTP push sinks
// uniformly, grounded on decision-gate-broker's synchronous Sink trait.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! [`Sink`] mirrors the shape of `decision_gate_broker::sink::Sink` (one
//! `deliver`-style method, a dedicated error enum) but is `async` since both
//! concrete sinks here do network I/O rather than the teacher's in-process
//! dispatch.

use async_trait::async_trait;
use sentinel_core::Integration;
use thiserror::Error;

use crate::report::Report;

/// Errors raised while delivering a report to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink's transport failed (network, serialization).
    #[error("delivery transport error: {0}")]
    Transport(String),
    /// The sink rejected the integration's configuration.
    #[error("invalid integration configuration: {0}")]
    InvalidConfig(String),
}

/// Delivers a [`Report`] to one activated integration.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sends `report` to the target described by `integration`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when delivery fails. Implementations must not
    /// partially deliver: a chunked send either completes every chunk or
    /// reports failure.
    async fn deliver(&self, integration: &Integration, report: &Report) -> Result<(), SinkError>;

    /// Discriminant matched against [`sentinel_core::Integration::kind`].
    fn kind(&self) -> &'static str;
}
