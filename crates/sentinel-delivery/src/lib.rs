// crates/sentinel-delivery/src/lib.rs
// ============================================================================
// Module: Sentinel Delivery Layer Library
// Description: Public API for report delivery: sinks, dispatch, and retry.
// Purpose: Export the message-bus and HTTP push sinks, the dispatcher, and
// the backoff policy sentinel-server wires together.
// Dependencies: crate::{dispatcher, http_push, message_bus, report, retry, sink}
// ============================================================================

//! ## Overview
//! `sentinel-delivery` implements `spec.md` §4.10: [`message_bus::MessageBusSink`]
//! and [`http_push::HttpPushSink`] are the two concrete sinks,
//! [`dispatcher::ReportDispatcher`] fans a report out to every integration
//! activated for its tenant and tracks delivery status, and [`retry`] gives
//! both the dispatcher and a periodic `retry_send_reports` schedule a shared
//! backoff calculation.

pub mod dispatcher;
pub mod http_push;
pub mod message_bus;
pub mod report;
pub mod retry;
pub mod sink;

pub use dispatcher::DeliveryError;
pub use dispatcher::ReportDispatcher;
pub use dispatcher::RetryOutcome;
pub use http_push::HttpPushSink;
pub use message_bus::BusChunk;
pub use message_bus::BusPublisher;
pub use message_bus::MessageBusSink;
pub use message_bus::DEFAULT_MAX_REQUEST_BYTES;
pub use report::Report;
pub use retry::BackoffPolicy;
pub use retry::backoff_delay;
pub use retry::should_retry;
pub use retry::MAX_ATTEMPTS;
pub use sink::Sink;
pub use sink::SinkError;
