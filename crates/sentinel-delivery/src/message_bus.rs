// crates/sentinel-delivery/src/message_bus.rs
// ============================================================================
// Module: Message Bus Sink
// Description: Publishes reports to a message bus topic, chunking payloads
// above the configured maximum request size.
// Purpose: Implement the first of the two delivery sinks (spec.md §4.10).
// Dependencies: async-trait, sentinel-core, serde_json
// ============================================================================

//! ## Overview
//! [`MessageBusSink`] wraps an injected [`BusPublisher`] (the concrete bus
//! client — Kafka, SQS, Pub/Sub — is an external collaborator outside scope,
//! matching [`decision_gate_broker`]'s `ChannelSink`, which wraps a
//! `tokio::sync::mpsc::Sender` rather than owning a transport). A report
//! larger than `max_request_bytes` is split into [`BusChunk`] envelopes so no
//! single publish call exceeds the bus's request-size limit.

use async_trait::async_trait;
use sentinel_core::Integration;
use serde::Deserialize;
use serde::Serialize;

use crate::report::Report;
use crate::sink::Sink;
use crate::sink::SinkError;

/// Default maximum bytes per publish call (1 MiB), per `spec.md` §4.10.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Publishes a single chunk to a topic. The concrete bus client lives
/// outside this crate; this port keeps `MessageBusSink` transport-agnostic.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publishes `bytes` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns a transport error message on failure.
    async fn publish(&self, topic: &str, bytes: &[u8]) -> Result<(), String>;
}

/// One piece of a chunked report, in publish order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusChunk<'a> {
    /// Tenant the report covers.
    pub tenant_id: &'a str,
    /// Report kind label.
    pub report_kind: &'a str,
    /// Zero-based index of this chunk.
    pub chunk_index: u32,
    /// Total number of chunks in this report.
    pub total_chunks: u32,
    /// Raw bytes of this chunk (a slice of the report's canonical JSON).
    pub bytes: &'a [u8],
}

/// Delivers reports by publishing chunked JSON envelopes to a bus topic.
pub struct MessageBusSink {
    publisher: std::sync::Arc<dyn BusPublisher>,
    max_request_bytes: usize,
}

impl MessageBusSink {
    /// Creates a sink publishing through `publisher`, chunking at
    /// [`DEFAULT_MAX_REQUEST_BYTES`].
    #[must_use]
    pub fn new(publisher: std::sync::Arc<dyn BusPublisher>) -> Self {
        Self { publisher, max_request_bytes: DEFAULT_MAX_REQUEST_BYTES }
    }

    /// Creates a sink chunking at `max_request_bytes` instead of the default.
    #[must_use]
    pub fn with_max_request_bytes(publisher: std::sync::Arc<dyn BusPublisher>, max_request_bytes: usize) -> Self {
        Self { publisher, max_request_bytes: max_request_bytes.max(1) }
    }

    fn topic(integration: &Integration) -> Result<&str, SinkError> {
        integration.config.get("topic").and_then(serde_json::Value::as_str).ok_or_else(|| SinkError::InvalidConfig("integration config missing \"topic\"".to_string()))
    }
}

#[async_trait]
impl Sink for MessageBusSink {
    async fn deliver(&self, integration: &Integration, report: &Report) -> Result<(), SinkError> {
        let topic = Self::topic(integration)?;
        let body = serde_json::to_vec(&report.body).map_err(|err| SinkError::Transport(err.to_string()))?;

        let chunks: Vec<&[u8]> = if body.is_empty() { vec![&body[..]] } else { body.chunks(self.max_request_bytes).collect() };
        let total_chunks = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
        let tenant_id = report.tenant_id.as_str();

        for (index, bytes) in chunks.into_iter().enumerate() {
            let chunk_index = u32::try_from(index).unwrap_or(u32::MAX);
            let envelope = BusChunk { tenant_id, report_kind: &report.kind, chunk_index, total_chunks, bytes };
            let encoded = serde_json::to_vec(&envelope).map_err(|err| SinkError::Transport(err.to_string()))?;
            self.publisher.publish(topic, &encoded).await.map_err(SinkError::Transport)?;
        }
        tracing::debug!(tenant_id, topic, total_chunks, "published report to message bus");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "message_bus"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use sentinel_core::CustomerId;
    use sentinel_core::IntegrationId;
    use sentinel_core::TenantId;
    use sentinel_core::Timestamp;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl BusPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, bytes: &[u8]) -> Result<(), String> {
            self.published.lock().expect("lock").push((topic.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    fn integration(topic: &str) -> Integration {
        Integration {
            id: IntegrationId::new("int-1"),
            customer_id: CustomerId::new("cust-1"),
            kind: "message_bus".to_string(),
            config: serde_json::json!({ "topic": topic }),
            tenant_ids: vec![TenantId::new("tenant-1")],
        }
    }

    fn report(body: serde_json::Value) -> Report {
        Report { tenant_id: TenantId::new("tenant-1"), kind: "operational".to_string(), body, generated_at: Timestamp::from_epoch_millis(0) }
    }

    #[tokio::test]
    async fn small_report_publishes_as_a_single_chunk() {
        let publisher = Arc::new(RecordingPublisher::default());
        let sink = MessageBusSink::new(publisher.clone());
        sink.deliver(&integration("reports"), &report(serde_json::json!({ "open_findings": 3 }))).await.expect("deliver");
        assert_eq!(publisher.published.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn oversized_report_splits_into_multiple_chunks() {
        let publisher = Arc::new(RecordingPublisher::default());
        let sink = MessageBusSink::with_max_request_bytes(publisher.clone(), 16);
        let large_body = serde_json::json!({ "padding": "x".repeat(200) });
        sink.deliver(&integration("reports"), &report(large_body)).await.expect("deliver");
        assert!(publisher.published.lock().expect("lock").len() > 1);
    }

    #[tokio::test]
    async fn missing_topic_is_rejected_before_publishing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let sink = MessageBusSink::new(publisher.clone());
        let mut bad_integration = integration("reports");
        bad_integration.config = serde_json::json!({});
        let result = sink.deliver(&bad_integration, &report(serde_json::json!({}))).await;
        assert!(result.is_err());
        assert!(publisher.published.lock().expect("lock").is_empty());
    }
}
