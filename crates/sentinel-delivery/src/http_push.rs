// crates/sentinel-delivery/src/http_push.rs
// ============================================================================
// Module: HTTP Push Sink
// Description: Delivers reports to HTTP push integrations (Defect-Dojo-like,
// Chronicle-like) identified by an activation record's endpoint URL.
// Purpose: Implement the second of the two delivery sinks (spec.md §4.10).
// Dependencies: async-trait, reqwest, sentinel-core
// ============================================================================

//! ## Overview
//! [`HttpPushSink`] reads the target endpoint from
//! [`sentinel_core::Integration::config`] and POSTs the report body as JSON.
//! A non-2xx response is treated as a transport failure so the dispatcher's
//! retry loop engages, matching the teacher's fail-closed sink contract.

use async_trait::async_trait;
use sentinel_core::Integration;

use crate::report::Report;
use crate::sink::Sink;
use crate::sink::SinkError;

/// Delivers reports over HTTP POST to an activation's configured endpoint.
pub struct HttpPushSink {
    client: reqwest::Client,
}

impl HttpPushSink {
    /// Creates a sink using `client` for outbound requests.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint(integration: &Integration) -> Result<&str, SinkError> {
        integration.config.get("endpoint_url").and_then(serde_json::Value::as_str).ok_or_else(|| SinkError::InvalidConfig("integration config missing \"endpoint_url\"".to_string()))
    }
}

#[async_trait]
impl Sink for HttpPushSink {
    async fn deliver(&self, integration: &Integration, report: &Report) -> Result<(), SinkError> {
        let endpoint = Self::endpoint(integration)?;
        let response = self.client.post(endpoint).json(&report.body).send().await.map_err(|err| SinkError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SinkError::Transport(format!("endpoint returned status {}", response.status())));
        }
        tracing::debug!(tenant_id = report.tenant_id.as_str(), endpoint, "pushed report over http");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "http_push"
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::CustomerId;
    use sentinel_core::IntegrationId;
    use sentinel_core::TenantId;
    use sentinel_core::Timestamp;

    use super::*;

    fn integration(config: serde_json::Value) -> Integration {
        Integration { id: IntegrationId::new("int-1"), customer_id: CustomerId::new("cust-1"), kind: "http_push".to_string(), config, tenant_ids: vec![TenantId::new("tenant-1")] }
    }

    #[tokio::test]
    async fn missing_endpoint_is_rejected_before_sending() {
        let sink = HttpPushSink::new(reqwest::Client::new());
        let report = Report { tenant_id: TenantId::new("tenant-1"), kind: "operational".to_string(), body: serde_json::json!({}), generated_at: Timestamp::from_epoch_millis(0) };
        let result = sink.deliver(&integration(serde_json::json!({})), &report).await;
        assert!(result.is_err());
    }
}
