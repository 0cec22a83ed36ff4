// crates/sentinel-license/src/client.rs
// ============================================================================
// Module: License Coordinator Client
// Description: activate, admit, notify, sync against the external License
// Manager over signed HTTP.
// Purpose: Gate job admission on license entitlement without ever blocking
// non-licensed jobs.
// Dependencies: reqwest, sentinel-core, crate::signing
// ============================================================================

//! ## Overview
//! [`LicenseClient`] caches a local mirror of each license (populated by
//! [`LicenseClient::sync`]) and a per-customer [`RequestSigner`]. `admit` is
//! called synchronously before job dispatch and is bounded: transient
//! failures retry for [`LicenseClientConfig::admit_retry_window_seconds`]
//! before failing fast. `notify` is fire-and-forget; failed attempts queue
//! for the next [`LicenseClient::flush_pending_notifications`] call, driven
//! by the server's `retry_send_reports` scheduler tick.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use reqwest::Client;
use reqwest::StatusCode;
use sentinel_core::CustomerId;
use sentinel_core::JobId;
use sentinel_core::JobStatistics;
use sentinel_core::JobStatus;
use sentinel_core::License;
use sentinel_core::LicenseKey;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio::time::sleep;

use crate::signing::RequestSigner;

/// Tuning knobs for [`LicenseClient`].
#[derive(Debug, Clone)]
pub struct LicenseClientConfig {
    /// Base URL of the License Manager.
    pub endpoint: String,
    /// How long `admit` retries a transient failure before failing fast.
    pub admit_retry_window_seconds: u64,
    /// Delay between `admit` retry attempts.
    pub admit_retry_interval_seconds: u64,
}

impl Default for LicenseClientConfig {
    fn default() -> Self {
        Self { endpoint: "https://license.internal".to_string(), admit_retry_window_seconds: 30, admit_retry_interval_seconds: 5 }
    }
}

/// Denial reason returned by [`LicenseClient::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The License Manager explicitly rejected the job.
    NotAllowed,
    /// The License Manager was unreachable for the whole retry window.
    Unavailable,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Both variants surface the same text: a job failed on an exhausted
        // LM retry window must be indistinguishable, by failure reason, from
        // one the License Manager explicitly rejected.
        match self {
            Self::NotAllowed | Self::Unavailable => write!(f, "License manager does not allow this job"),
        }
    }
}

/// Opaque handle returned by a successful [`LicenseClient::admit`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionHandle {
    /// License the job was admitted under.
    pub license_key: LicenseKey,
    /// Job this admission covers.
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
struct ActivateRequest<'a> {
    license_key: &'a LicenseKey,
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct ActivateResponse {
    license: License,
}

#[derive(Debug, Serialize)]
struct AdmitRequest<'a> {
    license_key: &'a LicenseKey,
    job_id: &'a JobId,
    customer_id: &'a CustomerId,
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct AdmitResponse {
    allowed: bool,
}

#[derive(Debug, Clone, Serialize)]
struct NotifyRequest<'a> {
    license_key: &'a LicenseKey,
    job_id: &'a JobId,
    status: JobStatus,
    stats: &'a JobStatistics,
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    license: License,
}

/// A `notify` call that failed and is queued for retry.
#[derive(Debug, Clone)]
struct PendingNotification {
    license_key: LicenseKey,
    job_id: JobId,
    status: JobStatus,
    stats: JobStatistics,
    attempts: u32,
}

/// Errors raised by [`LicenseClient`] operations other than `admit`/`notify`
/// (which report through [`DenialReason`]/the pending queue instead).
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The HTTP request itself failed.
    #[error("license manager request failed: {0}")]
    Transport(String),
    /// The License Manager returned a non-success status.
    #[error("license manager returned status {0}")]
    Status(StatusCode),
    /// The request body could not be signed.
    #[error("failed to sign request: {0}")]
    Signing(#[from] crate::signing::SigningError),
}

/// Client for the License Manager's activate/admit/notify/sync operations.
pub struct LicenseClient {
    http: Client,
    config: LicenseClientConfig,
    signers: RwLock<HashMap<CustomerId, Arc<RequestSigner>>>,
    mirror: RwLock<HashMap<LicenseKey, License>>,
    pending: RwLock<VecDeque<PendingNotification>>,
}

impl LicenseClient {
    /// Creates a client with a fresh `reqwest::Client` and no cached state.
    #[must_use]
    pub fn new(config: LicenseClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            signers: RwLock::new(HashMap::new()),
            mirror: RwLock::new(HashMap::new()),
            pending: RwLock::new(VecDeque::new()),
        }
    }

    /// Registers the signing key used for requests on behalf of `customer_id`.
    pub async fn register_signer(&self, customer_id: CustomerId, seed: [u8; 32]) {
        let signer = Arc::new(RequestSigner::from_seed(seed));
        self.signers.write().await.insert(customer_id, signer);
    }

    async fn signer_for(&self, customer_id: &CustomerId) -> Option<Arc<RequestSigner>> {
        self.signers.read().await.get(customer_id).cloned()
    }

    /// Activates a tenant's license key, returning the issued [`License`].
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError`] on transport failure, a non-success status,
    /// or if no signer is registered for `customer_id`.
    pub async fn activate(&self, customer_id: &CustomerId, license_key: &LicenseKey, nonce: u64) -> Result<License, LicenseError> {
        let signer =
            self.signer_for(customer_id).await.ok_or_else(|| LicenseError::Transport("no signer registered for customer".to_string()))?;
        let request = ActivateRequest { license_key, nonce };
        let signed = signer.sign(&request, nonce)?;
        let response = self
            .http
            .post(format!("{}/activate", self.config.endpoint))
            .header("X-Sentinel-Signature", signed.signature_hex)
            .header("X-Sentinel-Nonce", nonce.to_string())
            .body(signed.body)
            .send()
            .await
            .map_err(|err| LicenseError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LicenseError::Status(response.status()));
        }
        let parsed: ActivateResponse = response.json().await.map_err(|err| LicenseError::Transport(err.to_string()))?;
        self.mirror.write().await.insert(parsed.license.key.clone(), parsed.license.clone());
        Ok(parsed.license)
    }

    /// Requests admission for a job under `license_key`, synchronously,
    /// before dispatch.
    ///
    /// Retries transient failures (network errors, `5xx` responses) for up
    /// to `admit_retry_window_seconds` before failing fast with
    /// [`DenialReason::Unavailable`]. An explicit denial from the License
    /// Manager returns [`DenialReason::NotAllowed`] immediately, without
    /// retry.
    pub async fn admit(
        &self,
        customer_id: &CustomerId,
        license_key: &LicenseKey,
        job_id: &JobId,
        nonce: u64,
    ) -> Result<AdmissionHandle, DenialReason> {
        let Some(signer) = self.signer_for(customer_id).await else {
            return Err(DenialReason::Unavailable);
        };
        let request = AdmitRequest { license_key, job_id, customer_id, nonce };
        let Ok(signed) = signer.sign(&request, nonce) else {
            return Err(DenialReason::Unavailable);
        };

        let deadline = Timestamp::now().plus_seconds(i64::try_from(self.config.admit_retry_window_seconds).unwrap_or(i64::MAX));
        loop {
            let outcome = self.try_admit(&signed).await;
            match outcome {
                Ok(true) => return Ok(AdmissionHandle { license_key: license_key.clone(), job_id: job_id.clone() }),
                Ok(false) => return Err(DenialReason::NotAllowed),
                Err(()) => {
                    if Timestamp::now() >= deadline {
                        return Err(DenialReason::Unavailable);
                    }
                    sleep(Duration::from_secs(self.config.admit_retry_interval_seconds)).await;
                }
            }
        }
    }

    async fn try_admit(&self, signed: &crate::signing::SignedRequest) -> Result<bool, ()> {
        let response = self
            .http
            .post(format!("{}/admit", self.config.endpoint))
            .header("X-Sentinel-Signature", signed.signature_hex.clone())
            .header("X-Sentinel-Nonce", signed.nonce.to_string())
            .body(signed.body.clone())
            .send()
            .await
            .map_err(|_| ())?;
        if response.status().is_server_error() {
            return Err(());
        }
        if !response.status().is_success() {
            return Ok(false);
        }
        let parsed: AdmitResponse = response.json().await.map_err(|_| ())?;
        Ok(parsed.allowed)
    }

    /// Fire-and-forget status/stat notification for a licensed job.
    ///
    /// On transport failure the notification is queued for
    /// [`Self::flush_pending_notifications`] rather than returned as an
    /// error, matching the at-least-once delivery guarantee.
    pub async fn notify(&self, customer_id: &CustomerId, license_key: &LicenseKey, job_id: &JobId, status: JobStatus, stats: JobStatistics) {
        let Some(signer) = self.signer_for(customer_id).await else {
            self.queue_pending(license_key.clone(), job_id.clone(), status, stats).await;
            return;
        };
        let nonce = 0;
        let request = NotifyRequest { license_key, job_id, status, stats: &stats, nonce };
        let Ok(signed) = signer.sign(&request, nonce) else {
            self.queue_pending(license_key.clone(), job_id.clone(), status, stats).await;
            return;
        };
        if self.send_notify(&signed).await.is_err() {
            self.queue_pending(license_key.clone(), job_id.clone(), status, stats).await;
        }
    }

    async fn queue_pending(&self, license_key: LicenseKey, job_id: JobId, status: JobStatus, stats: JobStatistics) {
        self.pending.write().await.push_back(PendingNotification { license_key, job_id, status, stats, attempts: 0 });
    }

    async fn send_notify(&self, signed: &crate::signing::SignedRequest) -> Result<(), ()> {
        let response = self
            .http
            .post(format!("{}/notify", self.config.endpoint))
            .header("X-Sentinel-Signature", signed.signature_hex.clone())
            .header("X-Sentinel-Nonce", signed.nonce.to_string())
            .body(signed.body.clone())
            .send()
            .await
            .map_err(|_| ())?;
        if response.status().is_success() { Ok(()) } else { Err(()) }
    }

    /// Retries every queued notification once. Returns the number still
    /// pending after this pass. Called from the server's
    /// `retry_send_reports` scheduler tick.
    pub async fn flush_pending_notifications(&self, customer_id_of: impl Fn(&LicenseKey) -> Option<CustomerId>) -> usize {
        let mut remaining = VecDeque::new();
        let mut queue = self.pending.write().await;
        while let Some(mut pending) = queue.pop_front() {
            let Some(customer_id) = customer_id_of(&pending.license_key) else {
                pending.attempts += 1;
                remaining.push_back(pending);
                continue;
            };
            let Some(signer) = self.signer_for(&customer_id).await else {
                pending.attempts += 1;
                remaining.push_back(pending);
                continue;
            };
            let request = NotifyRequest {
                license_key: &pending.license_key,
                job_id: &pending.job_id,
                status: pending.status,
                stats: &pending.stats,
                nonce: 0,
            };
            let delivered = match signer.sign(&request, 0) {
                Ok(signed) => self.send_notify(&signed).await.is_ok(),
                Err(_) => false,
            };
            if !delivered {
                pending.attempts += 1;
                remaining.push_back(pending);
            }
        }
        let count = remaining.len();
        *queue = remaining;
        count
    }

    /// Pulls the allowed ruleset list, quotas, and expiration for
    /// `license_key`, updating the local mirror atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError`] on transport failure or a non-success
    /// status.
    pub async fn sync(&self, customer_id: &CustomerId, license_key: &LicenseKey, nonce: u64) -> Result<License, LicenseError> {
        let signer =
            self.signer_for(customer_id).await.ok_or_else(|| LicenseError::Transport("no signer registered for customer".to_string()))?;
        let request = ActivateRequest { license_key, nonce };
        let signed = signer.sign(&request, nonce)?;
        let response = self
            .http
            .post(format!("{}/sync", self.config.endpoint))
            .header("X-Sentinel-Signature", signed.signature_hex)
            .header("X-Sentinel-Nonce", nonce.to_string())
            .body(signed.body)
            .send()
            .await
            .map_err(|err| LicenseError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LicenseError::Status(response.status()));
        }
        let parsed: SyncResponse = response.json().await.map_err(|err| LicenseError::Transport(err.to_string()))?;
        self.mirror.write().await.insert(parsed.license.key.clone(), parsed.license.clone());
        Ok(parsed.license)
    }

    /// Returns the locally mirrored license, if one has been synced.
    pub async fn mirrored(&self, license_key: &LicenseKey) -> Option<License> {
        self.mirror.read().await.get(license_key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_reason_message_is_exact() {
        assert_eq!(DenialReason::NotAllowed.to_string(), "License manager does not allow this job");
    }

    #[test]
    fn unavailable_denial_reason_uses_the_same_message_as_not_allowed() {
        assert_eq!(DenialReason::Unavailable.to_string(), DenialReason::NotAllowed.to_string());
    }

    #[tokio::test]
    async fn mirrored_is_none_before_any_sync() {
        let client = LicenseClient::new(LicenseClientConfig::default());
        assert!(client.mirrored(&LicenseKey::new("lic-1")).await.is_none());
    }
}
