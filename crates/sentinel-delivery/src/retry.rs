// crates/sentinel-delivery/src/retry.rs
// ============================================================================
// Module: Delivery Retry Policy
// Description: Exponential backoff with jitter, capped at a fixed attempt
// count.
// Purpose: Give the dispatcher and the retry_send_reports drain a shared
// delay calculation, grounded on shipper-retry's calculate_delay.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! [`backoff_delay`] mirrors `shipper_retry::calculate_delay`'s exponential
//! branch: `base_delay * 2^(attempt - 1)`, capped at `max_delay`, then
//! widened by a uniform jitter factor so concurrent retries for many tenants
//! do not all wake at once.

use std::time::Duration;

use rand::Rng;

/// Maximum delivery attempts per report per sink, per `spec.md` §4.10.
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff schedule for delivery retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Delay ceiling regardless of attempt count.
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]`; `0.0` disables jitter.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(2), max_delay: Duration::from_secs(120), jitter: 0.5 }
    }
}

/// Computes the delay before retry attempt number `attempt` (1-indexed: the
/// delay awaited after attempt 1 fails, before attempt 2 runs).
#[must_use]
pub fn backoff_delay(policy: &BackoffPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(16);
    let delay = policy.base_delay.saturating_mul(2_u32.saturating_pow(pow)).min(policy.max_delay);
    if policy.jitter <= 0.0 {
        return delay;
    }
    let jitter_range = 2.0 * policy.jitter;
    let random_factor = 1.0 - policy.jitter + (rand::thread_rng().gen::<f64>() * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round().max(0.0);
    Duration::from_millis(millis as u64)
}

/// Returns whether another attempt should be made after `attempts_made`
/// failures.
#[must_use]
pub const fn should_retry(attempts_made: u32) -> bool {
    attempts_made < MAX_ATTEMPTS
}
