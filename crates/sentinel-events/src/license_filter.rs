// crates/sentinel-events/src/license_filter.rs
// ============================================================================
// Module: License-Filtered Rule Admission
// Description: Narrows a candidate rule-id set to the ones the tenant's
// customer is currently licensed to run.
// Purpose: Keep `sentinel-events` acyclic with respect to `sentinel-license`
// and `sentinel-rules` by depending on a trait, implemented by the caller.
// Dependencies: async-trait, sentinel-core
// ============================================================================

//! ## Overview
//! Grounded on the same acyclic-dependency shape as
//! [`sentinel_jobs`](../../sentinel_jobs)'s `JobDispatcher`: the event
//! batcher needs to know which candidate rules a tenant's active license
//! allows, but resolving that requires both the license mirror and the
//! ruleset composer's rule-to-ruleset membership, neither of which this
//! crate should depend on directly.

use async_trait::async_trait;
use sentinel_core::CustomerId;
use sentinel_core::RuleId;

/// Narrows a candidate rule set to the rules licensed for `customer_id`.
#[async_trait]
pub trait RuleLicenseFilter: Send + Sync {
    /// Returns the subset of `candidate_rules` the customer's active
    /// license allows.
    async fn allowed_rules(&self, customer_id: &CustomerId, candidate_rules: &[RuleId]) -> Vec<RuleId>;
}

/// A [`RuleLicenseFilter`] that allows every candidate rule, for
/// deployments where no license gate applies to event-driven jobs.
pub struct AllowAllRules;

#[async_trait]
impl RuleLicenseFilter for AllowAllRules {
    async fn allowed_rules(&self, _customer_id: &CustomerId, candidate_rules: &[RuleId]) -> Vec<RuleId> {
        candidate_rules.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_returns_every_candidate() {
        let filter = AllowAllRules;
        let candidates = vec![RuleId::new("r1"), RuleId::new("r2")];
        let allowed = filter.allowed_rules(&CustomerId::new("cust-1"), &candidates).await;
        assert_eq!(allowed, candidates);
    }
}
