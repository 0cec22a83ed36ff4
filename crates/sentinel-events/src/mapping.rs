// crates/sentinel-events/src/mapping.rs
// ============================================================================
// Module: Event-Name to Rule Mapping
// Description: Configured map from cloud-native event names to the rule
// identifiers they should trigger re-evaluation of.
// Purpose: Let `drain` turn a set of deduplicated events into a rule-id set
// without the event batcher depending on the ruleset composer.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! The event-name → rule-id map is configuration, not derived state: a
//! platform operator declares which rules care about which cloud-native
//! event names (e.g. `s3.PutBucketAcl` re-triggers every rule scanning
//! `aws.s3.bucket` ACLs). [`EventRuleMap`] is a thin, cloneable lookup table
//! built from that configuration.

use std::collections::HashMap;

use sentinel_core::RuleId;

/// Maps event names to the rule identifiers they should re-trigger.
#[derive(Debug, Clone, Default)]
pub struct EventRuleMap {
    rules_by_event_name: HashMap<String, Vec<RuleId>>,
}

impl EventRuleMap {
    /// Builds a map from `(event_name, rule_ids)` configuration entries.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, Vec<RuleId>)>) -> Self {
        Self { rules_by_event_name: entries.into_iter().collect() }
    }

    /// Returns the rule identifiers configured for `event_name`, if any.
    #[must_use]
    pub fn rules_for(&self, event_name: &str) -> &[RuleId] {
        self.rules_by_event_name.get(event_name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_event_name_maps_to_no_rules() {
        let map = EventRuleMap::default();
        assert!(map.rules_for("s3.PutBucketAcl").is_empty());
    }

    #[test]
    fn configured_event_name_returns_its_rules() {
        let map = EventRuleMap::new([("s3.PutBucketAcl".to_string(), vec![RuleId::new("r1"), RuleId::new("r2")])]);
        assert_eq!(map.rules_for("s3.PutBucketAcl"), [RuleId::new("r1"), RuleId::new("r2")]);
    }
}
