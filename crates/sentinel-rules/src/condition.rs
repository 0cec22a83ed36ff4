// crates/sentinel-rules/src/condition.rs
// ============================================================================
// Module: Rule Condition Evaluation
// Description: Parses a rule's JSON condition tree into a ret_logic
// requirement and evaluates it against one resource's attributes.
// Purpose: Per-resource filter evaluation with tri-state ("unknown" on
// missing evidence) semantics.
// Dependencies: ret-logic, sentinel-core, serde_json
// ============================================================================

//! ## Overview
//! A rule's `condition` field (`serde_json::Value`) is a small JSON DSL:
//! `{"predicate": {"path": "...", "op": "...", "value": ...}}` at the leaves,
//! composed with `{"and": [...]}`, `{"or": [...]}`, `{"not": ...}`, and
//! `{"at_least": {"min": N, "of": [...]}}`. [`parse_condition`] turns this
//! into a `ret_logic::Requirement<RulePredicate>`; [`evaluate`] runs it
//! against a resource's attribute map using Kleene tri-state logic so a
//! missing attribute yields `Unknown` rather than a false negative.

use ret_logic::KleeneLogic;
use ret_logic::Requirement;
use ret_logic::TriState;
use ret_logic::convenience;
use ret_logic::traits::Row;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Comparison applied between a resource attribute and a literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// Attribute equals the literal value.
    Eq,
    /// Attribute does not equal the literal value.
    Ne,
    /// Attribute (boolean) is `true`.
    IsTrue,
    /// Attribute (boolean) is `false`.
    IsFalse,
    /// Attribute (string/array) contains the literal value.
    Contains,
}

/// A single leaf condition: one attribute path compared against one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePredicate {
    /// Dot-separated path into the resource attribute map.
    pub path: String,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Literal value compared against, ignored for `is_true`/`is_false`.
    #[serde(default)]
    pub value: Value,
}

impl ret_logic::traits::TriStatePredicateEval for RulePredicate {
    type Reader<'a> = Value;

    fn eval_row_tristate(&self, reader: &Self::Reader<'_>, _row: Row) -> TriState {
        let Some(attribute) = resolve_path(reader, &self.path) else {
            return TriState::Unknown;
        };
        match self.op {
            ComparisonOp::Eq => TriState::from(attribute == &self.value),
            ComparisonOp::Ne => TriState::from(attribute != &self.value),
            ComparisonOp::IsTrue => attribute.as_bool().map_or(TriState::Unknown, TriState::from),
            ComparisonOp::IsFalse => attribute.as_bool().map_or(TriState::Unknown, |b| TriState::from(!b)),
            ComparisonOp::Contains => match (attribute.as_array(), attribute.as_str()) {
                (Some(items), _) => TriState::from(items.contains(&self.value)),
                (None, Some(text)) => self.value.as_str().map_or(TriState::Unknown, |needle| TriState::from(text.contains(needle))),
                (None, None) => TriState::Unknown,
            },
        }
    }
}

fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| node.get(segment))
}

/// Errors raised while parsing a rule's JSON condition tree.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// The condition payload did not match the expected DSL shape.
    #[error("invalid condition shape: {0}")]
    InvalidShape(String),
}

/// Parses a rule's `condition` JSON value into a requirement tree.
///
/// # Errors
///
/// Returns [`ConditionError::InvalidShape`] when the JSON does not match the
/// condition DSL.
pub fn parse_condition(value: &Value) -> Result<Requirement<RulePredicate>, ConditionError> {
    let object = value.as_object().ok_or_else(|| ConditionError::InvalidShape("expected object".to_string()))?;

    if let Some(items) = object.get("and") {
        return Ok(convenience::all(parse_list(items)?));
    }
    if let Some(items) = object.get("or") {
        return Ok(convenience::any(parse_list(items)?));
    }
    if let Some(inner) = object.get("not") {
        return Ok(convenience::not(parse_condition(inner)?));
    }
    if let Some(group) = object.get("at_least") {
        let group = group.as_object().ok_or_else(|| ConditionError::InvalidShape("at_least must be an object".to_string()))?;
        let min = group
            .get("min")
            .and_then(Value::as_u64)
            .ok_or_else(|| ConditionError::InvalidShape("at_least.min must be a non-negative integer".to_string()))?;
        let min = u8::try_from(min).map_err(|_| ConditionError::InvalidShape("at_least.min too large".to_string()))?;
        let of = group.get("of").ok_or_else(|| ConditionError::InvalidShape("at_least.of is required".to_string()))?;
        return Ok(convenience::at_least(min, parse_list(of)?));
    }
    if let Some(predicate) = object.get("predicate") {
        let predicate: RulePredicate =
            serde_json::from_value(predicate.clone()).map_err(|err| ConditionError::InvalidShape(err.to_string()))?;
        return Ok(convenience::predicate(predicate));
    }

    Err(ConditionError::InvalidShape(
        "expected one of: and, or, not, at_least, predicate".to_string(),
    ))
}

fn parse_list(value: &Value) -> Result<Vec<Requirement<RulePredicate>>, ConditionError> {
    value
        .as_array()
        .ok_or_else(|| ConditionError::InvalidShape("expected array".to_string()))?
        .iter()
        .map(parse_condition)
        .collect()
}

/// Evaluates `requirement` against a resource's attribute map using Kleene
/// tri-state logic (missing evidence composes as `Unknown`, not `False`).
#[must_use]
pub fn evaluate(requirement: &Requirement<RulePredicate>, resource: &Value) -> TriState {
    requirement.eval_tristate(resource, 0, &KleeneLogic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_equality_predicate_matches() {
        let condition = json!({"predicate": {"path": "encrypted", "op": "is_false"}});
        let requirement = parse_condition(&condition).expect("parse");
        let resource = json!({"encrypted": false});
        assert_eq!(evaluate(&requirement, &resource), TriState::True);
    }

    #[test]
    fn missing_attribute_is_unknown() {
        let condition = json!({"predicate": {"path": "encrypted", "op": "is_false"}});
        let requirement = parse_condition(&condition).expect("parse");
        let resource = json!({});
        assert_eq!(evaluate(&requirement, &resource), TriState::Unknown);
    }

    #[test]
    fn and_of_two_predicates_short_circuits_on_false() {
        let condition = json!({"and": [
            {"predicate": {"path": "public", "op": "is_true"}},
            {"predicate": {"path": "encrypted", "op": "is_false"}}
        ]});
        let requirement = parse_condition(&condition).expect("parse");
        let resource = json!({"public": false, "encrypted": true});
        assert_eq!(evaluate(&requirement, &resource), TriState::False);
    }

    #[test]
    fn at_least_two_of_three_requires_threshold() {
        let condition = json!({"at_least": {"min": 2, "of": [
            {"predicate": {"path": "a", "op": "is_true"}},
            {"predicate": {"path": "b", "op": "is_true"}},
            {"predicate": {"path": "c", "op": "is_true"}}
        ]}});
        let requirement = parse_condition(&condition).expect("parse");
        let resource = json!({"a": true, "b": true, "c": false});
        assert_eq!(evaluate(&requirement, &resource), TriState::True);
    }
}
