// crates/sentinel-contract/src/schemas.rs
// ============================================================================
// Module: Contract Schemas
// Description: JSON schema builders and a registry for validating envelopes
// before they reach domain code.
// Purpose: Schema-first validation instead of reflection (redesign flag).
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Each DTO in [`crate::types`] has a corresponding JSON Schema here. The
//! [`SchemaRegistry`] compiles schemas once at construction and validates
//! envelopes by name, so a caller only needs the schema name carried in the
//! [`crate::types::Envelope`] to check a payload.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

/// Returns the JSON schema for [`crate::types::JobSubmissionRequest`].
#[must_use]
pub fn job_submission_request_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "JobSubmissionRequest",
        "type": "object",
        "required": ["customer_id", "tenant_id", "ruleset_names", "regions"],
        "properties": {
            "customer_id": { "type": "string", "minLength": 1 },
            "tenant_id": { "type": "string", "minLength": 1 },
            "ruleset_names": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "minItems": 1
            },
            "regions": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "additionalProperties": false
    })
}

/// Returns the JSON schema for [`crate::types::FindingQueryRequest`].
#[must_use]
pub fn finding_query_request_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "FindingQueryRequest",
        "type": "object",
        "required": ["tenant_id"],
        "properties": {
            "tenant_id": { "type": "string", "minLength": 1 },
            "region": { "type": ["string", "null"] },
            "cursor": { "type": ["string", "null"] }
        },
        "additionalProperties": false
    })
}

/// Errors raised while compiling or applying schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema failed to compile.
    #[error("failed to compile schema {name}: {reason}")]
    Compile {
        /// Schema name that failed to compile.
        name: String,
        /// Underlying compiler error text.
        reason: String,
    },
    /// No schema is registered under the given name.
    #[error("no schema registered under name {0}")]
    Unknown(String),
    /// A payload failed validation against its schema.
    #[error("payload failed validation against {name}: {reason}")]
    Invalid {
        /// Schema name the payload was validated against.
        name: String,
        /// Human-readable validation failure description.
        reason: String,
    },
}

/// A name-addressed collection of compiled JSON schemas.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
}

impl SchemaRegistry {
    /// Builds the registry containing every known contract schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Compile`] if any built-in schema fails to
    /// compile, which would indicate a bug in this crate.
    pub fn build() -> Result<Self, SchemaError> {
        let mut registry = Self { validators: HashMap::new() };
        registry.register("job_submission_request", job_submission_request_schema())?;
        registry.register("finding_query_request", finding_query_request_schema())?;
        Ok(registry)
    }

    /// Compiles and registers a schema under `name`, replacing any existing
    /// registration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Compile`] when the schema fails to compile.
    pub fn register(&mut self, name: &str, schema: Value) -> Result<(), SchemaError> {
        let validator = jsonschema::validator_for(&schema).map_err(|err| SchemaError::Compile {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        self.validators.insert(name.to_string(), validator);
        Ok(())
    }

    /// Validates `payload` against the schema registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unknown`] if no schema is registered under
    /// `name`, or [`SchemaError::Invalid`] if `payload` fails validation.
    pub fn validate(&self, name: &str, payload: &Value) -> Result<(), SchemaError> {
        let validator = self.validators.get(name).ok_or_else(|| SchemaError::Unknown(name.to_string()))?;
        let mut errors = validator.iter_errors(payload).peekable();
        if errors.peek().is_none() {
            return Ok(());
        }
        let reason = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        Err(SchemaError::Invalid { name: name.to_string(), reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_job_submission_passes() {
        let registry = SchemaRegistry::build().expect("build registry");
        let payload = json!({
            "customer_id": "acme",
            "tenant_id": "acme-prod",
            "ruleset_names": ["cis-aws"],
            "regions": ["eu-west-1"]
        });
        registry.validate("job_submission_request", &payload).expect("valid payload");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let registry = SchemaRegistry::build().expect("build registry");
        let payload = json!({ "customer_id": "acme" });
        let result = registry.validate("job_submission_request", &payload);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_schema_name_is_reported() {
        let registry = SchemaRegistry::build().expect("build registry");
        let result = registry.validate("no_such_schema", &json!({}));
        assert!(matches!(result, Err(SchemaError::Unknown(_))));
    }
}
