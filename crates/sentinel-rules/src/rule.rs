// crates/sentinel-rules/src/rule.rs
// ============================================================================
// Module: Rule YAML Parsing
// Description: Parses a single rule's YAML source form into the bundled
// sentinel_core::Rule form.
// Purpose: Rule sources carry YAML; Rulesets store JSON bundles.
// Dependencies: sentinel-core, serde_yaml
// ============================================================================

//! ## Overview
//! Rule sources hand each rule back as a YAML document shaped like
//! [`RuleDocument`]. [`parse_rule_document`] validates and converts that into
//! a [`sentinel_core::Rule`] ready to be stored in a ruleset bundle.

use sentinel_core::CloudProvider;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::RuleSourceId;
use sentinel_core::Severity;
use serde::Deserialize;
use thiserror::Error;

/// Raw shape of one rule as authored in a `RuleSource`.
#[derive(Debug, Deserialize)]
struct RuleDocument {
    slug: String,
    #[serde(rename = "n")]
    sequence: u32,
    version: u32,
    cloud: CloudProvider,
    resource_type: String,
    name: String,
    severity: Severity,
    #[serde(default)]
    service_section: Option<String>,
    #[serde(default)]
    standards: Vec<String>,
    #[serde(default)]
    mitre_techniques: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    condition: serde_json::Value,
}

/// Errors raised while parsing one rule's YAML document.
#[derive(Debug, Error)]
pub enum RuleParseError {
    /// The YAML did not deserialize into [`RuleDocument`].
    #[error("malformed rule document: {0}")]
    Malformed(String),
    /// The rule's condition tree could not be parsed.
    #[error("invalid condition: {0}")]
    InvalidCondition(#[from] crate::condition::ConditionError),
}

/// Parses one rule's YAML source text into a bundled [`Rule`].
///
/// The rule id is composed as `<source>-<cloud>-<n>-<slug>_<version>`,
/// matching the published rule naming convention.
///
/// # Errors
///
/// Returns [`RuleParseError::Malformed`] when the YAML does not match the
/// expected shape, or [`RuleParseError::InvalidCondition`] when the
/// `condition` field is not a well-formed condition tree.
pub fn parse_rule_document(source_id: &RuleSourceId, yaml_text: &str) -> Result<Rule, RuleParseError> {
    let document: RuleDocument = serde_yaml::from_str(yaml_text).map_err(|err| RuleParseError::Malformed(err.to_string()))?;
    crate::condition::parse_condition(&document.condition)?;

    let cloud_tag = cloud_tag(document.cloud);
    let id = RuleId::new(format!(
        "{source_id}-{cloud_tag}-{}-{}_{}",
        document.sequence, document.slug, document.version
    ));

    Ok(Rule {
        id,
        source_id: source_id.clone(),
        cloud: document.cloud,
        resource_type: document.resource_type,
        name: document.name,
        version: document.version,
        severity: document.severity,
        service_section: document.service_section,
        standards: document.standards,
        mitre_techniques: document.mitre_techniques,
        tags: document.tags,
        condition: document.condition,
    })
}

fn cloud_tag(cloud: CloudProvider) -> &'static str {
    match cloud {
        CloudProvider::Aws => "aws",
        CloudProvider::Azure => "azure",
        CloudProvider::Gcp => "gcp",
        CloudProvider::Kubernetes => "k8s",
    }
}

/// Returns the version-independent identity of a rule, used to detect the
/// same logical rule published by more than one source.
#[must_use]
pub fn logical_key(rule: &Rule) -> &str {
    rule.id.as_str().rsplit_once('_').map_or_else(|| rule.id.as_str(), |(base, _version)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
slug: s3-public-read
n: 12
version: 3
cloud: aws
resource_type: aws.s3.bucket
name: S3 bucket allows public read
severity: high
service_section: storage
standards: ["cis-aws-1.4"]
mitre_techniques: ["T1530"]
condition:
  predicate:
    path: public_read
    op: is_true
"#;

    #[test]
    fn parses_well_formed_document() {
        let source_id = RuleSourceId::new("community");
        let rule = parse_rule_document(&source_id, SAMPLE).expect("parse");
        assert_eq!(rule.id.as_str(), "community-aws-12-s3-public-read_3");
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.standards, vec!["cis-aws-1.4".to_string()]);
    }

    #[test]
    fn logical_key_strips_trailing_version() {
        let source_id = RuleSourceId::new("community");
        let rule = parse_rule_document(&source_id, SAMPLE).expect("parse");
        assert_eq!(logical_key(&rule), "community-aws-12-s3-public-read");
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let source_id = RuleSourceId::new("community");
        assert!(parse_rule_document(&source_id, "not: [valid").is_err());
    }
}
