// crates/sentinel-credentials/src/resolver.rs
// ============================================================================
// Module: Credentials Resolver
// Description: Priority-ordered credential resolution for a (tenant, cloud)
// scan.
// Purpose: Pick the right credentials without ever persisting request-
// supplied secrets.
// Dependencies: sentinel-core
// ============================================================================

//! ## Overview
//! [`CredentialLinkRegistry`] holds tenant- and customer-linked credential
//! applications, keyed the way `decision-gate-providers`' provider registry
//! keys evidence providers: a flat map checked before falling back further
//! down the chain. [`resolve`] implements the four-step priority order.

use std::collections::BTreeMap;

use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::TenantId;
use thiserror::Error;

/// A resolved or linked set of cloud credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSet {
    /// Long-lived static access key pair.
    Static {
        /// Access key id.
        access_key: String,
        /// Secret access key.
        secret_key: String,
        /// Optional session token for temporary static credentials.
        session_token: Option<String>,
    },
    /// A role ARN template, substituted with the tenant's cloud identifier
    /// at resolve time (e.g. `arn:aws:iam::{cloud_identifier}:role/scan`).
    RoleArnTemplate(String),
}

impl CredentialSet {
    /// Resolves a `RoleArnTemplate` by substituting `cloud_identifier`,
    /// leaving `Static` credentials unchanged.
    #[must_use]
    pub fn substitute(&self, cloud_identifier: &str) -> ResolvedCredentials {
        match self {
            Self::Static { access_key, secret_key, session_token } => ResolvedCredentials::Static {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                session_token: session_token.clone(),
            },
            Self::RoleArnTemplate(template) => {
                ResolvedCredentials::RoleArn(template.replace("{cloud_identifier}", cloud_identifier))
            }
        }
    }
}

/// Credentials ready to be handed to a worker for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    /// Static access key pair, never persisted beyond the scan.
    Static {
        /// Access key id.
        access_key: String,
        /// Secret access key.
        secret_key: String,
        /// Optional session token.
        session_token: Option<String>,
    },
    /// A fully substituted role ARN to assume.
    RoleArn(String),
    /// The host process's instance/default credentials (IMDS, env, etc.).
    InstanceDefault,
}

/// Tenant- and customer-linked credential applications.
#[derive(Default)]
pub struct CredentialLinkRegistry {
    tenant_links: BTreeMap<(CustomerId, TenantId, CloudProvider), CredentialSet>,
    customer_links: BTreeMap<(CustomerId, CloudProvider), CredentialSet>,
}

impl CredentialLinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Links credentials to a specific tenant.
    pub fn link_tenant(&mut self, customer_id: CustomerId, tenant_id: TenantId, cloud: CloudProvider, credentials: CredentialSet) {
        self.tenant_links.insert((customer_id, tenant_id, cloud), credentials);
    }

    /// Links credentials to a customer, used for any of its tenants absent
    /// a more specific tenant link.
    pub fn link_customer(&mut self, customer_id: CustomerId, cloud: CloudProvider, credentials: CredentialSet) {
        self.customer_links.insert((customer_id, cloud), credentials);
    }

    fn tenant_linked(&self, customer_id: &CustomerId, tenant_id: &TenantId, cloud: CloudProvider) -> Option<&CredentialSet> {
        self.tenant_links.get(&(customer_id.clone(), tenant_id.clone(), cloud))
    }

    fn customer_linked(&self, customer_id: &CustomerId, cloud: CloudProvider) -> Option<&CredentialSet> {
        self.customer_links.get(&(customer_id.clone(), cloud))
    }
}

/// Whether the host process has usable instance/default credentials
/// available as a last resort.
pub trait InstanceDefaultCredentials {
    /// Returns true when instance/default credentials are usable.
    fn available(&self) -> bool;
}

/// Always-available instance defaults, for environments that run with an
/// attached instance profile or default credential chain.
pub struct AlwaysAvailable;

impl InstanceDefaultCredentials for AlwaysAvailable {
    fn available(&self) -> bool {
        true
    }
}

/// Never-available instance defaults, for environments with no fallback.
pub struct NeverAvailable;

impl InstanceDefaultCredentials for NeverAvailable {
    fn available(&self) -> bool {
        false
    }
}

/// Resolution failure; the job manager marks the job `FAILED` with this
/// reason verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Could not resolve any credentials")]
pub struct CredentialsUnresolved;

/// Resolves credentials for a (tenant, cloud) scan in priority order:
/// request override, tenant-linked application, customer-linked
/// application, then the host process's instance/default credentials.
///
/// # Errors
///
/// Returns [`CredentialsUnresolved`] when no step in the chain yields
/// usable credentials.
pub fn resolve(
    customer_id: &CustomerId,
    tenant_id: &TenantId,
    cloud: CloudProvider,
    cloud_identifier: &str,
    request_override: Option<&CredentialSet>,
    links: &CredentialLinkRegistry,
    instance_defaults: &dyn InstanceDefaultCredentials,
) -> Result<ResolvedCredentials, CredentialsUnresolved> {
    if let Some(credentials) = request_override {
        return Ok(credentials.substitute(cloud_identifier));
    }
    if let Some(credentials) = links.tenant_linked(customer_id, tenant_id, cloud) {
        return Ok(credentials.substitute(cloud_identifier));
    }
    if let Some(credentials) = links.customer_linked(customer_id, cloud) {
        return Ok(credentials.substitute(cloud_identifier));
    }
    if instance_defaults.available() {
        return Ok(ResolvedCredentials::InstanceDefault);
    }
    Err(CredentialsUnresolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (CustomerId, TenantId) {
        (CustomerId::new("cust-1"), TenantId::new("tenant-1"))
    }

    #[test]
    fn request_override_wins_over_every_link() {
        let (customer_id, tenant_id) = ids();
        let mut links = CredentialLinkRegistry::new();
        links.link_tenant(
            customer_id.clone(),
            tenant_id.clone(),
            CloudProvider::Aws,
            CredentialSet::RoleArnTemplate("arn:aws:iam::{cloud_identifier}:role/linked".to_string()),
        );
        let override_set = CredentialSet::Static { access_key: "AK".to_string(), secret_key: "SK".to_string(), session_token: None };
        let resolved =
            resolve(&customer_id, &tenant_id, CloudProvider::Aws, "111111111111", Some(&override_set), &links, &NeverAvailable)
                .expect("resolve");
        assert_eq!(resolved, ResolvedCredentials::Static { access_key: "AK".to_string(), secret_key: "SK".to_string(), session_token: None });
    }

    #[test]
    fn tenant_link_wins_over_customer_link() {
        let (customer_id, tenant_id) = ids();
        let mut links = CredentialLinkRegistry::new();
        links.link_customer(
            customer_id.clone(),
            CloudProvider::Aws,
            CredentialSet::RoleArnTemplate("arn:aws:iam::{cloud_identifier}:role/customer".to_string()),
        );
        links.link_tenant(
            customer_id.clone(),
            tenant_id.clone(),
            CloudProvider::Aws,
            CredentialSet::RoleArnTemplate("arn:aws:iam::{cloud_identifier}:role/tenant".to_string()),
        );
        let resolved = resolve(&customer_id, &tenant_id, CloudProvider::Aws, "222222222222", None, &links, &NeverAvailable).expect("resolve");
        assert_eq!(resolved, ResolvedCredentials::RoleArn("arn:aws:iam::222222222222:role/tenant".to_string()));
    }

    #[test]
    fn falls_back_to_instance_defaults() {
        let (customer_id, tenant_id) = ids();
        let links = CredentialLinkRegistry::new();
        let resolved = resolve(&customer_id, &tenant_id, CloudProvider::Aws, "333333333333", None, &links, &AlwaysAvailable).expect("resolve");
        assert_eq!(resolved, ResolvedCredentials::InstanceDefault);
    }

    #[test]
    fn total_failure_reports_exact_reason_text() {
        let (customer_id, tenant_id) = ids();
        let links = CredentialLinkRegistry::new();
        let error = resolve(&customer_id, &tenant_id, CloudProvider::Aws, "444444444444", None, &links, &NeverAvailable).unwrap_err();
        assert_eq!(error.to_string(), "Could not resolve any credentials");
    }
}
