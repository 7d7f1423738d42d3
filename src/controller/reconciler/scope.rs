//! # Namespace Scope
//!
//! A `DopplerSecret` outside the controller namespace may only reference the
//! token secret and managed secret in its own namespace. Resources in the
//! controller namespace may reach any namespace.

use kube::ResourceExt;
use thiserror::Error;

use crate::crd::DopplerSecret;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "cannot reconcile dopplersecret ({namespace}/{name}) in namespace different from operator ({operator_namespace}) \
     unless all references [token: ({token_namespace}/{token_name}), managed: ({managed_namespace}/{managed_name})] \
     are in the dopplersecret's namespace"
)]
pub struct ScopeViolation {
    pub namespace: String,
    pub name: String,
    pub operator_namespace: String,
    pub token_namespace: String,
    pub token_name: String,
    pub managed_namespace: String,
    pub managed_name: String,
}

/// Why a resource is allowed to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeGrant {
    /// Lives in the controller namespace; references can be anywhere
    OperatorNamespace,
    /// All references are in the resource's own namespace
    SameNamespace,
}

/// Namespace of the managed secret, defaulting to the resource's own
pub fn managed_secret_namespace(resource: &DopplerSecret) -> String {
    resource
        .spec
        .managed_secret
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| resource.namespace().unwrap_or_default())
}

/// Namespace of the token secret, defaulting to the resource's own
///
/// Resources using `identity` have no token secret and resolve to their own namespace.
pub fn token_secret_namespace(resource: &DopplerSecret) -> String {
    resource
        .spec
        .token_secret
        .as_ref()
        .and_then(|r| r.namespace.clone())
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| resource.namespace().unwrap_or_default())
}

pub fn validate_scope(
    resource: &DopplerSecret,
    operator_namespace: &str,
) -> Result<ScopeGrant, ScopeViolation> {
    let namespace = resource.namespace().unwrap_or_default();
    if namespace == operator_namespace {
        return Ok(ScopeGrant::OperatorNamespace);
    }

    let token_namespace = token_secret_namespace(resource);
    let managed_namespace = managed_secret_namespace(resource);
    if token_namespace == namespace && managed_namespace == namespace {
        return Ok(ScopeGrant::SameNamespace);
    }

    Err(ScopeViolation {
        name: resource.name_any(),
        operator_namespace: operator_namespace.to_string(),
        token_name: resource
            .spec
            .token_secret
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_default(),
        token_namespace,
        managed_name: resource.spec.managed_secret.name.clone(),
        managed_namespace,
        namespace,
    })
}
