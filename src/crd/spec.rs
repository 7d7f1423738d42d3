//! # DopplerSecret Spec
//!
//! Main CRD specification types and default values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DOPPLER_HOST, DEFAULT_RESYNC_SECONDS};
use crate::crd::{ManagedSecretType, NameTransformer, SecretsFormat};

/// DopplerSecret Custom Resource Definition
///
/// Declares one Doppler config (or a subset of it) to be kept in sync with a
/// Kubernetes Secret.
///
/// # Example
///
/// ```yaml
/// apiVersion: secrets.doppler.com/v1alpha1
/// kind: DopplerSecret
/// metadata:
///   name: backend-secrets
///   namespace: backend
/// spec:
///   tokenSecret:
///     name: doppler-token
///   managedSecret:
///     name: backend-env
///   processors:
///     TLS_CERT:
///       type: base64
///       asName: tls.crt
///   resyncSeconds: 120
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "DopplerSecret",
    group = "secrets.doppler.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::DopplerSecretStatus",
    shortname = "dopplersecret",
    printcolumn = r#"{"name":"Managed Secret", "type":"string", "jsonPath":".spec.managedSecret.name"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"secrets.doppler.com/SecretSyncReady\")].status"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DopplerSecretSpec {
    /// Secret holding either a `serviceToken` or an `identity` for token exchange
    /// Mutually exclusive with `identity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<TokenSecretReference>,
    /// Doppler service account identity used for OIDC token exchange
    /// Mutually exclusive with `tokenSecret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Lifetime of the Kubernetes service account token presented during exchange
    /// Default: 600
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<i64>,
    /// The Kubernetes Secret the controller creates and keeps in sync
    pub managed_secret: ManagedSecretReference,
    /// Doppler project (required for personal tokens, implied by service tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Doppler config (required for personal tokens, implied by service tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Only download these secret names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    /// Per-secret processing rules keyed by Doppler secret name
    #[serde(default)]
    pub processors: SecretProcessors,
    /// Doppler API host
    #[serde(default = "default_host")]
    pub host: String,
    /// Verify the TLS certificate of the Doppler API
    #[serde(default = "default_true", rename = "verifyTLS")]
    pub verify_tls: bool,
    /// Name transformer applied by Doppler before download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_transformer: Option<NameTransformer>,
    /// Download the whole config as a single file in this format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SecretsFormat>,
    /// Seconds between resyncs
    /// Default: 60
    #[serde(default = "default_resync_seconds")]
    pub resync_seconds: u64,
}

/// Reference to the Secret holding Doppler credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSecretReference {
    pub name: String,
    /// Defaults to the DopplerSecret namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The Secret written by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretReference {
    pub name: String,
    /// Defaults to the DopplerSecret namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Secret type, fixed once the managed secret exists
    #[serde(default, rename = "type")]
    pub secret_type: ManagedSecretType,
    /// Extra labels on the managed secret
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Extra annotations on the managed secret
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Processing rule for one Doppler secret
///
/// Serialized field order matters: the processors map is hashed into the
/// `processor-version` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretProcessor {
    /// `plain` or `base64`
    #[serde(rename = "type", default = "default_processor_type")]
    pub processor_type: String,
    /// Key to store the processed value under instead of the Doppler name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
}

impl Default for SecretProcessor {
    fn default() -> Self {
        Self {
            processor_type: default_processor_type(),
            as_name: None,
        }
    }
}

/// Processors keyed by Doppler secret name, ordered for stable hashing
pub type SecretProcessors = BTreeMap<String, SecretProcessor>;

pub fn default_host() -> String {
    DEFAULT_DOPPLER_HOST.to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_resync_seconds() -> u64 {
    DEFAULT_RESYNC_SECONDS
}

pub fn default_processor_type() -> String {
    "plain".to_string()
}
