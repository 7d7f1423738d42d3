//! # Provider Modules
//!
//! The remote secret store the controller downloads from.
//!
//! - [`SecretStoreProvider`] - conditional download of a config's secrets
//! - [`CredentialExchanger`] - trade a workload identity token for an API credential
//!
//! [`doppler::DopplerClient`] implements both over the Doppler REST API.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::crd::{NameTransformer, SecretsFormat};

pub mod doppler;
mod errors;

pub use errors::ApiError;

/// Where and how to call the Doppler API for one pass
#[derive(Clone)]
pub struct ApiContext {
    pub host: String,
    pub api_key: Zeroizing<String>,
    pub verify_tls: bool,
}

impl ApiContext {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, verify_tls: bool) -> Self {
        Self {
            host: host.into(),
            api_key: Zeroizing::new(api_key.into()),
            verify_tls,
        }
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Which secrets to download and in what shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretsFilter {
    pub project: Option<String>,
    pub config: Option<String>,
    /// Subset of secret names; empty means all
    pub secrets: Vec<String>,
    pub name_transformer: Option<NameTransformer>,
    pub format: Option<SecretsFormat>,
}

/// One downloaded secret
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSecret {
    pub name: String,
    pub value: String,
}

impl RemoteSecret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for RemoteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSecret")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result of a conditional download
///
/// When `modified` is false the remote answered "not modified": `secrets` is
/// empty and must not be written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsSnapshot {
    pub modified: bool,
    /// Sorted by name
    pub secrets: Vec<RemoteSecret>,
    pub etag: String,
}

impl SecretsSnapshot {
    pub fn not_modified() -> Self {
        Self {
            modified: false,
            secrets: Vec::new(),
            etag: String::new(),
        }
    }
}

/// A short-lived API credential obtained through token exchange
#[derive(Clone)]
pub struct ExchangedCredential {
    pub token: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ExchangedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Provider trait for the remote secret store
#[async_trait]
pub trait SecretStoreProvider: Send + Sync {
    /// Download secrets, sending `last_etag` so an unchanged config short-circuits
    ///
    /// Pass `None` to force a full download.
    async fn fetch_secrets(
        &self,
        context: &ApiContext,
        last_etag: Option<&str>,
        filter: &SecretsFilter,
    ) -> Result<SecretsSnapshot, ApiError>;
}

/// Exchanges a workload identity token for a Doppler API credential
#[async_trait]
pub trait CredentialExchanger: Send + Sync {
    async fn exchange(
        &self,
        host: &str,
        verify_tls: bool,
        identity: &str,
        token: &str,
    ) -> Result<ExchangedCredential, ApiError>;
}
