//! # Exchange-based Auth
//!
//! Trades a Kubernetes service account token, bound to a set of audiences,
//! for a short-lived Doppler API credential and caches it until close to expiry.
//!
//! Refresh uses a read-check / write-recheck on a `tokio::sync::RwLock`: the
//! common path only takes the read lock, and concurrent callers that all see an
//! expired credential perform a single exchange between them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::{api::PostParams, Api, Client};
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::auth::AuthError;
use crate::constants::TOKEN_EXPIRY_MARGIN_SECS;
use crate::provider::{CredentialExchanger, ExchangedCredential};

/// Source of the local proof-of-identity token presented during exchange
#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    async fn identity_token(
        &self,
        audiences: &[String],
        expiration_seconds: i64,
    ) -> Result<Zeroizing<String>, AuthError>;
}

/// Requests tokens for the controller's service account via the TokenRequest API
#[derive(Clone)]
pub struct ServiceAccountTokenSource {
    client: Client,
    namespace: String,
    service_account: String,
}

impl ServiceAccountTokenSource {
    pub fn new(client: Client, namespace: String, service_account: String) -> Self {
        Self {
            client,
            namespace,
            service_account,
        }
    }
}

impl fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("namespace", &self.namespace)
            .field("service_account", &self.service_account)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityTokenSource for ServiceAccountTokenSource {
    async fn identity_token(
        &self,
        audiences: &[String],
        expiration_seconds: i64,
    ) -> Result<Zeroizing<String>, AuthError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &self.namespace);
        let request = TokenRequest {
            metadata: Default::default(),
            spec: TokenRequestSpec {
                audiences: audiences.to_vec(),
                expiration_seconds: Some(expiration_seconds),
                bound_object_ref: None,
            },
            status: None,
        };

        let response = api
            .create_token_request(&self.service_account, &PostParams::default(), &request)
            .await
            .map_err(AuthError::ServiceAccountToken)?;

        response
            .status
            .map(|status| status.token)
            .filter(|token| !token.is_empty())
            .map(Zeroizing::new)
            .ok_or(AuthError::EmptyServiceAccountToken)
    }
}

/// Exchange settings fixed for the lifetime of a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSettings {
    pub identity: String,
    pub audiences: Vec<String>,
    pub host: String,
    pub verify_tls: bool,
    pub expiration_seconds: i64,
}

/// Caches one exchanged Doppler credential
pub struct ExchangeProvider {
    settings: ExchangeSettings,
    token_source: Arc<dyn IdentityTokenSource>,
    exchanger: Arc<dyn CredentialExchanger>,
    cached: RwLock<Option<ExchangedCredential>>,
}

impl fmt::Debug for ExchangeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeProvider")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ExchangeProvider {
    pub fn new(
        settings: ExchangeSettings,
        token_source: Arc<dyn IdentityTokenSource>,
        exchanger: Arc<dyn CredentialExchanger>,
    ) -> Self {
        Self {
            settings,
            token_source,
            exchanger,
            cached: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    /// Current Doppler credential, exchanging a new one when needed
    pub async fn token(&self) -> Result<Zeroizing<String>, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = fresh(cached.as_ref(), Utc::now()) {
                return Ok(credential.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(credential) = fresh(cached.as_ref(), Utc::now()) {
            debug!(identity = %self.settings.identity, "Credential refreshed by concurrent caller");
            return Ok(credential.token.clone());
        }

        let identity_token = self
            .token_source
            .identity_token(&self.settings.audiences, self.settings.expiration_seconds)
            .await?;

        let credential = self
            .exchanger
            .exchange(
                &self.settings.host,
                self.settings.verify_tls,
                &self.settings.identity,
                &identity_token,
            )
            .await
            .map_err(AuthError::Exchange)?;

        info!(
            identity = %self.settings.identity,
            expires_at = %credential.expires_at,
            "🔑 Exchanged identity token for Doppler credential"
        );

        let token = credential.token.clone();
        *cached = Some(credential);
        Ok(token)
    }
}

/// The credential if it has more than the safety margin left
fn fresh(credential: Option<&ExchangedCredential>, now: DateTime<Utc>) -> Option<&ExchangedCredential> {
    credential.filter(|c| {
        !c.token.is_empty()
            && c.expires_at - now > chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
    })
}
