//! # Auth
//!
//! Resolves how a `DopplerSecret` authenticates against Doppler and produces an
//! [`ApiContext`] for each reconcile pass.
//!
//! Two modes are supported:
//!
//! - **Service token** - a static token read from the `serviceToken` field of the
//!   referenced token secret, re-read on every pass.
//! - **Identity exchange** - a service account token bound to a set of audiences is
//!   traded for a short-lived credential. Providers for this mode are kept in a
//!   bounded [`CredentialCache`] so the exchanged credential survives across passes.
//!
//! The identity may come from the resource itself (`spec.identity`) or from the
//! `identity` field of the token secret. The audience set always contains the host
//! and a binding naming the resource (or token secret) the token was issued for,
//! plus the identity itself when it is a UUID.

mod cache;
mod errors;
mod exchange;
mod service_token;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{Api, Client, ResourceExt};
use regex::Regex;
use tracing::{debug, info, warn};

pub use cache::{CacheKey, CredentialCache, EvictionHook};
pub use errors::AuthError;
pub use exchange::{
    ExchangeProvider, ExchangeSettings, IdentityTokenSource, ServiceAccountTokenSource,
};
pub use service_token::ServiceTokenProvider;

use crate::constants::{
    DEFAULT_TOKEN_EXPIRATION_SECONDS, EXPIRATION_SECONDS_KEY, IDENTITY_KEY, SERVICE_TOKEN_KEY,
};
use crate::crd::{DopplerSecret, DopplerSecretSpec, TokenSecretReference};
use crate::provider::{ApiContext, CredentialExchanger};

static UUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("Failed to compile UUID regex - this should never happen")
});

/// Cache of exchange providers shared by every reconcile pass
pub type ProviderCache = CredentialCache<Arc<ExchangeProvider>>;

/// Auth provider for a single pass
#[derive(Debug)]
pub enum AuthProvider {
    ServiceToken(ServiceTokenProvider),
    Exchange(ExchangeAuth),
}

impl AuthProvider {
    /// Produce the credential and connection settings for this pass
    pub async fn acquire_credential(&self) -> Result<ApiContext, AuthError> {
        match self {
            Self::ServiceToken(provider) => provider.acquire_credential().await,
            Self::Exchange(auth) => auth.acquire_credential().await,
        }
    }
}

/// A cached exchange provider together with the key it is cached under
pub struct ExchangeAuth {
    provider: Arc<ExchangeProvider>,
    cache_key: CacheKey,
    cache: Arc<ProviderCache>,
}

impl fmt::Debug for ExchangeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeAuth")
            .field("cache_key", &self.cache_key)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl ExchangeAuth {
    async fn acquire_credential(&self) -> Result<ApiContext, AuthError> {
        match self.provider.token().await {
            Ok(token) => {
                let settings = self.provider.settings();
                Ok(ApiContext::new(
                    settings.host.clone(),
                    token.as_str(),
                    settings.verify_tls,
                ))
            }
            Err(e) => {
                // The next pass builds a fresh provider instead of reusing this one.
                self.cache.remove(&self.cache_key);
                Err(e)
            }
        }
    }
}

/// Which auth mode the resource asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode<'a> {
    Identity(&'a str),
    TokenSecret(&'a TokenSecretReference),
}

/// Exactly one of `identity` and `tokenSecret` must be set
pub fn select_mode(spec: &DopplerSecretSpec) -> Result<AuthMode<'_>, AuthError> {
    let identity = spec.identity.as_deref().filter(|i| !i.is_empty());
    match (identity, spec.token_secret.as_ref()) {
        (Some(identity), None) => Ok(AuthMode::Identity(identity)),
        (None, Some(reference)) => Ok(AuthMode::TokenSecret(reference)),
        (Some(_), Some(_)) => Err(AuthError::InvalidAuthMode("both")),
        (None, None) => Err(AuthError::InvalidAuthMode("neither")),
    }
}

/// What the token secret carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSecretContents {
    ServiceToken,
    Identity {
        identity: String,
        expiration_seconds: Option<String>,
    },
}

pub fn classify_token_secret(
    data: Option<&BTreeMap<String, ByteString>>,
) -> Result<TokenSecretContents, AuthError> {
    let field = |key: &str| {
        data.and_then(|d| d.get(key))
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
    };

    match (field(SERVICE_TOKEN_KEY), field(IDENTITY_KEY)) {
        (Some(_), Some(_)) => Err(AuthError::ConflictingTokenFields),
        (None, Some(identity)) => Ok(TokenSecretContents::Identity {
            identity,
            expiration_seconds: field(EXPIRATION_SECONDS_KEY),
        }),
        (Some(_), None) => Ok(TokenSecretContents::ServiceToken),
        (None, None) => Err(AuthError::MissingTokenFields),
    }
}

/// Audiences requested for the local service account token
pub fn build_audiences(host: &str, binding: String, identity: &str) -> Vec<String> {
    let mut audiences = vec![host.to_string(), binding];
    if UUID_REGEX.is_match(&identity.to_lowercase()) {
        audiences.push(identity.to_string());
    }
    audiences
}

/// Token lifetime from the resource or the token secret, in that order
///
/// `from_secret` is `None` when there is no token secret or it lacks the field.
pub fn resolve_expiration(
    from_spec: Option<i64>,
    from_secret: Option<&str>,
) -> Result<i64, AuthError> {
    let from_spec = from_spec.filter(|s| *s > 0);
    match (from_spec, from_secret) {
        (Some(_), Some(_)) => Err(AuthError::ConflictingExpiration),
        (Some(seconds), None) => Ok(seconds),
        (None, Some(raw)) => Ok(raw.trim().parse().unwrap_or_else(|_| {
            info!(
                value = raw,
                default = DEFAULT_TOKEN_EXPIRATION_SECONDS,
                "Invalid expirationSeconds in token secret, using default"
            );
            DEFAULT_TOKEN_EXPIRATION_SECONDS
        })),
        (None, None) => Ok(DEFAULT_TOKEN_EXPIRATION_SECONDS),
    }
}

/// Builds auth providers and owns the exchange provider cache
pub struct AuthManager {
    client: Client,
    exchanger: Arc<dyn CredentialExchanger>,
    cache: Arc<ProviderCache>,
    service_account: String,
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("cache", &self.cache)
            .field("service_account", &self.service_account)
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(
        client: Client,
        exchanger: Arc<dyn CredentialExchanger>,
        cache: Arc<ProviderCache>,
        service_account: String,
    ) -> Self {
        Self {
            client,
            exchanger,
            cache,
            service_account,
        }
    }

    /// Resolve the auth provider for `resource`
    ///
    /// `operator_namespace` is where the controller's service account lives; it is
    /// only needed for the exchange mode.
    pub async fn resolve(
        &self,
        resource: &DopplerSecret,
        operator_namespace: &str,
    ) -> Result<AuthProvider, AuthError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let spec = &resource.spec;

        match select_mode(spec)? {
            AuthMode::Identity(identity) => {
                let expiration = resolve_expiration(spec.expiration_seconds, None)?;
                let binding = format!("dopplerSecret:{namespace}:{name}");
                Ok(self.exchange_provider(spec, identity, binding, expiration, operator_namespace))
            }
            AuthMode::TokenSecret(reference) => {
                let token_namespace = reference
                    .namespace
                    .clone()
                    .filter(|ns| !ns.is_empty())
                    .unwrap_or(namespace);
                let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &token_namespace);
                let token_secret = secrets
                    .get(&reference.name)
                    .await
                    .map_err(AuthError::TokenSecretFetch)?;

                match classify_token_secret(token_secret.data.as_ref())? {
                    TokenSecretContents::ServiceToken => {
                        debug!(resource.name = %name, "Using service token auth");
                        Ok(AuthProvider::ServiceToken(ServiceTokenProvider::new(
                            self.client.clone(),
                            reference.name.clone(),
                            token_namespace,
                            spec.host.clone(),
                            spec.verify_tls,
                        )))
                    }
                    TokenSecretContents::Identity {
                        identity,
                        expiration_seconds,
                    } => {
                        let expiration = resolve_expiration(
                            spec.expiration_seconds,
                            expiration_seconds.as_deref(),
                        )?;
                        let binding =
                            format!("dopplerTokenSecret:{token_namespace}:{}", reference.name);
                        Ok(self.exchange_provider(
                            spec,
                            &identity,
                            binding,
                            expiration,
                            operator_namespace,
                        ))
                    }
                }
            }
        }
    }

    fn exchange_provider(
        &self,
        spec: &DopplerSecretSpec,
        identity: &str,
        binding: String,
        expiration_seconds: i64,
        operator_namespace: &str,
    ) -> AuthProvider {
        let audiences = build_audiences(&spec.host, binding, identity);
        let cache_key = CacheKey::new(identity, &audiences);

        let provider = match self.cache.get(&cache_key) {
            Some(provider) => {
                debug!(cache_key = %cache_key, "Using cached exchange provider");
                provider
            }
            None => {
                info!(identity = identity, "Creating new exchange provider");
                let token_source = ServiceAccountTokenSource::new(
                    self.client.clone(),
                    operator_namespace.to_string(),
                    self.service_account.clone(),
                );
                let provider = Arc::new(ExchangeProvider::new(
                    ExchangeSettings {
                        identity: identity.to_string(),
                        audiences,
                        host: spec.host.clone(),
                        verify_tls: spec.verify_tls,
                        expiration_seconds,
                    },
                    Arc::new(token_source),
                    Arc::clone(&self.exchanger),
                ));
                self.cache.put(cache_key.clone(), Arc::clone(&provider));
                if self.cache.capacity() == 0 {
                    warn!("Exchange provider cache is disabled, credentials are exchanged on every pass");
                }
                provider
            }
        };

        AuthProvider::Exchange(ExchangeAuth {
            provider,
            cache_key,
            cache: Arc::clone(&self.cache),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ApiError, ExchangedCredential};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zeroize::Zeroizing;

    struct FixedIdentityToken;

    #[async_trait]
    impl IdentityTokenSource for FixedIdentityToken {
        async fn identity_token(
            &self,
            _audiences: &[String],
            _expiration_seconds: i64,
        ) -> Result<Zeroizing<String>, AuthError> {
            Ok(Zeroizing::new("k8s-jwt".to_string()))
        }
    }

    struct FixedExchanger {
        reject: bool,
    }

    #[async_trait]
    impl CredentialExchanger for FixedExchanger {
        async fn exchange(
            &self,
            _host: &str,
            _verify_tls: bool,
            _identity: &str,
            _token: &str,
        ) -> Result<ExchangedCredential, ApiError> {
            if self.reject {
                return Err(ApiError::ExchangeRejected);
            }
            Ok(ExchangedCredential {
                token: Zeroizing::new("dp.sa.exchanged".to_string()),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        }
    }

    /// Cache with one provider under `identity-1` and one under `identity-2`
    fn cached_exchange(reject: bool) -> (AuthProvider, Arc<ProviderCache>, Arc<AtomicUsize>) {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evictions);
        let cache: Arc<ProviderCache> = Arc::new(CredentialCache::with_eviction_hook(
            4,
            move |_: &CacheKey, _: &Arc<ExchangeProvider>| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let audiences = vec!["https://api.doppler.com".to_string()];
        let provider = Arc::new(ExchangeProvider::new(
            ExchangeSettings {
                identity: "identity-1".to_string(),
                audiences: audiences.clone(),
                host: "https://api.doppler.com".to_string(),
                verify_tls: true,
                expiration_seconds: 600,
            },
            Arc::new(FixedIdentityToken),
            Arc::new(FixedExchanger { reject }),
        ));
        let cache_key = CacheKey::new("identity-1", &audiences);
        cache.put(cache_key.clone(), Arc::clone(&provider));
        cache.put(CacheKey::new("identity-2", &audiences), Arc::clone(&provider));

        let auth = AuthProvider::Exchange(ExchangeAuth {
            provider,
            cache_key,
            cache: Arc::clone(&cache),
        });
        (auth, cache, evictions)
    }

    #[tokio::test]
    async fn test_failed_exchange_evicts_cached_provider() {
        let (auth, cache, evictions) = cached_exchange(true);
        let audiences = vec!["https://api.doppler.com".to_string()];

        let err = auth.acquire_credential().await.unwrap_err();

        assert!(matches!(err, AuthError::Exchange(ApiError::ExchangeRejected)));
        assert!(cache.get(&CacheKey::new("identity-1", &audiences)).is_none());
        assert!(cache.get(&CacheKey::new("identity-2", &audiences)).is_some());
        assert_eq!(evictions.load(Ordering::SeqCst), 1);

        // A second failure finds nothing left to evict
        assert!(auth.acquire_credential().await.is_err());
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_exchange_keeps_cached_provider() {
        let (auth, cache, evictions) = cached_exchange(false);

        let context = auth.acquire_credential().await.unwrap();

        assert_eq!(context.api_key.as_str(), "dp.sa.exchanged");
        assert_eq!(context.host, "https://api.doppler.com");
        assert_eq!(cache.len(), 2);
        assert_eq!(evictions.load(Ordering::SeqCst), 0);
    }

    fn spec() -> DopplerSecretSpec {
        serde_json::from_value(serde_json::json!({
            "managedSecret": { "name": "app-secrets" }
        }))
        .unwrap()
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn test_select_mode_identity() {
        let mut spec = spec();
        spec.identity = Some("my-identity".to_string());
        assert_eq!(select_mode(&spec).unwrap(), AuthMode::Identity("my-identity"));
    }

    #[test]
    fn test_select_mode_token_secret() {
        let mut spec = spec();
        spec.token_secret = Some(TokenSecretReference {
            name: "doppler-token".to_string(),
            namespace: None,
        });
        assert!(matches!(select_mode(&spec).unwrap(), AuthMode::TokenSecret(r) if r.name == "doppler-token"));
    }

    #[test]
    fn test_select_mode_rejects_both_and_neither() {
        let mut spec = spec();
        let err = select_mode(&spec).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("neither"));

        spec.identity = Some("id".to_string());
        spec.token_secret = Some(TokenSecretReference {
            name: "doppler-token".to_string(),
            namespace: None,
        });
        assert!(select_mode(&spec).unwrap_err().to_string().contains("both"));
    }

    #[test]
    fn test_empty_identity_counts_as_unset() {
        let mut spec = spec();
        spec.identity = Some(String::new());
        assert!(matches!(
            select_mode(&spec),
            Err(AuthError::InvalidAuthMode("neither"))
        ));
    }

    #[test]
    fn test_classify_token_secret() {
        assert_eq!(
            classify_token_secret(Some(&data(&[("serviceToken", "dp.st.x")]))).unwrap(),
            TokenSecretContents::ServiceToken
        );
        assert_eq!(
            classify_token_secret(Some(&data(&[("identity", "id"), ("expirationSeconds", "900")])))
                .unwrap(),
            TokenSecretContents::Identity {
                identity: "id".to_string(),
                expiration_seconds: Some("900".to_string()),
            }
        );
        assert!(matches!(
            classify_token_secret(Some(&data(&[("serviceToken", "a"), ("identity", "b")]))),
            Err(AuthError::ConflictingTokenFields)
        ));
        assert!(matches!(
            classify_token_secret(None),
            Err(AuthError::MissingTokenFields)
        ));
    }

    #[test]
    fn test_audiences_include_uuid_identity() {
        let identity = "0F8FAD5B-D9CB-469F-A165-70867728950E";
        let audiences = build_audiences(
            "https://api.doppler.com",
            "dopplerSecret:default:app".to_string(),
            identity,
        );
        assert_eq!(
            audiences,
            vec![
                "https://api.doppler.com".to_string(),
                "dopplerSecret:default:app".to_string(),
                identity.to_string(),
            ]
        );
    }

    #[test]
    fn test_audiences_skip_non_uuid_identity() {
        let audiences = build_audiences(
            "https://api.doppler.com",
            "dopplerTokenSecret:ops:doppler-token".to_string(),
            "my-service-identity",
        );
        assert_eq!(audiences.len(), 2);
        assert_eq!(audiences[1], "dopplerTokenSecret:ops:doppler-token");
    }

    #[test]
    fn test_resolve_expiration() {
        assert_eq!(resolve_expiration(None, None).unwrap(), 600);
        assert_eq!(resolve_expiration(Some(1200), None).unwrap(), 1200);
        assert_eq!(resolve_expiration(None, Some("900")).unwrap(), 900);
        assert_eq!(resolve_expiration(None, Some("soon")).unwrap(), 600);
        // Non-positive spec values count as unset.
        assert_eq!(resolve_expiration(Some(0), Some("900")).unwrap(), 900);
        assert!(matches!(
            resolve_expiration(Some(1200), Some("900")),
            Err(AuthError::ConflictingExpiration)
        ));
    }
}
