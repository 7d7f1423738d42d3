//! # Operations
//!
//! [`SecretStoreProvider`] and [`CredentialExchanger`] for the Doppler REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

use super::{endpoint, error_from_response, is_success, DopplerClient, OidcExchangeRequest, OidcExchangeResponse};
use crate::constants::{OIDC_EXCHANGE_PATH, SECRETS_DOWNLOAD_PATH, SECRETS_FILE_KEY};
use crate::observability::metrics;
use crate::provider::{
    ApiContext, ApiError, CredentialExchanger, ExchangedCredential, RemoteSecret,
    SecretStoreProvider, SecretsFilter, SecretsSnapshot,
};

#[async_trait]
impl SecretStoreProvider for DopplerClient {
    async fn fetch_secrets(
        &self,
        context: &ApiContext,
        last_etag: Option<&str>,
        filter: &SecretsFilter,
    ) -> Result<SecretsSnapshot, ApiError> {
        let span = info_span!(
            "doppler.secrets.download",
            host = context.host.as_str(),
            conditional = last_etag.is_some()
        );

        let result = async move {
            let url = endpoint(&context.host, SECRETS_DOWNLOAD_PATH);
            let mut request = self
                .http_client(context.verify_tls)
                .get(&url)
                .basic_auth(context.api_key.as_str(), None::<&str>)
                .header(ACCEPT, "application/json")
                .query(&filter.query_params());
            if let Some(etag) = last_etag.filter(|etag| !etag.is_empty()) {
                request = request.header(IF_NONE_MATCH, etag);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ApiError::request("Unable to load response", e))?;

            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                debug!("Doppler secrets not modified");
                return Ok(SecretsSnapshot::not_modified());
            }

            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| ApiError::request("Unable to load response data", e))?;

            if !is_success(status) {
                return Err(error_from_response(status, &headers, &body));
            }

            let etag = headers
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let snapshot = parse_download(&body, etag, filter.format.is_some())?;
            debug!(secrets = snapshot.secrets.len(), "Downloaded Doppler secrets");
            Ok(snapshot)
        }
        .instrument(span)
        .await;

        metrics::increment_secret_fetches(fetch_outcome(&result));
        result
    }
}

/// Metric label for a download result, transport and parse failures included
fn fetch_outcome(result: &Result<SecretsSnapshot, ApiError>) -> &'static str {
    match result {
        Ok(snapshot) if snapshot.modified => "modified",
        Ok(_) => "not_modified",
        Err(_) => "error",
    }
}

/// Decode a successful download body
///
/// A file format keeps the payload whole under [`SECRETS_FILE_KEY`];
/// otherwise the body is a flat JSON object, returned sorted by name.
pub(crate) fn parse_download(
    body: &[u8],
    etag: String,
    as_file: bool,
) -> Result<SecretsSnapshot, ApiError> {
    let secrets = if as_file {
        vec![RemoteSecret::new(
            SECRETS_FILE_KEY,
            String::from_utf8_lossy(body).into_owned(),
        )]
    } else {
        let map: BTreeMap<String, String> =
            serde_json::from_slice(body).map_err(|source| ApiError::Parse {
                message: "Unable to parse secrets",
                source,
            })?;
        map.into_iter()
            .map(|(name, value)| RemoteSecret { name, value })
            .collect()
    };

    Ok(SecretsSnapshot {
        modified: true,
        secrets,
        etag,
    })
}

#[async_trait]
impl CredentialExchanger for DopplerClient {
    async fn exchange(
        &self,
        host: &str,
        verify_tls: bool,
        identity: &str,
        token: &str,
    ) -> Result<ExchangedCredential, ApiError> {
        let span = info_span!("doppler.oidc.exchange", host = host, identity = identity);

        async move {
            let response = self
                .http_client(verify_tls)
                .post(endpoint(host, OIDC_EXCHANGE_PATH))
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .json(&OidcExchangeRequest { identity, token })
                .send()
                .await
                .map_err(|e| ApiError::request("Failed to make request to Doppler", e))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| ApiError::request("Failed to read response body", e))?;

            if status != StatusCode::OK {
                return Err(error_from_response(status, &headers, &body));
            }

            let parsed: OidcExchangeResponse =
                serde_json::from_slice(&body).map_err(|source| ApiError::Parse {
                    message: "Failed to parse response",
                    source,
                })?;
            if !parsed.success {
                return Err(ApiError::ExchangeRejected);
            }

            let expires_at = DateTime::parse_from_rfc3339(&parsed.expires_at)?.with_timezone(&Utc);
            metrics::increment_credential_exchanges();
            debug!(expires_at = %expires_at, "Exchanged identity token for Doppler credential");

            Ok(ExchangedCredential {
                token: Zeroizing::new(parsed.token),
                expires_at,
            })
        }
        .instrument(span)
        .await
    }
}
