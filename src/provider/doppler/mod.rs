//! Doppler REST Client
//!
//! Native REST implementation of the Doppler v3 endpoints the controller needs:
//!
//! - `GET /v3/configs/config/secrets/download` - conditional secrets download
//! - `POST /v3/auth/oidc` - identity token exchange
//!
//! Uses reqwest with rustls (no OpenSSL dependencies). Two clients are built up
//! front, one verifying TLS and one not, so the per-resource `verifyTLS` flag
//! never requires building a client mid-pass. Both disable idle connection
//! pooling: credentials rotate underneath long-lived sockets.

mod operations;
mod requests;
mod responses;

pub use requests::*;
pub use responses::*;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header::HeaderMap, Client, StatusCode};

use crate::provider::ApiError;

/// Doppler API client
pub struct DopplerClient {
    verified: Client,
    unverified: Client,
}

impl std::fmt::Debug for DopplerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DopplerClient").finish_non_exhaustive()
    }
}

impl DopplerClient {
    /// Create a client whose requests time out after `timeout`
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            verified: build_http_client(timeout, true).context("Failed to create HTTP client")?,
            unverified: build_http_client(timeout, false)
                .context("Failed to create HTTP client without TLS verification")?,
        })
    }

    pub(crate) fn http_client(&self, verify_tls: bool) -> &Client {
        if verify_tls {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

fn build_http_client(timeout: Duration, verify_tls: bool) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(0)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
}

pub fn user_agent() -> String {
    format!("doppler-secrets-controller/{}", env!("CARGO_PKG_VERSION"))
}

/// Join the API host and an absolute path
pub(crate) fn endpoint(host: &str, path: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), path)
}

/// 2xx and 3xx count as success (304 is how "not modified" arrives)
pub(crate) fn is_success(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

/// Map an error response to an [`ApiError`]
///
/// JSON bodies contribute their `messages`; anything else is reduced to the
/// status code and body length.
pub(crate) fn error_from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ApiError {
    let is_json = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if !is_json {
        return ApiError::Status {
            status: status.as_u16(),
            bytes: body.len(),
        };
    }

    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(response) => ApiError::Remote {
            status: status.as_u16(),
            messages: response.messages.join("\n"),
        },
        Err(source) => ApiError::Parse {
            message: "Unable to load response",
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn test_json_error_messages_are_joined() {
        let body = br#"{"messages":["Invalid token","Token expired"],"success":false}"#;
        let err = error_from_response(StatusCode::UNAUTHORIZED, &json_headers(), body);
        assert_eq!(err.to_string(), "Doppler Error: Invalid token\nToken expired");
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_opaque_error_reports_size_only() {
        let body = b"<html>upstream secret-ish details</html>";
        let err = error_from_response(StatusCode::BAD_GATEWAY, &HeaderMap::new(), body);
        let message = err.to_string();
        assert!(message.contains("502 status code; 40 bytes"));
        assert!(!message.contains("upstream"));
    }

    #[test]
    fn test_malformed_json_error() {
        let err = error_from_response(StatusCode::INTERNAL_SERVER_ERROR, &json_headers(), b"{");
        assert!(matches!(err, ApiError::Parse { .. }));
    }

    #[test]
    fn test_success_includes_redirects() {
        assert!(is_success(StatusCode::OK));
        assert!(is_success(StatusCode::NOT_MODIFIED));
        assert!(!is_success(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://api.doppler.com/", "/v3/auth/oidc"),
            "https://api.doppler.com/v3/auth/oidc"
        );
    }
}
