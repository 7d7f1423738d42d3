//! # Response Types
//!
//! Doppler API response structures.

use serde::Deserialize;

/// Error body returned on non-success responses
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub success: bool,
}

/// Body of a `POST /v3/auth/oidc` response
#[derive(Deserialize)]
pub struct OidcExchangeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: String,
    /// RFC3339 expiry of `token`
    #[serde(default)]
    pub expires_at: String,
}

impl std::fmt::Debug for OidcExchangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcExchangeResponse")
            .field("success", &self.success)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
