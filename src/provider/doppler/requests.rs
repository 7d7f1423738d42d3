//! # Request Types
//!
//! Query parameters and JSON bodies sent to the Doppler API.

use serde::Serialize;

use crate::provider::SecretsFilter;

impl SecretsFilter {
    /// Query parameters for the download endpoint, omitting unset filters
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) {
            params.push(("project", project.to_string()));
        }
        if let Some(config) = self.config.as_deref().filter(|c| !c.is_empty()) {
            params.push(("config", config.to_string()));
        }
        if !self.secrets.is_empty() {
            params.push(("secrets", self.secrets.join(",")));
        }
        if let Some(transformer) = self.name_transformer {
            params.push(("name_transformer", transformer.as_str().to_string()));
        }
        if let Some(format) = self.format {
            params.push(("format", format.as_str().to_string()));
        }
        params
    }
}

/// Body of `POST /v3/auth/oidc`
#[derive(Serialize)]
pub struct OidcExchangeRequest<'a> {
    pub identity: &'a str,
    pub token: &'a str,
}

impl std::fmt::Debug for OidcExchangeRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcExchangeRequest")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
