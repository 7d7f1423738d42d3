//! Static service token auth.
//!
//! The token is read from the referenced Secret on every call so rotations are
//! picked up without restarting the controller.

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::auth::AuthError;
use crate::constants::SERVICE_TOKEN_KEY;
use crate::provider::ApiContext;

#[derive(Clone)]
pub struct ServiceTokenProvider {
    client: Client,
    secret_name: String,
    secret_namespace: String,
    host: String,
    verify_tls: bool,
}

impl fmt::Debug for ServiceTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTokenProvider")
            .field("secret", &format!("{}/{}", self.secret_namespace, self.secret_name))
            .field("host", &self.host)
            .field("verify_tls", &self.verify_tls)
            .finish_non_exhaustive()
    }
}

impl ServiceTokenProvider {
    pub fn new(
        client: Client,
        secret_name: String,
        secret_namespace: String,
        host: String,
        verify_tls: bool,
    ) -> Self {
        Self {
            client,
            secret_name,
            secret_namespace,
            host,
            verify_tls,
        }
    }

    pub async fn acquire_credential(&self) -> Result<ApiContext, AuthError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.secret_namespace);
        let secret = secrets
            .get(&self.secret_name)
            .await
            .map_err(AuthError::TokenSecretFetch)?;

        let token = secret
            .data
            .as_ref()
            .and_then(|data| data.get(SERVICE_TOKEN_KEY))
            .ok_or(AuthError::MissingServiceToken)?;

        Ok(ApiContext::new(
            self.host.clone(),
            String::from_utf8_lossy(&token.0).into_owned(),
            self.verify_tls,
        ))
    }
}
