//! Auth provider errors.

use thiserror::Error;

use crate::provider::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("DopplerSecret must set exactly one of 'tokenSecret' or 'identity', found {0}")]
    InvalidAuthMode(&'static str),
    #[error("Unable to fetch token secret: {0}")]
    TokenSecretFetch(#[source] kube::Error),
    #[error("Token secret cannot contain both 'serviceToken' and 'identity' fields - use one or the other")]
    ConflictingTokenFields,
    #[error("Token secret must contain either 'serviceToken' or 'identity' field")]
    MissingTokenFields,
    #[error("Token secret does not contain 'serviceToken' field")]
    MissingServiceToken,
    #[error("expirationSeconds specified in both DopplerSecret spec and tokenSecret - use one or the other")]
    ConflictingExpiration,
    #[error("Unable to get operator namespace")]
    UnknownOperatorNamespace,
    #[error("Failed to create service account token: {0}")]
    ServiceAccountToken(#[source] kube::Error),
    #[error("Failed to create service account token: response did not include a token")]
    EmptyServiceAccountToken,
    #[error("Failed to exchange token with Doppler: {0}")]
    Exchange(#[source] ApiError),
}

impl AuthError {
    /// Errors that only a change to the resource or its token secret can fix
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAuthMode(_)
                | Self::ConflictingTokenFields
                | Self::MissingTokenFields
                | Self::MissingServiceToken
                | Self::ConflictingExpiration
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_rate_limited())
    }
}
