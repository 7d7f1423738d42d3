//! Doppler API errors.
//!
//! Messages never include response bodies of successful calls or request
//! credentials; opaque error bodies are summarised by status and size.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or its body could not be read
    #[error("Doppler Error: {message}\n{source}")]
    Request {
        message: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// Error response with a JSON `messages` list
    #[error("Doppler Error: {messages}")]
    Remote { status: u16, messages: String },
    /// Error response without a readable body
    #[error("Doppler Error: Unable to load response\n{status} status code; {bytes} bytes")]
    Status { status: u16, bytes: usize },
    #[error("Doppler Error: {message}\n{source}")]
    Parse {
        message: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// The exchange endpoint answered 200 with `success: false`
    #[error("Doppler Error: OIDC auth failed")]
    ExchangeRejected,
    #[error("Doppler Error: Failed to parse expiration time\n{0}")]
    InvalidExpiry(#[from] chrono::ParseError),
}

impl ApiError {
    pub(crate) fn request(message: &'static str, source: reqwest::Error) -> Self {
        Self::Request { message, source }
    }

    /// HTTP status of an error response, if the remote answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Rate limiting is expected under load and logged below error level
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS.as_u16())
    }
}
