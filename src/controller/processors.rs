//! # Processors
//!
//! Value transformations applied to each downloaded secret before it is stored.
//!
//! Processors are selected by the `type` of a [`SecretProcessor`](crate::crd::SecretProcessor).
//! An unknown type fails the whole sync and nothing is written.

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Failed to process data with unknown processor: {0}")]
    UnknownProcessor(String),
    #[error("Failed to decode base64 string: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Supported processors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    /// UTF-8 bytes of the value, unchanged
    Plain,
    /// Standard (padded) base64 decode
    Base64,
}

impl Processor {
    /// Look up a processor by its type tag
    pub fn from_type(processor_type: &str) -> Result<Self, ProcessorError> {
        match processor_type {
            "plain" => Ok(Self::Plain),
            "base64" => Ok(Self::Base64),
            other => Err(ProcessorError::UnknownProcessor(other.to_string())),
        }
    }

    pub fn process(self, value: &str) -> Result<Vec<u8>, ProcessorError> {
        match self {
            Self::Plain => Ok(value.as_bytes().to_vec()),
            Self::Base64 => Ok(general_purpose::STANDARD.decode(value)?),
        }
    }
}

/// Run the processor named by `processor_type` over `value`
pub fn process(processor_type: &str, value: &str) -> Result<Vec<u8>, ProcessorError> {
    Processor::from_type(processor_type)?.process(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_passes_through() {
        assert_eq!(process("plain", "héllo wörld").unwrap(), "héllo wörld".as_bytes());
        assert_eq!(process("plain", "").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_base64_decodes() {
        assert_eq!(process("base64", "c2VjcmV0").unwrap(), b"secret");

        let binary = [0u8, 159, 146, 150, 255];
        let encoded = general_purpose::STANDARD.encode(binary);
        assert_eq!(process("base64", &encoded).unwrap(), binary);
    }

    #[test]
    fn test_base64_rejects_malformed_input() {
        let err = process("base64", "not-base64!!").unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidBase64(_)));
    }

    #[test]
    fn test_unknown_processor() {
        let err = process("rot13", "value").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to process data with unknown processor: rot13"
        );
    }
}
