//! Error types for the entity delivery core

use crate::models::{CompressionType, HttpMethod};
use thiserror::Error;

/// Result type alias for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types that can occur while preparing or transmitting an entity
///
/// Malformed request headers are not errors: range and conditional
/// evaluation report them as data. Only conditions that abort the response
/// are surfaced here.
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    #[error("Unsupported recompression: entity stored as {stored}, requested {requested}")]
    UnsupportedRecompression {
        stored: CompressionType,
        requested: CompressionType,
    },

    #[error("Unsupported recompression: byte ranges of a {0} encoded entity cannot be served")]
    CompressedRange(CompressionType),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(HttpMethod),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Transmission timed out: {0}")]
    Timeout(String),

    #[error("Transmission cancelled")]
    Cancelled,
}

impl From<std::io::Error> for DeliveryError {
    fn from(err: std::io::Error) -> Self {
        DeliveryError::IoError(err.to_string())
    }
}

impl DeliveryError {
    /// Whether this error comes from a negotiation the core refuses to serve
    ///
    /// Returns true for recompression of a stored-compressed entity (whole or
    /// ranged) and for body requests with a method other than GET or HEAD.
    /// Everything else is an I/O, configuration or deadline failure.
    pub fn is_fatal_negotiation(&self) -> bool {
        match self {
            DeliveryError::UnsupportedRecompression { .. } => true,
            DeliveryError::CompressedRange(_) => true,
            DeliveryError::UnsupportedMethod(_) => true,

            DeliveryError::ConfigError(_) => false,
            DeliveryError::InvalidHeader(_) => false,
            DeliveryError::IoError(_) => false,
            DeliveryError::Timeout(_) => false,
            DeliveryError::Cancelled => false,
        }
    }

    /// Whether the transmission was stopped by its deadline or cancel flag
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DeliveryError::Timeout(_) | DeliveryError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_negotiation_classes() {
        let error = DeliveryError::UnsupportedRecompression {
            stored: CompressionType::GZip,
            requested: CompressionType::Deflate,
        };
        assert!(error.is_fatal_negotiation());
        assert!(DeliveryError::CompressedRange(CompressionType::GZip).is_fatal_negotiation());
        assert!(DeliveryError::UnsupportedMethod(HttpMethod::Post).is_fatal_negotiation());
        assert!(!DeliveryError::IoError("broken pipe".to_string()).is_fatal_negotiation());
    }

    #[test]
    fn test_error_messages() {
        let error = DeliveryError::UnsupportedRecompression {
            stored: CompressionType::GZip,
            requested: CompressionType::None,
        };
        assert_eq!(
            error.to_string(),
            "Unsupported recompression: entity stored as gzip, requested identity"
        );
        assert_eq!(
            DeliveryError::UnsupportedMethod(HttpMethod::Options).to_string(),
            "Unsupported method: OPTIONS"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away");
        let error: DeliveryError = io.into();
        assert!(matches!(error, DeliveryError::IoError(ref msg) if msg.contains("peer went away")));
        assert!(!error.is_interrupted());
        assert!(DeliveryError::Cancelled.is_interrupted());
    }
}
