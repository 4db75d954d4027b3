//! Crate-wide error type
//!
//! Configuration problems are reported synchronously at setup; transport
//! failures are surfaced by the stream collaborator and end a running worker.

use crate::stream::transport::TransportError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StreamstaffError>;

#[derive(Error, Debug)]
pub enum StreamstaffError {
    /// Invalid channel selection, unsupported method or filter kind,
    /// inconsistent welch parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No input stream matched the resolve query
    #[error("No stream found with {property}='{value}'")]
    NotFound { property: String, value: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A chunk did not match the column count the receiver was built for
    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("FFT processing failed: {0}")]
    Fft(String),
}

impl StreamstaffError {
    /// Shorthand for building a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        StreamstaffError::Configuration(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StreamstaffError::Configuration(_))
    }
}

impl From<realfft::FftError> for StreamstaffError {
    fn from(value: realfft::FftError) -> Self {
        StreamstaffError::Fft(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StreamstaffError::NotFound {
            property: "type".into(),
            value: "EEG".into(),
        };
        assert_eq!(err.to_string(), "No stream found with type='EEG'");

        let err = StreamstaffError::config("unsupported method 'bogus'");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: StreamstaffError = TransportError::StreamClosed.into();
        assert!(matches!(err, StreamstaffError::Transport(TransportError::StreamClosed)));
        assert!(!err.is_configuration());
    }
}
