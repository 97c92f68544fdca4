//! Common error types for SubmitVault.

use thiserror::Error;

/// Top-level error type for submission operations.
///
/// Messages never carry key material or IV values; they may end up in the
/// server log but are not returned to HTTP clients except for `Validation`.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed input from the caller.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or unusable process configuration (e.g. no secret).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Encryption failed, or the plaintext source broke mid-stream.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Ciphertext did not authenticate or is malformed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the failure was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(format!("Invalid record encoding: {}", err))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
