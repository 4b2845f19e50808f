//! Ingest Error Types

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures that abort processing of a single delivery.
///
/// Duplicate, stale, and unknown-type deliveries are *not* errors; they
/// are modeled as outcomes and acknowledged with success so the sender
/// does not retry them.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Signature verification failed
    #[error("signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// Request body is not a valid event envelope
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Storage layer rejected or lost the operation
    #[error("storage error: {0}")]
    Storage(String),

    /// A storage call exceeded its deadline
    #[error("downstream timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// Whether the sender's retry schedule can help.
    ///
    /// Signature failures are terminal: redelivering an unauthenticated
    /// payload can never succeed. Everything else is answered with a
    /// server error so the sender redelivers on its backoff schedule.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestError::Signature(_) | IngestError::Config(_))
    }

    /// Whether this failure should be surfaced as a distinct operator alert.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            IngestError::Signature(_) | IngestError::MalformedPayload(_)
        )
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Other(err.to_string())
    }
}

/// Distinct signature verification failure conditions.
///
/// Each condition is reported separately rather than collapsed into a
/// single "invalid" result; a missing header and a bad secret need very
/// different operator responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature header absent from the request
    #[error("signature header missing")]
    MissingSignature,

    /// Signature present but not valid hex
    #[error("signature is not valid hex: {0}")]
    MalformedSignature(String),

    /// No signing secret configured
    #[error("signing secret not configured")]
    MissingSecret,

    /// Computed HMAC does not match the received signature
    #[error("signature mismatch")]
    InvalidSignature,
}
