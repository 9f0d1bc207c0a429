//! Provider error classification.

use clerk_core::Error;

/// Error codes reported by OpenAI-compatible providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication_failed",
            Self::RateLimitExceeded => "rate_limited",
            Self::ModelNotFound => "model_not_found",
            Self::ContextLengthExceeded => "context_too_long",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}

/// Convert a provider error to a clerk error.
///
/// Every provider-side failure is a backend outage from the pipeline's view;
/// the code is kept in the message for the audit trail.
pub fn to_clerk_error(provider: &str, code: OpenAIErrorCode, message: &str) -> Error {
    Error::BackendUnavailable(format!("{} {}: {}", provider, code.as_str(), message))
}
