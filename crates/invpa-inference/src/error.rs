//! Error types for the inference layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the inference service.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// No credential was supplied for the service.
    #[error("missing API key: {0}")]
    MissingApiKey(String),

    /// The HTTP client could not be built.
    #[error("failed to create client: {0}")]
    ClientBuild(String),

    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Still rate limited after exhausting retries.
    #[error("rate limited after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        retry_after_secs: Option<u64>,
    },

    /// The service reported an error object in an otherwise valid envelope.
    #[error("service error: {0}")]
    Api(String),

    /// The envelope contained no usable answer.
    #[error("service returned no answer")]
    EmptyResponse,

    /// The response envelope could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The call did not finish within the allotted time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_)
            | InferenceError::RateLimited { .. }
            | InferenceError::Timeout(_) => true,
            InferenceError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
