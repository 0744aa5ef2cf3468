//! Inference backend implementations.

#[cfg(feature = "openai")]
pub mod openai;

mod scripted;

pub use scripted::ScriptedBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::{InferenceError, InferenceRequest, Result};

/// Trait for multimodal inference backends.
///
/// This trait abstracts over the service that actually looks at the page
/// images, so the pipeline can run against a hosted model in production and
/// against canned answers in tests.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send the request and return the text of the first answer.
    ///
    /// # Arguments
    /// * `request` - Ordered text and image parts
    ///
    /// # Returns
    /// The raw answer text, which is JSON when `request.json_response` is set
    async fn complete(&self, request: &InferenceRequest) -> Result<String>;

    /// Name of the model answering the requests.
    fn model(&self) -> &str;
}

/// Run one call against `backend`, giving up after `timeout`.
pub async fn complete_within(
    backend: &dyn InferenceBackend,
    request: &InferenceRequest,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, backend.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(InferenceError::Timeout(timeout)),
    }
}
