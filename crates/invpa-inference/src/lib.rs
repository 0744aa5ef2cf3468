//! Multimodal inference abstraction layer for invpa.
//!
//! This crate provides a unified interface for asking a vision-capable chat
//! model questions about page images:
//! - `OpenAiBackend` speaks the OpenAI-compatible chat completions protocol
//! - `ScriptedBackend` replays canned answers for tests and dry runs

mod backend;
mod error;
mod message;

pub use backend::{complete_within, InferenceBackend, ScriptedBackend};
pub use error::InferenceError;
pub use message::{sniff_mime_type, ContentPart, ImageDetail, InferenceRequest};

#[cfg(feature = "openai")]
pub use backend::openai::OpenAiBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
