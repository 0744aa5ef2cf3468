//! OpenAI-compatible chat completions backend.
//!
//! Works against api.openai.com and any service exposing the same
//! `/chat/completions` contract with image inputs.
//!
//! Rate limiting:
//! - 429, 5xx and transport failures are retried with exponential backoff
//! - A `Retry-After` header, when present, overrides the computed delay

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::{sniff_mime_type, ContentPart};
use crate::{InferenceBackend, InferenceError, InferenceRequest, Result};

/// Default service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default vision-capable model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Base delay for exponential backoff.
const BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound for a single backoff wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Backend calling an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiBackend {
    /// Create a backend for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(InferenceError::MissingApiKey(
                "set api.api_key in the config file or OPENAI_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(Duration::from_secs(120))?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
        })
    }

    /// Set the endpoint base URL (without the `/chat/completions` suffix).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set how often a rate-limited or failed request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the transport timeout for a single HTTP exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        self.client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let body = build_chat_request(&self.model, request);
        debug!(
            "Sending {} parts ({} images) to {}",
            request.parts.len(),
            request.image_count(),
            self.model
        );

        let mut attempt = 0;
        loop {
            let error = match self.send_once(&body).await {
                Ok(response) => match read_answer(response, attempt).await {
                    Ok(text) => return parse_chat_response(&text),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.max_retries {
                return Err(error);
            }

            let wait = match &error {
                InferenceError::RateLimited {
                    retry_after_secs: Some(secs),
                    ..
                } => Duration::from_secs(*secs).min(MAX_BACKOFF),
                _ => backoff_delay(attempt, BACKOFF_BASE_MS),
            };
            warn!(
                "Inference call failed (attempt {}): {}, waiting {:?}",
                attempt + 1,
                error,
                wait
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| InferenceError::ClientBuild(e.to_string()))
}

fn build_chat_request<'a>(model: &'a str, request: &InferenceRequest) -> ChatRequest<'a> {
    let content = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => ChatContent::Text { text: text.clone() },
            ContentPart::Image { data, detail } => ChatContent::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(data),
                    detail: detail.as_str(),
                },
            },
        })
        .collect();

    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        temperature: 0.0,
        response_format: request
            .json_response
            .then_some(ResponseFormat { r#type: "json_object" }),
    }
}

fn data_url(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    format!("data:{};base64,{}", sniff_mime_type(data), encoded)
}

fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::Decode(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(InferenceError::Api(error.message));
    }

    response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(InferenceError::EmptyResponse)
}

/// The body of a successful response, or the error its status maps to.
async fn read_answer(response: reqwest::Response, attempt: u32) -> Result<String> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if response.status().is_success() {
        return response
            .text()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after.as_deref(), attempt, body))
}

fn status_error(status: u16, retry_after: Option<&str>, attempt: u32, body: String) -> InferenceError {
    if status == 429 {
        InferenceError::RateLimited {
            attempts: attempt + 1,
            retry_after_secs: parse_retry_after(retry_after).map(|d| d.as_secs()),
        }
    } else {
        InferenceError::Status { status, body }
    }
}

/// Exponential backoff: `base_ms * 2^attempt`, capped.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Parse a `Retry-After` value given in whole seconds.
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
}
