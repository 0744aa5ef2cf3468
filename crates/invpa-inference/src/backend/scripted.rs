//! Backend that replays queued answers instead of calling a service.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::{InferenceBackend, InferenceError, InferenceRequest, Result};

/// A scripted answer, optionally tied to a request containing `needle`.
struct Rule {
    needle: Option<String>,
    answer: Answer,
}

enum Answer {
    Text(String),
    Error(fn() -> InferenceError),
    Slow(Duration, String),
}

/// Backend that answers from a script and records every request it sees.
///
/// Rules with a needle answer the first request whose text parts contain the
/// needle; rules without one answer in queue order. A request nothing
/// answers fails with [`InferenceError::EmptyResponse`].
#[derive(Default)]
pub struct ScriptedBackend {
    rules: Mutex<VecDeque<Rule>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedBackend {
    /// Create a backend with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next request.
    pub fn answer(self, text: impl Into<String>) -> Self {
        self.push(None, Answer::Text(text.into()))
    }

    /// Queue an answer for the next request mentioning `needle`.
    pub fn answer_when(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Some(needle.into()), Answer::Text(text.into()))
    }

    /// Queue a failure for the next request.
    pub fn fail(self, error: fn() -> InferenceError) -> Self {
        self.push(None, Answer::Error(error))
    }

    /// Queue a failure for the next request mentioning `needle`.
    pub fn fail_when(self, needle: impl Into<String>, error: fn() -> InferenceError) -> Self {
        self.push(Some(needle.into()), Answer::Error(error))
    }

    /// Queue an answer that only arrives after `delay`.
    pub fn answer_after(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(None, Answer::Slow(delay, text.into()))
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn push(self, needle: Option<String>, answer: Answer) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push_back(Rule { needle, answer });
        }
        self
    }

    fn take_answer(&self, request: &InferenceRequest) -> Option<Answer> {
        let mut rules = self.rules.lock().ok()?;
        let position = rules.iter().position(|rule| match &rule.needle {
            Some(needle) => request.texts().any(|t| t.contains(needle.as_str())),
            None => false,
        });
        let position = position.or_else(|| rules.iter().position(|rule| rule.needle.is_none()))?;
        rules.remove(position).map(|rule| rule.answer)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let answer = self.take_answer(request);
        trace!("Scripted backend answering request with {} parts", request.parts.len());

        match answer {
            Some(Answer::Text(text)) => Ok(text),
            Some(Answer::Error(make)) => Err(make()),
            Some(Answer::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(InferenceError::EmptyResponse),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
