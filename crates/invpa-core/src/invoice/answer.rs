//! Cleanup of structured answers returned by the inference service.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Longest answer excerpt kept in error messages.
pub const MAX_EXCERPT_CHARS: usize = 500;

lazy_static! {
    /// A whole answer wrapped in a markdown code fence, with optional language tag.
    static ref CODE_FENCE: Regex = Regex::new(
        r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$"
    ).unwrap();
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(answer: &str) -> &str {
    match CODE_FENCE.captures(answer).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => answer.trim(),
    }
}

/// Parse a JSON answer, tolerating a code fence around it.
///
/// On failure returns the parser message.
pub fn parse_json<T: DeserializeOwned>(answer: &str) -> Result<T, String> {
    serde_json::from_str(strip_code_fences(answer)).map_err(|e| e.to_string())
}

/// Shorten an answer for inclusion in an error message.
pub fn excerpt(answer: &str) -> String {
    let trimmed = answer.trim();
    match trimmed.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
