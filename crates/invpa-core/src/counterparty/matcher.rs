//! Deciding whether a counterparty is already known.

use std::sync::Arc;
use std::time::Duration;

use invpa_inference::{complete_within, InferenceBackend, InferenceRequest};
use serde::Deserialize;
use tracing::debug;

use crate::error::MatchError;
use crate::invoice::answer::{excerpt, parse_json};
use crate::invoice::prompts::matching_instruction;
use crate::invoice::DEFAULT_CALL_TIMEOUT;
use crate::models::invoice::Counterparty;

#[derive(Debug, Deserialize)]
struct MatchAnswer {
    match_found: bool,
    #[serde(default)]
    matched_id: Option<String>,
}

/// Asks the inference service to find a counterparty in a list of known ones.
pub struct CounterpartyMatcher {
    backend: Arc<dyn InferenceBackend>,
    call_timeout: Duration,
}

impl CounterpartyMatcher {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Find `candidate` among `known`.
    ///
    /// Returns the known entry merged with `candidate` on a match, `None`
    /// otherwise. An empty `known` list never reaches the service.
    pub async fn find_match(
        &self,
        known: &[Counterparty],
        candidate: &Counterparty,
    ) -> Result<Option<Counterparty>, MatchError> {
        if known.is_empty() {
            return Ok(None);
        }

        let request = build_request(known, candidate)?;
        let answer = complete_within(self.backend.as_ref(), &request, self.call_timeout)
            .await
            .map_err(|e| MatchError::Unavailable(e.to_string()))?;

        let parsed: MatchAnswer = parse_json(&answer).map_err(|reason| {
            MatchError::Unavailable(format!("{reason}. Answer: {}", excerpt(&answer)))
        })?;

        if !parsed.match_found {
            debug!("No registry match for '{}'", candidate.name);
            return Ok(None);
        }

        let matched_id = parsed.matched_id.unwrap_or_default();
        let existing = known
            .iter()
            .find(|c| c.id.as_deref() == Some(matched_id.as_str()))
            .ok_or(MatchError::Inconsistency {
                matched_id: matched_id.clone(),
            })?;

        debug!("'{}' matched registry entry {}", candidate.name, matched_id);
        Ok(Some(existing.merge(candidate)))
    }
}

fn build_request(
    known: &[Counterparty],
    candidate: &Counterparty,
) -> Result<InferenceRequest, MatchError> {
    let known = serde_json::to_string_pretty(known)
        .map_err(|e| MatchError::Unavailable(e.to_string()))?;
    let candidate = serde_json::to_string_pretty(candidate)
        .map_err(|e| MatchError::Unavailable(e.to_string()))?;

    Ok(InferenceRequest::json().with_text(matching_instruction(&known, &candidate)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use invpa_inference::{InferenceError, ScriptedBackend};
    use pretty_assertions::assert_eq;

    fn known() -> Vec<Counterparty> {
        vec![
            Counterparty {
                id: Some("id-1".to_string()),
                ..Counterparty::new("ACME Sp. z o.o.", "", "PL", "Warszawa")
            },
            Counterparty {
                id: Some("id-2".to_string()),
                ..Counterparty::new("Globex", "DE811", "DE", "Berlin")
            },
        ]
    }

    fn candidate() -> Counterparty {
        Counterparty::new("ACME", "PL5250001009", "Poland", "ul. Prosta 1")
    }

    #[tokio::test]
    async fn test_empty_registry_skips_service() {
        let backend = Arc::new(ScriptedBackend::new());
        let matcher = CounterpartyMatcher::new(backend.clone());

        assert_eq!(matcher.find_match(&[], &candidate()).await.unwrap(), None);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_match_merges_into_known_entry() {
        let backend = Arc::new(
            ScriptedBackend::new().answer(r#"{"match_found": true, "matched_id": "id-1"}"#),
        );
        let matcher = CounterpartyMatcher::new(backend.clone());

        let merged = matcher.find_match(&known(), &candidate()).await.unwrap().unwrap();
        assert_eq!(merged.id.as_deref(), Some("id-1"));
        assert_eq!(merged.name, "ACME Sp. z o.o.");
        assert_eq!(merged.vat, "PL5250001009");

        let prompt = backend.requests()[0].texts().collect::<String>();
        assert!(prompt.contains("\"id\": \"id-2\""));
        assert!(prompt.contains("PL5250001009"));
    }

    #[tokio::test]
    async fn test_no_match() {
        let backend = Arc::new(
            ScriptedBackend::new().answer(r#"{"match_found": false, "matched_id": ""}"#),
        );
        let matcher = CounterpartyMatcher::new(backend);
        assert_eq!(matcher.find_match(&known(), &candidate()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_id_is_inconsistency() {
        let backend = Arc::new(
            ScriptedBackend::new().answer(r#"{"match_found": true, "matched_id": "id-9"}"#),
        );
        let matcher = CounterpartyMatcher::new(backend);

        let result = matcher.find_match(&known(), &candidate()).await;
        assert!(matches!(
            result,
            Err(MatchError::Inconsistency { matched_id }) if matched_id == "id-9"
        ));
    }

    #[tokio::test]
    async fn test_failures_are_unavailable() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .fail(|| InferenceError::Transport("refused".into()))
                .answer("maybe?"),
        );
        let matcher = CounterpartyMatcher::new(backend);

        let transport = matcher.find_match(&known(), &candidate()).await.unwrap_err();
        assert!(transport.is_recoverable());

        let parse = matcher.find_match(&known(), &candidate()).await.unwrap_err();
        assert!(matches!(parse, MatchError::Unavailable(_)));
    }
}
