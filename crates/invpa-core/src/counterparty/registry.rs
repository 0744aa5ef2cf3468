//! The set of distinct counterparties seen during a run.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::CounterpartyMatcher;
use crate::error::MatchError;
use crate::models::invoice::Counterparty;
use crate::models::report::Resolution;

/// A registered counterparty and the file it was first seen in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub source_file: String,

    #[serde(flatten)]
    pub counterparty: Counterparty,
}

/// Outcome of resolving one extracted counterparty.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The registry's view of the entity, id included.
    pub counterparty: Counterparty,
    pub resolution: Resolution,
    /// Set when matching failed and the entity was registered blind.
    pub warning: Option<String>,
}

/// Counterparties keyed by id, in registration order.
#[derive(Debug, Clone, Default)]
pub struct CounterpartyRegistry {
    entries: Vec<RegistryEntry>,
}

impl CounterpartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.counterparty.id.as_deref() == Some(id))
    }

    /// Snapshot of the counterparties, for matching.
    pub fn counterparties(&self) -> Vec<Counterparty> {
        self.entries.iter().map(|e| e.counterparty.clone()).collect()
    }

    /// Add a new entity under a fresh id and return it as stored.
    pub fn register(&mut self, source_file: &str, mut counterparty: Counterparty) -> Counterparty {
        counterparty.id = Some(Uuid::new_v4().to_string());
        self.entries.push(RegistryEntry {
            source_file: source_file.to_string(),
            counterparty: counterparty.clone(),
        });
        counterparty
    }

    /// Replace the stored entity carrying the same id.
    ///
    /// Returns false when no entry has that id.
    pub fn update(&mut self, counterparty: Counterparty) -> bool {
        let Some(id) = counterparty.id.clone() else {
            return false;
        };

        match self
            .entries
            .iter_mut()
            .find(|e| e.counterparty.id.as_ref() == Some(&id))
        {
            Some(entry) => {
                entry.counterparty = counterparty;
                true
            }
            None => false,
        }
    }

    /// Match `candidate` against the registry, then merge or register it.
    ///
    /// A recoverable matching failure registers the candidate as new and
    /// reports a warning. An inconsistent match answer leaves the registry
    /// untouched and is returned as an error.
    pub async fn resolve(
        &mut self,
        matcher: &CounterpartyMatcher,
        source_file: &str,
        candidate: Counterparty,
    ) -> Result<Resolved, MatchError> {
        let known = self.counterparties();

        match matcher.find_match(&known, &candidate).await {
            Ok(Some(merged)) => {
                if !self.update(merged.clone()) {
                    // find_match only returns ids taken from `known`
                    return Err(MatchError::Inconsistency {
                        matched_id: merged.id.unwrap_or_default(),
                    });
                }
                Ok(Resolved {
                    counterparty: merged,
                    resolution: Resolution::Matched,
                    warning: None,
                })
            }
            Ok(None) => {
                let stored = self.register(source_file, candidate);
                info!("Registered new counterparty '{}'", stored.name);
                Ok(Resolved {
                    counterparty: stored,
                    resolution: Resolution::Registered,
                    warning: None,
                })
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Could not match counterparty '{}' from {}, registering as new: {}",
                    candidate.name, source_file, e
                );
                let warning = format!(
                    "counterparty '{}' registered without matching: {}",
                    candidate.name, e
                );
                let stored = self.register(source_file, candidate);
                Ok(Resolved {
                    counterparty: stored,
                    resolution: Resolution::RegisteredUnmatched,
                    warning: Some(warning),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// A registry shared by every worker of a run.
///
/// The lock is held for the whole of a resolution, match call included, so
/// two observations of a new entity can never both be registered.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<CounterpartyRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: CounterpartyRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub async fn resolve(
        &self,
        matcher: &CounterpartyMatcher,
        source_file: &str,
        candidate: Counterparty,
    ) -> Result<Resolved, MatchError> {
        let mut registry = self.inner.lock().await;
        registry.resolve(matcher, source_file, candidate).await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Copy of the current entries.
    pub async fn snapshot(&self) -> Vec<RegistryEntry> {
        self.inner.lock().await.entries().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invpa_inference::{InferenceError, ScriptedBackend};
    use pretty_assertions::assert_eq;

    fn matcher(backend: ScriptedBackend) -> (Arc<ScriptedBackend>, CounterpartyMatcher) {
        let backend = Arc::new(backend);
        (backend.clone(), CounterpartyMatcher::new(backend))
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut registry = CounterpartyRegistry::new();
        let a = registry.register("a.pdf", Counterparty::new("A", "", "", ""));
        let b = registry.register("b.pdf", Counterparty::new("B", "", "", ""));

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(a.id.as_deref().unwrap()).is_ok());
        assert_eq!(registry.get(a.id.as_deref().unwrap()).unwrap().source_file, "a.pdf");
    }

    #[test]
    fn test_update_requires_known_id() {
        let mut registry = CounterpartyRegistry::new();
        let mut stored = registry.register("a.pdf", Counterparty::new("A", "", "", ""));
        stored.vat = "X1".to_string();
        assert!(registry.update(stored.clone()));
        assert_eq!(registry.entries()[0].counterparty.vat, "X1");

        stored.id = Some("other".to_string());
        assert!(!registry.update(stored));
    }

    #[tokio::test]
    async fn test_resolve_registers_then_matches() {
        let (backend, matcher) = matcher(ScriptedBackend::new());
        let mut registry = CounterpartyRegistry::new();

        let first = registry
            .resolve(&matcher, "a.pdf", Counterparty::new("ACME", "", "PL", "Warszawa"))
            .await
            .unwrap();
        assert_eq!(first.resolution, Resolution::Registered);
        assert_eq!(backend.call_count(), 0);

        let id = first.counterparty.id.clone().unwrap();
        let (_, matcher) = self::matcher(
            ScriptedBackend::new()
                .answer(format!(r#"{{"match_found": true, "matched_id": "{id}"}}"#)),
        );
        let observed = Counterparty {
            email: Some("biuro@acme.pl".to_string()),
            ..Counterparty::new("ACME S.A.", "PL1", "Poland", "elsewhere")
        };
        let second = registry.resolve(&matcher, "b.pdf", observed).await.unwrap();

        assert_eq!(second.resolution, Resolution::Matched);
        assert_eq!(registry.len(), 1);
        let entry = &registry.entries()[0];
        assert_eq!(entry.source_file, "a.pdf");
        assert_eq!(entry.counterparty.name, "ACME");
        assert_eq!(entry.counterparty.vat, "PL1");
        assert_eq!(entry.counterparty.email.as_deref(), Some("biuro@acme.pl"));
    }

    #[tokio::test]
    async fn test_resolve_unavailable_registers_new() {
        let (_, matcher) =
            matcher(ScriptedBackend::new().fail(|| InferenceError::Transport("down".into())));
        let mut registry = CounterpartyRegistry::new();
        registry.register("a.pdf", Counterparty::new("A", "", "", ""));

        let resolved = registry
            .resolve(&matcher, "b.pdf", Counterparty::new("B", "", "", ""))
            .await
            .unwrap();

        assert_eq!(resolved.resolution, Resolution::RegisteredUnmatched);
        assert!(resolved.warning.is_some());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_inconsistency_leaves_registry_alone() {
        let (_, matcher) = matcher(
            ScriptedBackend::new().answer(r#"{"match_found": true, "matched_id": "ghost"}"#),
        );
        let mut registry = CounterpartyRegistry::new();
        registry.register("a.pdf", Counterparty::new("A", "", "", ""));
        let before = registry.entries().to_vec();

        let result = registry
            .resolve(&matcher, "b.pdf", Counterparty::new("B", "", "", ""))
            .await;

        assert!(matches!(result, Err(MatchError::Inconsistency { .. })));
        assert_eq!(registry.entries(), &before[..]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_registry_serializes_resolution() {
        // The first resolution sees an empty registry and makes no call.
        let mut script = ScriptedBackend::new();
        for _ in 0..8 {
            script = script.answer(r#"{"match_found": false, "matched_id": ""}"#);
        }
        let (backend, matcher) = matcher(script);
        let matcher = Arc::new(matcher);
        let registry = SharedRegistry::default();

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let matcher = matcher.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .resolve(&matcher, "x.pdf", Counterparty::new(format!("C{i}"), "", "", ""))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.len().await, 8);
        assert_eq!(backend.call_count(), 7);
    }
}
