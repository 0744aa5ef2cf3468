//! Counterparty deduplication.

mod matcher;
mod registry;

pub use matcher::CounterpartyMatcher;
pub use registry::{CounterpartyRegistry, RegistryEntry, Resolved, SharedRegistry};
