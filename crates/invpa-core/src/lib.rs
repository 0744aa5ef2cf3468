//! Core library for invoice extraction from scanned documents.
//!
//! This crate provides:
//! - Page rendering (PDF via poppler, raster images as-is)
//! - Grouping of pages into invoices with a multimodal model
//! - Page selection and structured invoice extraction
//! - Counterparty deduplication against a shared registry
//! - A batch pipeline tying the stages together

pub mod counterparty;
pub mod error;
pub mod invoice;
pub mod models;
pub mod pipeline;
pub mod render;

pub use counterparty::{CounterpartyMatcher, CounterpartyRegistry, RegistryEntry, SharedRegistry};
pub use error::{
    ExtractionError, GroupingError, InvpaError, MatchError, RenderError, Result,
};
pub use invoice::{select_pages, GroupingOutcome, InvoiceExtractor, InvoiceGrouper};
pub use models::config::InvpaConfig;
pub use models::invoice::{CompanyIdentity, Counterparty, DocumentType, Invoice};
pub use models::page::{InvoiceGroup, PageGroups, PageImage, SINGLE_INVOICE_GROUP};
pub use models::report::{
    BatchReport, DocumentReport, DocumentStatus, ExtractedInvoice, Resolution, Stage, StageError,
};
pub use pipeline::Pipeline;
pub use render::{DocumentKind, PageRenderer, PopplerRenderer};

/// Re-export inference types.
pub use invpa_inference::{InferenceBackend, InferenceError, ScriptedBackend};

#[cfg(feature = "openai")]
pub use invpa_inference::OpenAiBackend;
