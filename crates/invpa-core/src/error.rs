//! Error types for the invpa-core library.

use invpa_inference::InferenceError;
use thiserror::Error;

/// Main error type for the invpa library.
#[derive(Error, Debug)]
pub enum InvpaError {
    /// The file extension is not one the pipeline can read.
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Page rendering error.
    #[error("render failure: {0}")]
    Render(#[from] RenderError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The batch was shut down before this document finished.
    #[error("processing cancelled")]
    Cancelled,
}

/// Errors related to turning a document into page images.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The external renderer could not be started.
    #[error("{tool} is not available (install poppler-utils): {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// The external renderer exited unsuccessfully.
    #[error("{tool} exited with {status}: {output}")]
    ToolFailed {
        tool: String,
        status: String,
        output: String,
    },

    /// Rendering finished but produced no pages.
    #[error("document produced no pages")]
    NoPages,

    /// Reading the document or rendered pages failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking render task died.
    #[error("render worker failed: {0}")]
    Worker(String),
}

/// Errors related to grouping pages into invoices.
#[derive(Error, Debug)]
pub enum GroupingError {
    /// The grouping call failed.
    #[error("grouping request failed: {0}")]
    Request(#[source] InferenceError),

    /// The answer was not a mapping of identifiers to page ordinals.
    #[error("failed to parse grouping answer: {reason}. Answer: {answer}")]
    Parse { reason: String, answer: String },

    /// The answer contained no non-empty group.
    #[error("grouping answer contained no groups")]
    Empty,

    /// The answer referenced a page the document does not have.
    #[error("grouping answer references page {ordinal} but the document has {page_count} pages")]
    OrdinalOutOfRange { ordinal: i64, page_count: usize },
}

/// Errors related to extracting one invoice from its pages.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No pages were selected for extraction.
    #[error("no pages to analyze")]
    NoPages,

    /// The extraction call failed.
    #[error("extraction request failed: {0}")]
    Request(#[source] InferenceError),

    /// The answer could not be parsed into an invoice.
    #[error("failed to parse extraction answer: {reason}. Answer: {answer}")]
    Parse { reason: String, answer: String },

    /// A parsed field violates its constraints.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors related to counterparty matching.
#[derive(Error, Debug)]
pub enum MatchError {
    /// The service claimed a match with an id that is not in the registry.
    #[error("match answer names unknown registry id '{matched_id}'")]
    Inconsistency { matched_id: String },

    /// The match could not be decided (transport or parse failure).
    #[error("matching unavailable: {0}")]
    Unavailable(String),
}

impl MatchError {
    /// Whether the caller may continue by treating the counterparty as new.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MatchError::Unavailable(_))
    }
}

/// Result type for the invpa library.
pub type Result<T> = std::result::Result<T, InvpaError>;
