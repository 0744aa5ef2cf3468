//! Invoice grouping, page selection and field extraction.

pub mod answer;
mod extractor;
mod grouping;
pub mod prompts;
mod selection;

pub use extractor::InvoiceExtractor;
pub use grouping::{GroupingOutcome, InvoiceGrouper};
pub use selection::{select_pages, MAX_ANALYZED_PAGES};

use std::time::Duration;

/// Upper bound for one inference call unless configured otherwise.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);
