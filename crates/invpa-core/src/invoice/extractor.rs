//! Reading one invoice from its selected pages.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use invpa_inference::{complete_within, ImageDetail, InferenceBackend, InferenceRequest};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::answer::{excerpt, parse_json};
use super::prompts::extraction_instruction;
use super::DEFAULT_CALL_TIMEOUT;
use crate::error::ExtractionError;
use crate::models::invoice::{CompanyIdentity, Invoice};
use crate::models::page::PageImage;

/// Extracts structured invoice fields from page images.
pub struct InvoiceExtractor {
    backend: Arc<dyn InferenceBackend>,
    company: CompanyIdentity,
    call_timeout: Duration,
}

impl InvoiceExtractor {
    /// Create an extractor that excludes `company` when picking the counterparty.
    pub fn new(backend: Arc<dyn InferenceBackend>, company: CompanyIdentity) -> Self {
        Self {
            backend,
            company,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The instruction followed by every page at high detail.
    pub fn build_request(&self, pages: &[&PageImage]) -> InferenceRequest {
        let mut request = InferenceRequest::json().with_text(extraction_instruction(&self.company));
        for page in pages {
            request.push_image(Arc::clone(&page.data), ImageDetail::High);
        }
        request
    }

    /// Extract the invoice the given pages belong to.
    pub async fn extract(&self, pages: &[&PageImage]) -> Result<Invoice, ExtractionError> {
        if pages.is_empty() {
            return Err(ExtractionError::NoPages);
        }

        let request = self.build_request(pages);
        let answer = complete_within(self.backend.as_ref(), &request, self.call_timeout)
            .await
            .map_err(ExtractionError::Request)?;

        let invoice = parse_invoice(&answer)?;
        debug!(
            "Extracted invoice {} dated {} from {} pages",
            invoice.number,
            invoice.date,
            pages.len()
        );
        Ok(invoice)
    }
}

/// Parse and check an extraction answer.
fn parse_invoice(answer: &str) -> Result<Invoice, ExtractionError> {
    let parse_error = |reason: String| ExtractionError::Parse {
        reason,
        answer: excerpt(answer),
    };

    let value: Value = parse_json(answer).map_err(parse_error)?;
    check_field(&value, "type", "must be 1 or 2", |v| {
        matches!(v.as_u64(), Some(1 | 2))
    })?;
    check_field(&value, "date", "must be a YYYY-MM-DD calendar date", |v| {
        v.as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
    })?;

    let mut invoice: Invoice =
        serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;

    if invoice.tax_amount < Decimal::ZERO {
        return Err(ExtractionError::InvalidField {
            field: "tax_amount".to_string(),
            reason: format!("must not be negative, got {}", invoice.tax_amount),
        });
    }

    invoice.number = invoice.number.trim().to_string();
    invoice.purpose = invoice.purpose.trim().to_string();
    invoice.counterparty.id = None;
    invoice.counterparty.normalize();

    Ok(invoice)
}

fn check_field(
    value: &Value,
    field: &str,
    rule: &str,
    is_valid: impl Fn(&Value) -> bool,
) -> Result<(), ExtractionError> {
    let found = value.get(field).unwrap_or(&Value::Null);
    if is_valid(found) {
        return Ok(());
    }
    Err(ExtractionError::InvalidField {
        field: field.to_string(),
        reason: format!("{rule}, got {found}"),
    })
}
