//! Per-document and per-batch processing reports.

use std::collections::HashSet;

use serde::Serialize;

use crate::counterparty::RegistryEntry;
use crate::models::invoice::Invoice;

/// Processing stage a document is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rendering,
    Grouping,
    Selecting,
    Extracting,
    Matching,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Rendering => "rendering",
            Stage::Grouping => "grouping",
            Stage::Selecting => "selecting",
            Stage::Extracting => "extracting",
            Stage::Matching => "matching",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Overall outcome of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Every invoice was extracted and matched.
    Success,
    /// Some invoices failed, at least one succeeded.
    Partial,
    /// Nothing usable came out of the document.
    Failed,
}

/// How the counterparty of an invoice was resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Merged into an existing registry entry.
    Matched,
    /// Registered as a new entity.
    Registered,
    /// Registered as new because matching could not be decided.
    RegisteredUnmatched,
}

/// A failure scoped to a stage, and optionally to one invoice group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, group: Option<&str>, error: impl std::fmt::Display) -> Self {
        Self {
            stage,
            group: group.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// One invoice read from a document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedInvoice {
    /// Group identifier from the grouping step.
    pub group: String,

    /// Every page ordinal of the group.
    pub pages: Vec<usize>,

    /// The ordinals actually sent for extraction.
    pub analyzed_pages: Vec<usize>,

    pub resolution: Resolution,

    #[serde(flatten)]
    pub invoice: Invoice,
}

/// Outcome of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub source_file: String,
    pub status: DocumentStatus,
    pub page_count: usize,

    /// True when grouping failed and the document was read as one invoice.
    pub grouping_degraded: bool,

    pub invoices: Vec<ExtractedInvoice>,
    pub errors: Vec<StageError>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

impl DocumentReport {
    /// An empty report for a document about to be processed.
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            status: DocumentStatus::Failed,
            page_count: 0,
            grouping_degraded: false,
            invoices: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// A report for a document that failed as a whole.
    pub fn failed(source_file: impl Into<String>, error: StageError) -> Self {
        let mut report = Self::new(source_file);
        report.errors.push(error);
        report
    }

    /// Derive the status from what was collected.
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
        self.status = match (self.invoices.is_empty(), self.errors.is_empty()) {
            (false, true) => DocumentStatus::Success,
            (false, false) => DocumentStatus::Partial,
            (true, _) => DocumentStatus::Failed,
        };
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,

    /// Final registry contents, with the file each entity was first seen in.
    pub counterparties: Vec<RegistryEntry>,

    /// Ids of registry entries first seen in a document reported as failed.
    ///
    /// A document cancelled after one of its invoices was matched leaves its
    /// counterparty registered while reporting no invoice.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphaned_counterparties: Vec<String>,
}

impl BatchReport {
    pub fn new(documents: Vec<DocumentReport>, counterparties: Vec<RegistryEntry>) -> Self {
        let failed: HashSet<&str> = documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Failed)
            .map(|d| d.source_file.as_str())
            .collect();

        let orphaned_counterparties = counterparties
            .iter()
            .filter(|entry| failed.contains(entry.source_file.as_str()))
            .filter_map(|entry| entry.counterparty.id.clone())
            .collect();

        Self {
            documents,
            counterparties,
            orphaned_counterparties,
        }
    }

    /// Documents per status: (success, partial, failed).
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.documents
            .iter()
            .fold((0, 0, 0), |(s, p, f), doc| match doc.status {
                DocumentStatus::Success => (s + 1, p, f),
                DocumentStatus::Partial => (s, p + 1, f),
                DocumentStatus::Failed => (s, p, f + 1),
            })
    }

    /// Total number of invoices extracted.
    pub fn invoice_count(&self) -> usize {
        self.documents.iter().map(|d| d.invoices.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::Counterparty;

    #[test]
    fn test_status_from_contents() {
        let mut report = DocumentReport::new("a.pdf");
        report.finish(5);
        assert_eq!(report.status, DocumentStatus::Failed);
        assert_eq!(report.elapsed_ms, 5);

        let failed = DocumentReport::failed(
            "b.pdf",
            StageError::new(Stage::Rendering, None, "pdftoppm missing"),
        );
        assert_eq!(failed.errors[0].stage, Stage::Rendering);
        assert_eq!(failed.status, DocumentStatus::Failed);
    }

    #[test]
    fn test_stage_error_serialization() {
        let error = StageError::new(Stage::Extracting, Some("inv-2"), "bad date");
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["stage"], "extracting");
        assert_eq!(value["group"], "inv-2");

        let error = StageError::new(Stage::Failed, None, "cancelled");
        let value = serde_json::to_value(&error).unwrap();
        assert!(value.get("group").is_none());
    }

    fn entry(id: &str, source_file: &str) -> RegistryEntry {
        RegistryEntry {
            source_file: source_file.to_string(),
            counterparty: Counterparty {
                id: Some(id.to_string()),
                ..Counterparty::new(id, "", "PL", "")
            },
        }
    }

    #[test]
    fn test_batch_flags_entries_of_failed_documents() {
        let mut ok = DocumentReport::new("ok.pdf");
        ok.status = DocumentStatus::Success;
        let cancelled = DocumentReport::failed(
            "cut.pdf",
            StageError::new(Stage::Failed, None, "processing cancelled"),
        );

        let batch = BatchReport::new(
            vec![ok, cancelled],
            vec![entry("c-1", "ok.pdf"), entry("c-2", "cut.pdf")],
        );

        assert_eq!(batch.orphaned_counterparties, vec!["c-2".to_string()]);
        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["orphaned_counterparties"][0], "c-2");

        let clean = BatchReport::new(Vec::new(), vec![entry("c-1", "ok.pdf")]);
        assert!(clean.orphaned_counterparties.is_empty());
        assert!(serde_json::to_value(&clean).unwrap().get("orphaned_counterparties").is_none());
    }
}
