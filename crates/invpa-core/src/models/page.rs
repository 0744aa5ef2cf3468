//! Rendered pages and invoice page groups.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

/// Group identifier used when the whole document is treated as one invoice.
pub const SINGLE_INVOICE_GROUP: &str = "single_invoice";

/// One rendered page of a document.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Zero-based position in the document.
    pub ordinal: usize,

    /// Encoded image bytes (PNG or JPEG).
    pub data: Arc<[u8]>,
}

impl PageImage {
    pub fn new(ordinal: usize, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            ordinal,
            data: data.into(),
        }
    }
}

/// Pages that belong to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceGroup {
    /// Opaque identifier chosen by the grouping step.
    pub token: String,

    /// Sorted, de-duplicated page ordinals.
    pub pages: Vec<usize>,
}

/// A document partitioned into invoices.
///
/// Groups are ordered by their lowest page ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageGroups {
    groups: Vec<InvoiceGroup>,
}

impl PageGroups {
    /// Build from a token to pages mapping, dropping empty groups.
    pub fn from_map(map: BTreeMap<String, Vec<usize>>) -> Self {
        let mut groups: Vec<InvoiceGroup> = map
            .into_iter()
            .filter_map(|(token, mut pages)| {
                pages.sort_unstable();
                pages.dedup();
                (!pages.is_empty()).then_some(InvoiceGroup { token, pages })
            })
            .collect();

        groups.sort_by(|a, b| a.pages[0].cmp(&b.pages[0]).then_with(|| a.token.cmp(&b.token)));
        Self { groups }
    }

    /// Every page of a `page_count`-page document in one group.
    pub fn single(page_count: usize) -> Self {
        Self {
            groups: vec![InvoiceGroup {
                token: SINGLE_INVOICE_GROUP.to_string(),
                pages: (0..page_count).collect(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InvoiceGroup> {
        self.groups.iter()
    }

    pub fn into_groups(self) -> Vec<InvoiceGroup> {
        self.groups
    }
}
