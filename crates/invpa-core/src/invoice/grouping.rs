//! Partitioning a document's pages into invoices.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use invpa_inference::{complete_within, ImageDetail, InferenceBackend, InferenceRequest};
use tracing::{debug, warn};

use super::answer::{excerpt, parse_json};
use super::prompts::{grouping_instruction, page_marker};
use super::DEFAULT_CALL_TIMEOUT;
use crate::error::GroupingError;
use crate::models::page::{PageGroups, PageImage};

/// Result of grouping, after the single-invoice fallback has been applied.
#[derive(Debug)]
pub struct GroupingOutcome {
    pub groups: PageGroups,

    /// Why grouping fell back to one invoice, if it did.
    pub degraded: Option<GroupingError>,

    /// Pages the grouping answer did not assign to any invoice.
    pub unassigned: Vec<usize>,
}

/// Asks the inference service which pages belong to which invoice.
pub struct InvoiceGrouper {
    backend: Arc<dyn InferenceBackend>,
    call_timeout: Duration,
}

impl InvoiceGrouper {
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

    /// One request holding every page, each preceded by its marker.
    ///
    /// Pages go at low detail; telling documents apart needs no fine print.
    pub fn build_request(pages: &[PageImage]) -> InferenceRequest {
        let mut request = InferenceRequest::json().with_text(grouping_instruction());
        for page in pages {
            request.push_text(page_marker(page.ordinal));
            request.push_image(Arc::clone(&page.data), ImageDetail::Low);
        }
        request
    }

    /// Group pages, failing on any problem with the answer.
    pub async fn try_group(&self, pages: &[PageImage]) -> Result<PageGroups, GroupingError> {
        let request = Self::build_request(pages);
        let answer = complete_within(self.backend.as_ref(), &request, self.call_timeout)
            .await
            .map_err(GroupingError::Request)?;

        parse_groups(&answer, pages.len())
    }

    /// Group pages, treating the whole document as one invoice when grouping fails.
    pub async fn group(&self, pages: &[PageImage]) -> GroupingOutcome {
        match self.try_group(pages).await {
            Ok(groups) => {
                let unassigned = unassigned_pages(&groups, pages.len());
                if !unassigned.is_empty() {
                    warn!("Grouping left pages {:?} without an invoice", unassigned);
                }
                debug!("Grouped {} pages into {} invoices", pages.len(), groups.len());
                GroupingOutcome {
                    groups,
                    degraded: None,
                    unassigned,
                }
            }
            Err(e) => {
                warn!("Page grouping failed, treating document as a single invoice: {}", e);
                GroupingOutcome {
                    groups: PageGroups::single(pages.len()),
                    degraded: Some(e),
                    unassigned: Vec::new(),
                }
            }
        }
    }
}

/// Parse a `{identifier: [ordinal, ...]}` answer for a `page_count`-page document.
fn parse_groups(answer: &str, page_count: usize) -> Result<PageGroups, GroupingError> {
    let raw: BTreeMap<String, Vec<i64>> =
        parse_json(answer).map_err(|reason| GroupingError::Parse {
            reason,
            answer: excerpt(answer),
        })?;

    let mut groups = BTreeMap::new();
    for (token, ordinals) in raw {
        let pages = ordinals
            .into_iter()
            .map(|ordinal| {
                usize::try_from(ordinal)
                    .ok()
                    .filter(|&o| o < page_count)
                    .ok_or(GroupingError::OrdinalOutOfRange { ordinal, page_count })
            })
            .collect::<Result<Vec<_>, _>>()?;
        groups.insert(token, pages);
    }

    let groups = PageGroups::from_map(groups);
    if groups.is_empty() {
        return Err(GroupingError::Empty);
    }
    Ok(groups)
}

fn unassigned_pages(groups: &PageGroups, page_count: usize) -> Vec<usize> {
    let assigned: BTreeSet<usize> = groups.iter().flat_map(|g| g.pages.iter().copied()).collect();
    (0..page_count).filter(|p| !assigned.contains(p)).collect()
}
