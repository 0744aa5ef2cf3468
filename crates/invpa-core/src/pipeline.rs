//! Driving documents through rendering, grouping, extraction and matching.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use invpa_inference::InferenceBackend;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::counterparty::{CounterpartyMatcher, SharedRegistry};
use crate::error::{InvpaError, RenderError};
use crate::invoice::{select_pages, InvoiceExtractor, InvoiceGrouper};
use crate::models::config::InvpaConfig;
use crate::models::invoice::CompanyIdentity;
use crate::models::page::{InvoiceGroup, PageImage};
use crate::models::report::{BatchReport, DocumentReport, ExtractedInvoice, Stage, StageError};
use crate::render::{PageRenderer, PopplerRenderer};

/// Output of one invoice group that made it through matching.
struct GroupResult {
    invoice: ExtractedInvoice,
    warnings: Vec<String>,
}

/// Processes documents into invoices with deduplicated counterparties.
///
/// One pipeline owns one counterparty registry, so every document it
/// processes contributes to the same set of entities.
pub struct Pipeline {
    renderer: Arc<dyn PageRenderer>,
    grouper: InvoiceGrouper,
    extractor: InvoiceExtractor,
    matcher: CounterpartyMatcher,
    registry: SharedRegistry,
    workers: usize,
    group_concurrency: usize,
}

impl Pipeline {
    /// Create a pipeline with default concurrency and timeouts.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        backend: Arc<dyn InferenceBackend>,
        company: CompanyIdentity,
    ) -> Self {
        Self {
            renderer,
            grouper: InvoiceGrouper::new(Arc::clone(&backend)),
            extractor: InvoiceExtractor::new(Arc::clone(&backend), company),
            matcher: CounterpartyMatcher::new(backend),
            registry: SharedRegistry::default(),
            workers: 4,
            group_concurrency: 2,
        }
    }

    /// Create a pipeline rendering with poppler, set up from `config`.
    pub fn from_config(config: &InvpaConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let renderer = PopplerRenderer::new(config.render.pdftoppm_path.clone(), config.render.dpi);

        Self::new(Arc::new(renderer), backend, config.company.clone())
            .with_workers(config.pipeline.workers)
            .with_group_concurrency(config.pipeline.group_concurrency)
            .with_call_timeout(Duration::from_secs(config.pipeline.call_timeout_secs))
    }

    /// Number of documents processed at the same time in a batch.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Number of invoices of one document extracted at the same time.
    pub fn with_group_concurrency(mut self, group_concurrency: usize) -> Self {
        self.group_concurrency = group_concurrency.max(1);
        self
    }

    /// Upper bound for every inference call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.grouper = self.grouper.with_call_timeout(timeout);
        self.extractor = self.extractor.with_call_timeout(timeout);
        self.matcher = self.matcher.with_call_timeout(timeout);
        self
    }

    /// Start from an existing registry instead of an empty one.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process one document into a report. Never fails as a whole; every
    /// problem is recorded in the report.
    pub async fn process_document(&self, path: &Path) -> DocumentReport {
        let source = path.display().to_string();
        let span = info_span!("document", file = %source);
        self.run_document(path, source).instrument(span).await
    }

    async fn run_document(&self, path: &Path, source: String) -> DocumentReport {
        let start = Instant::now();
        let mut report = DocumentReport::new(source);

        debug!(stage = %Stage::Rendering, "Rendering document");
        let pages = match self.render(path).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Rendering failed: {}", e);
                report.errors.push(StageError::new(Stage::Rendering, None, &e));
                report.finish(elapsed_ms(start));
                return report;
            }
        };
        report.page_count = pages.len();

        debug!(stage = %Stage::Grouping, "Grouping {} pages", pages.len());
        let outcome = self.grouper.group(&pages).await;
        if let Some(reason) = &outcome.degraded {
            report.grouping_degraded = true;
            report
                .warnings
                .push(format!("pages read as a single invoice: {reason}"));
        }
        if !outcome.unassigned.is_empty() {
            report.warnings.push(format!(
                "pages {:?} were not assigned to any invoice",
                outcome.unassigned
            ));
        }

        let source = report.source_file.clone();
        let (source, pages) = (source.as_str(), pages.as_slice());
        let results: Vec<_> = stream::iter(outcome.groups.into_groups())
            .map(move |group| self.process_group(source, pages, group))
            .buffered(self.group_concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(group) => {
                    report.warnings.extend(group.warnings);
                    report.invoices.push(group.invoice);
                }
                Err(e) => report.errors.push(e),
            }
        }

        report.finish(elapsed_ms(start));
        info!(
            "Finished with {} invoices, {} errors in {} ms",
            report.invoices.len(),
            report.errors.len(),
            report.elapsed_ms
        );
        report
    }

    async fn render(&self, path: &Path) -> crate::Result<Vec<PageImage>> {
        let renderer = Arc::clone(&self.renderer);
        let owned = path.to_path_buf();

        let mut pages = tokio::task::spawn_blocking(move || renderer.render(&owned))
            .await
            .map_err(|e| InvpaError::Render(RenderError::Worker(e.to_string())))??;

        if pages.is_empty() {
            return Err(RenderError::NoPages.into());
        }
        for (ordinal, page) in pages.iter_mut().enumerate() {
            page.ordinal = ordinal;
        }
        Ok(pages)
    }

    async fn process_group(
        &self,
        source: &str,
        pages: &[PageImage],
        group: InvoiceGroup,
    ) -> Result<GroupResult, StageError> {
        let token = group.token.as_str();

        let analyzed = select_pages(&group.pages);
        trace!(stage = %Stage::Selecting, group = token, "Analyzing pages {:?} of {:?}", analyzed, group.pages);
        let images: Vec<&PageImage> = analyzed.iter().filter_map(|&o| pages.get(o)).collect();

        let mut invoice = self.extractor.extract(&images).await.map_err(|e| {
            warn!("Extraction failed for group {}: {}", token, e);
            StageError::new(Stage::Extracting, Some(token), &e)
        })?;

        let mut warnings: Vec<String> = invoice
            .validate()
            .into_iter()
            .map(|issue| format!("{token}: {issue}"))
            .collect();

        debug!(stage = %Stage::Matching, group = token, "Resolving counterparty '{}'", invoice.counterparty.name);
        let resolved = self
            .registry
            .resolve(&self.matcher, source, invoice.counterparty.clone())
            .await
            .map_err(|e| {
                warn!("Matching failed for group {}: {}", token, e);
                StageError::new(Stage::Matching, Some(token), &e)
            })?;

        invoice.counterparty = resolved.counterparty;
        warnings.extend(resolved.warning);

        Ok(GroupResult {
            invoice: ExtractedInvoice {
                group: group.token.clone(),
                pages: group.pages.clone(),
                analyzed_pages: analyzed,
                resolution: resolved.resolution,
                invoice,
            },
            warnings,
        })
    }

    /// Process many documents concurrently, at most `workers` at a time.
    ///
    /// One document failing never stops the others. When `shutdown`
    /// completes, unfinished documents are aborted and reported as failed.
    /// `on_report` sees each report as soon as its document is done.
    /// Reports come back in input order. Counterparties an aborted document
    /// already registered stay in the registry and are listed as orphaned.
    pub async fn process_batch<F, P>(
        self: Arc<Self>,
        paths: Vec<PathBuf>,
        shutdown: F,
        mut on_report: P,
    ) -> BatchReport
    where
        F: Future<Output = ()>,
        P: FnMut(&DocumentReport),
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, (usize, String)> = HashMap::new();

        info!("Processing {} documents with {} workers", paths.len(), self.workers);

        for (index, path) in paths.into_iter().enumerate() {
            let pipeline = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let source = path.display().to_string();

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return DocumentReport::failed(
                            path.display().to_string(),
                            StageError::new(Stage::Failed, None, InvpaError::Cancelled),
                        );
                    }
                };
                pipeline.process_document(&path).await
            });
            pending.insert(handle.id(), (index, source));
        }

        let mut documents = Vec::with_capacity(pending.len());
        let mut cancelled = false;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    Some(result) => {
                        let (index, report) = joined_report(result, &mut pending);
                        on_report(&report);
                        documents.push((index, report));
                    }
                    None => break,
                },
                _ = &mut shutdown, if !cancelled => {
                    warn!("Shutdown requested, cancelling {} unfinished documents", pending.len());
                    cancelled = true;
                    tasks.abort_all();
                }
            }
        }

        documents.sort_by_key(|(index, _)| *index);

        let batch = BatchReport::new(
            documents.into_iter().map(|(_, report)| report).collect(),
            self.registry.snapshot().await,
        );
        if !batch.orphaned_counterparties.is_empty() {
            warn!(
                "{} counterparties were registered by documents that failed: {:?}",
                batch.orphaned_counterparties.len(),
                batch.orphaned_counterparties
            );
        }
        batch
    }
}

/// Turn a finished worker into its report, whether it completed, was
/// aborted or panicked.
fn joined_report(
    result: Result<(Id, DocumentReport), JoinError>,
    pending: &mut HashMap<Id, (usize, String)>,
) -> (usize, DocumentReport) {
    match result {
        Ok((id, report)) => {
            let index = pending.remove(&id).map_or(usize::MAX, |(index, _)| index);
            (index, report)
        }
        Err(e) => {
            let (index, source) = pending.remove(&e.id()).unwrap_or((usize::MAX, String::new()));
            let message = if e.is_cancelled() {
                InvpaError::Cancelled.to_string()
            } else {
                format!("worker panicked: {e}")
            };
            warn!("{}: {}", source, message);
            (index, DocumentReport::failed(source, StageError::new(Stage::Failed, None, message)))
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
