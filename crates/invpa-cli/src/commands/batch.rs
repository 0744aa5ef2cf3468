//! Batch processing command for multiple documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use invpa_core::render::is_supported_file;
use invpa_core::{BatchReport, DocumentStatus, RegistryEntry};

use super::{build_pipeline, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input directory or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long, default_value = "invpa-output")]
    output_dir: PathBuf,

    /// Also write invoices.csv and counterparties.csv
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.pipeline.workers = jobs;
    }

    let files = collect_inputs(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No supported documents found for: {}", args.input);
    }

    let pipeline = Arc::new(build_pipeline(&config)?);

    println!(
        "{} Found {} documents, processing with {} workers",
        style("ℹ").blue(),
        files.len(),
        pipeline.workers()
    );

    fs::create_dir_all(&args.output_dir)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let progress = pb.clone();
    let batch = pipeline
        .process_batch(files, shutdown_signal(), move |report| {
            progress.set_message(report.source_file.clone());
            progress.inc(1);
        })
        .await;

    pb.finish_with_message("Complete");

    let report_path = args.output_dir.join("report.json");
    let json = if args.pretty {
        serde_json::to_string_pretty(&batch)?
    } else {
        serde_json::to_string(&batch)?
    };
    fs::write(&report_path, json)?;
    debug!("Wrote batch report to {}", report_path.display());

    if args.summary {
        let invoices_path = args.output_dir.join("invoices.csv");
        write_invoices_csv(&invoices_path, &batch)?;

        let counterparties_path = args.output_dir.join("counterparties.csv");
        write_counterparties_csv(&counterparties_path, &batch.counterparties)?;

        println!(
            "{} Summaries written to {} and {}",
            style("✓").green(),
            invoices_path.display(),
            counterparties_path.display()
        );
    }

    let (successful, partial, failed) = batch.status_counts();

    println!();
    println!(
        "{} Processed {} documents in {:?}, report at {}",
        style("✓").green(),
        batch.documents.len(),
        start.elapsed(),
        report_path.display()
    );
    println!(
        "   {} successful, {} partial, {} failed; {} invoices, {} counterparties",
        style(successful).green(),
        style(partial).yellow(),
        style(failed).red(),
        batch.invoice_count(),
        batch.counterparties.len()
    );

    if !batch.orphaned_counterparties.is_empty() {
        println!(
            "   {} {} counterparties come only from failed documents",
            style("!").yellow(),
            batch.orphaned_counterparties.len()
        );
    }

    let problems: Vec<_> = batch
        .documents
        .iter()
        .filter(|d| d.status != DocumentStatus::Success)
        .collect();

    if !problems.is_empty() {
        println!();
        println!("{}", style("Documents with errors:").red());
        for document in problems {
            for error in &document.errors {
                println!(
                    "  - {} [{}]: {}",
                    document.source_file, error.stage, error.message
                );
            }
        }
    }

    if failed == batch.documents.len() {
        anyhow::bail!("All {} documents failed", failed);
    }

    Ok(())
}

/// Expand a directory or glob pattern into supported documents, sorted.
fn collect_inputs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let path = Path::new(input);

    let mut files: Vec<PathBuf> = if path.is_dir() {
        fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_supported_file(p))
            .collect()
    } else {
        glob(input)?
            .filter_map(|r| r.ok())
            .filter(|p| is_supported_file(p))
            .collect()
    };

    files.sort();
    Ok(files)
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => eprintln!("{} Interrupted, stopping workers", style("!").yellow()),
        Err(e) => {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn write_invoices_csv(path: &Path, batch: &BatchReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "source_file",
        "group",
        "pages",
        "type",
        "number",
        "date",
        "total_amount",
        "tax_amount",
        "purpose",
        "counterparty_id",
        "counterparty_name",
        "counterparty_vat",
        "resolution",
    ])?;

    for document in &batch.documents {
        for extracted in &document.invoices {
            let invoice = &extracted.invoice;
            let pages = extracted
                .pages
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" ");

            wtr.write_record([
                document.source_file.as_str(),
                &extracted.group,
                &pages,
                &invoice.document_type.code().to_string(),
                &invoice.number,
                &invoice.date.to_string(),
                &invoice.total_amount.to_string(),
                &invoice.tax_amount.to_string(),
                &invoice.purpose,
                invoice.counterparty.id.as_deref().unwrap_or(""),
                &invoice.counterparty.name,
                &invoice.counterparty.vat,
                &serde_json::to_value(extracted.resolution)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

fn write_counterparties_csv(path: &Path, entries: &[RegistryEntry]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "id",
        "name",
        "vat",
        "country",
        "address",
        "swift",
        "iban",
        "phone",
        "fax",
        "email",
        "website",
        "first_seen_in",
    ])?;

    for entry in entries {
        let c = &entry.counterparty;
        wtr.write_record([
            c.id.as_deref().unwrap_or(""),
            &c.name,
            &c.vat,
            &c.country,
            &c.address,
            c.swift.as_deref().unwrap_or(""),
            c.iban.as_deref().unwrap_or(""),
            c.phone.as_deref().unwrap_or(""),
            c.fax.as_deref().unwrap_or(""),
            c.email.as_deref().unwrap_or(""),
            c.website.as_deref().unwrap_or(""),
            &entry.source_file,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
