//! Process command - extract the invoices of a single document.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invpa_core::{DocumentReport, DocumentStatus};

use super::{build_pipeline, load_config, require_exists};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON document report
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    require_exists(&args.input)?;
    let pipeline = build_pipeline(&config)?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Reading {}", args.input.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let report = pipeline.process_document(&args.input).await;

    pb.finish_and_clear();

    let output = match args.format {
        OutputFormat::Json if args.pretty => serde_json::to_string_pretty(&report)?,
        OutputFormat::Json => serde_json::to_string(&report)?,
        OutputFormat::Text => format_report_text(&report),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    for warning in &report.warnings {
        eprintln!("{} {}", style("!").yellow(), warning);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if report.status == DocumentStatus::Failed {
        anyhow::bail!("No invoice could be extracted from {}", args.input.display());
    }

    Ok(())
}

/// Human-readable summary of a document report.
pub fn format_report_text(report: &DocumentReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", report.source_file));
    output.push_str(&format!(
        "Status: {:?} ({} pages, {} ms)\n",
        report.status, report.page_count, report.elapsed_ms
    ));
    if report.grouping_degraded {
        output.push_str("Grouping: degraded, read as a single invoice\n");
    }

    for extracted in &report.invoices {
        let invoice = &extracted.invoice;
        output.push('\n');
        output.push_str(&format!(
            "Invoice {} ({}), pages {:?}\n",
            invoice.number, invoice.document_type, extracted.pages
        ));
        output.push_str(&format!("  Date:    {}\n", invoice.date));
        output.push_str(&format!("  Total:   {}\n", invoice.total_amount));
        output.push_str(&format!("  Tax:     {}\n", invoice.tax_amount));
        output.push_str(&format!("  Purpose: {}\n", invoice.purpose));
        output.push_str(&format!(
            "  Counterparty: {} [{}] {}\n",
            invoice.counterparty.name,
            invoice.counterparty.vat,
            invoice.counterparty.country
        ));
    }

    if !report.errors.is_empty() {
        output.push_str("\nErrors:\n");
        for error in &report.errors {
            match &error.group {
                Some(group) => {
                    output.push_str(&format!("  - {} ({}): {}\n", error.stage, group, error.message))
                }
                None => output.push_str(&format!("  - {}: {}\n", error.stage, error.message)),
            }
        }
    }

    output
}
