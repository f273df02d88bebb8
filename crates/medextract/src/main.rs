//! medextract - Main entry point

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use medextract::layout::{OutputLayout, RUN_LOG_PREFIX};
use medextract::{Cli, Commands, ConfigLayer, ExtractionSession, RunSummary, StatusReport};
use medextract_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::io::IsTerminal;
use std::path::Path;
use std::process;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    let layer = match cli.config_layer() {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    // The run log lives in the output directory when one is known
    let guard = init_run_logging(cli.verbose, layer.output_dir.as_deref());

    if let Err(e) = execute_command(&cli, layer).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        drop(guard);
        process::exit(1);
    }
}

fn init_run_logging(verbose: bool, output_dir: Option<&Path>) -> Option<WorkerGuard> {
    let level = if verbose { LogLevel::Debug } else { LogLevel::Info };
    let mut builder = LogConfig::builder()
        .level(level)
        .log_file_prefix(RUN_LOG_PREFIX);
    builder = match output_dir {
        Some(dir) => builder.output(LogOutput::Both).log_dir(dir),
        None => builder.output(LogOutput::Console),
    };
    let log_config = builder.build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} logging disabled: {}", "Warning:".yellow().bold(), e);
            None
        }
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, layer: ConfigLayer) -> anyhow::Result<()> {
    let show_progress = !cli.verbose && std::io::stderr().is_terminal();

    match cli.command {
        Commands::Run => {
            let config = layer.resolve().context("Incomplete configuration")?;
            let session = ExtractionSession::new(config)
                .context("Invalid configuration")?
                .with_progress(show_progress);
            let summary = session.run().await.context("Extraction run failed")?;
            print_run_summary(&summary, session.layout());
        }

        Commands::Discover => {
            let config = layer.resolve().context("Incomplete configuration")?;
            let session = ExtractionSession::new(config)
                .context("Invalid configuration")?
                .with_progress(show_progress);
            let list = session.discover().await.context("Discovery failed")?;
            println!("{}", "Discovered work items".green().bold());
            for (category, count) in list.counts() {
                println!("  {:<12} {}", category.to_string(), count);
            }
            println!("  {:<12} {}", "total".bold(), list.len());
            println!(
                "Snapshot: {}",
                session.layout().snapshot_path().display().to_string().cyan()
            );
        }

        Commands::Merge => {
            let layout = output_layout(&layer)?;
            let summary = medextract::merge::merge_batches(&layout.meta_dir(), &layout.catalog_path())
                .context("Merge failed")?;
            println!(
                "{} {} rows from {} batches into {}",
                "Merged".green().bold(),
                summary.rows,
                summary.batches,
                layout.catalog_path().display().to_string().cyan()
            );
        }

        Commands::Status => {
            let layout = output_layout(&layer)?;
            let status = StatusReport::collect(&layout).context("Cannot read output directory")?;
            print_status(&status, &layout);
        }
    }

    Ok(())
}

fn output_layout(layer: &ConfigLayer) -> anyhow::Result<OutputLayout> {
    let output = layer
        .output_dir
        .as_ref()
        .context("Output directory is required (--output or MEDEXTRACT_OUTPUT)")?;
    Ok(OutputLayout::new(output))
}

fn print_run_summary(summary: &RunSummary, layout: &OutputLayout) {
    println!("{}", "Extraction complete".green().bold());
    println!("  Run:        {}", summary.run_id);
    println!("  Discovered: {}", summary.discovered);
    if summary.dropped > 0 {
        println!("  Filtered:   {}", summary.dropped);
    }
    println!("  Resumed:    {}", summary.pruned);
    println!("  Written:    {} rows in {} batches", summary.batches.rows, summary.batches.batch_ids.len());
    if summary.failed > 0 {
        println!("  Failed:     {}", summary.failed.to_string().yellow());
    }
    if summary.skipped > 0 {
        println!("  Skipped:    {}", summary.skipped);
    }
    println!(
        "  Catalog:    {} ({} rows)",
        layout.catalog_path().display().to_string().cyan(),
        summary.catalog.rows
    );
}

fn print_status(status: &StatusReport, layout: &OutputLayout) {
    println!("{} {}", "Output:".bold(), layout.root().display());
    match &status.snapshot {
        Some(counts) => {
            println!("{}", "Snapshot".bold());
            for (category, count) in counts {
                println!("  {:<12} {}", category.to_string(), count);
            }
        }
        None => println!("{}", "No snapshot; the next run will discover".yellow()),
    }
    println!("Batches:       {}", status.batches);
    println!("Rows:          {}", status.rows);
    println!("Next batch id: {}", status.next_batch_id);
    if let Some(remaining) = status.remaining() {
        println!("Remaining:     {}", remaining);
    }
    let catalog = if status.catalog_present { "present".green() } else { "missing".yellow() };
    println!("Catalog:       {}", catalog);
}
