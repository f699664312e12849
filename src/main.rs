use anyhow::{bail, Context, Result};
use bayscraper::{
    config::Config,
    fetch::HttpFetcher,
    runner,
    sources::{Registry, SourceId},
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Scrape county COVID-19 dashboards into one JSON shape.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Counties to scrape (default: every configured county).
    counties: Vec<SourceId>,

    /// Source config file; the built-in one is used otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bayscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // ─── 2) config & registry ────────────────────────────────────────
    let config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::embedded()?.as_ref().clone(),
    };
    let registry = Registry::from_config(&config)?;
    info!(sources = registry.len(), "startup");

    // ─── 3) scrape ───────────────────────────────────────────────────
    let fetcher = HttpFetcher::new()?;
    let report = runner::run(&registry, &args.counties, &fetcher).await?;
    if !report.negative_deltas.is_empty() {
        warn!(
            count = report.negative_deltas.len(),
            "upstream revised running totals downward"
        );
    }

    // ─── 4) emit ─────────────────────────────────────────────────────
    let out = if args.pretty {
        serde_json::to_string_pretty(&report.records)
    } else {
        serde_json::to_string(&report.records)
    }
    .context("serializing records")?;
    println!("{out}");

    if !report.is_success() {
        let failed: Vec<String> = report.failures.iter().map(|f| f.source_id.to_string()).collect();
        bail!("{} of {} counties failed: {}", failed.len(), failed.len() + report.records.len(), failed.join(", "));
    }
    Ok(())
}
