use anyhow::{Context, Result};
use clap::Parser;
use replitrace::aggregator::{Aggregator, AnalysisContext};
use replitrace::catalog::{CaptureCatalog, DirectoryCatalog};
use replitrace::cli::{AnalyzeArgs, Cli, Command, OutputFormat};
use replitrace::config::AnalysisConfig;
use replitrace::event_stream::NdjsonDecoder;
use replitrace::messages::CaptureId;
use replitrace::report::ReplicationReport;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings always, everything on --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn open_catalog(dir: &Path) -> Result<DirectoryCatalog> {
    DirectoryCatalog::open(dir)
        .with_context(|| format!("Failed to open capture catalog: {}", dir.display()))
}

fn list_captures(dir: &Path) -> Result<()> {
    let catalog = open_catalog(dir)?;
    println!("{:<8} {:<28} FILE", "ID", "CREATED");
    for info in catalog.captures() {
        let file = catalog
            .path_of(info.id)
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        println!("{:<8} {:<28} {}", info.id.0, info.created_at.to_rfc3339(), file);
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_toml(path)?,
        None => AnalysisConfig::default(),
    };
    if args.drain_peers {
        config.drain_peer_captures = true;
    }
    if let Some(tolerance) = args.tolerance {
        config.discovery_tolerance_secs = tolerance;
    }
    config.validate()?;

    let catalog = open_catalog(&args.catalog)?;
    let main_capture = CaptureId(args.main);
    if catalog.capture_info_by_id(main_capture).is_none() {
        anyhow::bail!(
            "Capture {} not found in {}",
            main_capture,
            args.catalog.display()
        );
    }

    let context = AnalysisContext::new(Arc::new(catalog), Arc::new(NdjsonDecoder));
    let mut aggregator = Aggregator::new(config, context, main_capture);
    aggregator
        .run_main_capture()
        .with_context(|| format!("Failed to analyze capture {}", main_capture))?;
    aggregator.settle();

    let report = {
        let query = aggregator.query();
        ReplicationReport::build(
            &query,
            main_capture,
            aggregator.worker_stats(),
            aggregator.stats().clone(),
        )
    };
    aggregator.stop();

    match args.format {
        OutputFormat::Text => print!("{}", report.to_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    match args.command {
        Command::Analyze(analyze_args) => analyze(analyze_args),
        Command::List { catalog } => list_captures(&catalog),
    }
}
