//! CLI entry point for the archive fetcher.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use archive_fetcher::crawl::ResourceFilter;
use archive_fetcher::download::{HttpClient, RetryPolicy, RetryingFetcher};
use archive_fetcher::identity::{IdentityRotator, NoRotation, TorControl};
use archive_fetcher::{DownloadCoordinator, OutputLayout, Pipeline, RunMode, load_entries};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;
mod config;
mod progress;

use cli::Args;
use config::{Settings, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_config(args.config.as_deref())?;
    if let Some((path, _)) = &file_config {
        info!(path = %path.display(), "loaded config file");
    }
    let settings = Settings::resolve(&args, file_config.as_ref().map(|(_, config)| config))?;
    debug!(?settings, "resolved settings");

    let entries = load_entries(&settings.input)
        .await
        .with_context(|| format!("Failed to load entries from '{}'", settings.input.display()))?;
    info!(
        entries = entries.len(),
        mode = %settings.mode,
        transport = %settings.transport,
        "archive fetcher starting"
    );

    let client = HttpClient::new(settings.transport.clone())
        .with_context(|| format!("Failed to build HTTP client for {}", settings.transport))?;
    let fetcher = RetryingFetcher::new(
        Arc::new(client),
        RetryPolicy::with_max_retries(settings.max_retries),
    );

    let coordinator = DownloadCoordinator::new(fetcher, OutputLayout::new(&settings.output_dir))
        .with_archive_base(settings.archive_base.clone())
        .with_filter(ResourceFilter::new(settings.allowed_domains.clone()))
        .with_rotator(build_rotator(&settings), settings.rotate_every);

    let pipeline = Pipeline::new(Arc::new(coordinator), settings.mode, settings.concurrency)?;

    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let (progress_handle, progress_stop) =
        progress::spawn_progress_ui(use_spinner, pipeline.stats(), entries.len(), settings.mode);

    let run_result = pipeline.run(entries).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle
        && let Err(e) = handle.await
    {
        warn!(error = %e, "progress task panicked");
    }

    let summary = run_result?;
    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            total = summary.total,
            "some entries could not be saved"
        );
    }
    info!(
        completed = summary.completed,
        failed = summary.failed,
        total = summary.total,
        resources = summary.resources_saved,
        "done"
    );

    Ok(())
}

/// Tor control rotation applies to proxied concurrent runs only.
fn build_rotator(settings: &Settings) -> Arc<dyn IdentityRotator> {
    if settings.mode == RunMode::Sequential
        || !settings.transport.is_proxied()
        || settings.rotate_every == 0
    {
        debug!("identity rotation disabled");
        return Arc::new(NoRotation);
    }
    debug!(
        control_addr = %settings.control_addr,
        rotate_every = settings.rotate_every,
        "identity rotation enabled"
    );
    Arc::new(
        TorControl::new(settings.control_addr.clone(), settings.control_auth.clone())
            .with_settle(settings.settle),
    )
}
