//! folio-offline - Offline cache manager for the portfolio site
//!
//! Drives the cache worker lifecycle against a live origin with a
//! disk-backed cache: install the asset manifest, fetch through the
//! cache-first policy, inspect and clear buckets.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use folio_offline::cache::{CacheStorage, DiskStorage};
use folio_offline::cli::{parse_method, Cli, CliError, Command};
use folio_offline::config::WorkerConfig;
use folio_offline::host::{HostHandle, RegisterReport, WorkerHost};
use folio_offline::http::{Request, Response};
use folio_offline::network::{HttpNetwork, Network};
use folio_offline::worker::{FetchOutcome, ResponseSource};

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: bool) {
    // RUST_LOG wins; otherwise warn, or debug with --verbose
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Prints an install/activate summary
fn print_register_report(report: &RegisterReport) {
    let install = &report.install;
    println!(
        "Installed {}: {} cached, {} failed",
        install.bucket,
        install.cached.len(),
        install.failed.len()
    );
    for (url, reason) in &install.failed {
        println!("  failed  {} ({})", url, reason);
    }

    match &report.activation {
        Some(activation) => {
            println!(
                "Activated {} (removed {} stale bucket{})",
                activation.bucket,
                activation.deleted.len(),
                if activation.deleted.len() == 1 { "" } else { "s" }
            );
            for bucket in &activation.failed {
                println!("  could not remove {}", bucket);
            }
        }
        None => println!("Waiting for open clients to close before activating"),
    }
}

/// Prints one line per fetched response
fn print_response(label: &str, response: &Response, request: &Request) {
    println!(
        "{} {:<11} {:>8} bytes  {}",
        response.status,
        label,
        response.body.len(),
        request.url
    );
}

fn source_label(source: ResponseSource) -> &'static str {
    match source {
        ResponseSource::Cache => "cache",
        ResponseSource::Network => "network",
        ResponseSource::Fallback => "fallback",
    }
}

async fn run_install(
    handle: &HostHandle,
    config: WorkerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = handle.register(config).await?;
    print_register_report(&report);
    Ok(())
}

async fn run_fetch(
    handle: &HostHandle,
    network: &HttpNetwork,
    config: WorkerConfig,
    paths: &[String],
    method: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let method = parse_method(method)?;
    let scope = config.scope_url()?;

    if let Some(report) = handle.resume(config).await? {
        print_register_report(&report);
    }

    for path in paths {
        let url = scope
            .join(path)
            .map_err(|_| CliError::InvalidPath(path.clone()))?;
        let request = Request::new(method.clone(), url);

        match handle.fetch(request.clone()).await? {
            FetchOutcome::Respond { response, source } => {
                print_response(source_label(source), &response, &request);
            }
            FetchOutcome::Passthrough => match network.fetch(&request).await {
                Ok(response) => print_response("passthrough", &response, &request),
                Err(e) => println!("--- passthrough failed: {}  {}", e, request.url),
            },
        }
    }
    Ok(())
}

async fn run_status(
    storage: &DiskStorage,
    config: &WorkerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let names = storage.bucket_names().await?;
    if names.is_empty() {
        println!("No cache buckets in {}", storage.root().display());
        return Ok(());
    }

    let current = config.cache_name();
    for name in names {
        let entries = storage.entries(&name).await?;
        let newest = entries.iter().map(|e| e.cached_at).max();
        let marker = if name == current {
            "*"
        } else if config.owns_bucket(&name) {
            "stale"
        } else {
            ""
        };
        println!(
            "{:<5} {:<28} {:>5} entries  {}",
            marker,
            name,
            entries.len(),
            newest
                .map(|t| format!("updated {}", t.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_clear(
    storage: &DiskStorage,
    config: &WorkerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut removed = 0;
    for name in storage.bucket_names().await? {
        if config.owns_bucket(&name) && storage.delete_bucket(&name).await? {
            println!("Removed {}", name);
            removed += 1;
        }
    }
    if removed == 0 {
        println!("Nothing to remove");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.worker_config()?;
    let storage = Arc::new(cli.storage()?);
    info!(bucket = %config.cache_name(), root = %storage.root().display(), "Starting");

    match &cli.command {
        Command::Status => return run_status(&storage, &config).await,
        Command::Clear => return run_clear(&storage, &config).await,
        Command::Install | Command::Fetch { .. } => {}
    }

    let origin = config.origin_url()?;
    let network = Arc::new(match cli.timeout() {
        Some(timeout) => HttpNetwork::with_timeout(origin, timeout)?,
        None => HttpNetwork::new(origin),
    });
    let handle = HostHandle::spawn(WorkerHost::new(storage.clone(), network.clone()));

    let result = match &cli.command {
        Command::Fetch { paths, method } => {
            run_fetch(&handle, &network, config, paths, method).await
        }
        _ => run_install(&handle, config).await,
    };

    handle.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
