//! CLI entry point for nspider.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use nspider_core::identifier::is_dataset_id;
use nspider_core::registry::Registry;
use nspider_core::{
    DatasetRecord, Engine, EngineConfig, PublicationId, PublicationRecord, SourceRecord,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::{Args, Command};

/// Exit code when another process holds the registry database.
const EXIT_REGISTRY_BUSY: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = app_config::load_file_config(args.config.as_deref())?.unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(&args, &file_config)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, ?file_config, "CLI arguments parsed");

    let config = engine_config(&args, &file_config);
    info!(working_dir = %config.working_dir.display(), "nspider starting");
    let mut engine = match Engine::open(config).await {
        Ok(engine) => engine,
        Err(e) if e.is_registry_busy() => return Ok(registry_busy(&e)),
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to open the working directory")),
    };

    match args.command {
        Command::Resolve {
            dataset_ids,
            external_ids,
        } => resolve(&mut engine, &dataset_ids, external_ids, args.quiet).await,
        Command::Fetch { identifier, text } => fetch(&mut engine, &identifier, text).await,
        Command::Lookup { identifier, json } => lookup(&engine, &identifier, json),
    }
}

/// Priority: `RUST_LOG` (checked by the caller) > `-q` > `-v` > config verbosity > info.
fn default_level(args: &Args, file_config: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file_config.verbosity.map_or("info", |v| v.filter()),
        1 => "debug",
        _ => "trace",
    }
}

/// CLI flags override file values, which override library defaults.
fn engine_config(args: &Args, file_config: &FileConfig) -> EngineConfig {
    let working_dir = args
        .working_dir
        .clone()
        .or_else(|| file_config.working_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = EngineConfig::new(working_dir);

    if let Some(domain) = args
        .primary_domain
        .clone()
        .or_else(|| file_config.primary_domain.clone())
    {
        config.primary_domain = domain;
    }
    if let Some(ms) = args.poll_interval_ms.or(file_config.poll_interval_ms) {
        config.poll.interval = Duration::from_millis(ms);
    }
    if let Some(limit) = args.poll_limit.or(file_config.poll_limit) {
        config.poll.max_attempts = limit;
    }
    if let Some(ms) = file_config.click_settle_ms {
        config.click_settle = Duration::from_millis(ms);
    }
    if let Some(secs) = file_config.connect_timeout_secs {
        config.timeouts.connect = Duration::from_secs(secs);
    }
    if let Some(secs) = file_config.read_timeout_secs {
        config.timeouts.read = Duration::from_secs(secs);
    }
    config
}

async fn resolve(
    engine: &mut Engine,
    dataset_ids: &[String],
    external_ids: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let progress = progress_bar(dataset_ids.len(), quiet);
    let mut unresolved = 0usize;
    let mut failure = None;

    for dataset_id in dataset_ids {
        progress.set_message(format!("dataset {dataset_id}"));
        let outcome = if external_ids {
            engine.external_id_for_dataset(dataset_id).await
        } else {
            engine.resolve_dataset(dataset_id).await
        };
        match outcome {
            Ok(Some(found)) => progress.suspend(|| println!("{dataset_id}\t{found}")),
            Ok(None) => {
                unresolved += 1;
                progress.suspend(|| println!("{dataset_id}\t-"));
            }
            Err(e) => {
                failure = Some(anyhow::Error::new(e).context(format!("Failed to resolve dataset {dataset_id}")));
                break;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    // Links made before a failure are still worth keeping.
    if let Some(code) = save(engine).await? {
        return Ok(code);
    }
    if let Some(e) = failure {
        return Err(e);
    }

    info!(total = dataset_ids.len(), unresolved, "Resolution complete");
    Ok(if unresolved == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Commits the registry; a busy database maps to its own exit code.
async fn save(engine: &Engine) -> Result<Option<ExitCode>> {
    match engine.commit().await {
        Ok(()) => Ok(None),
        Err(e) if e.is_registry_busy() => Ok(Some(registry_busy(&e))),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to save the registry")),
    }
}

fn registry_busy(e: &nspider_core::EngineError) -> ExitCode {
    error!(error = %e, "Registry database is locked");
    ExitCode::from(EXIT_REGISTRY_BUSY)
}

fn progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] Resolving {msg}...")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

async fn fetch(engine: &mut Engine, identifier: &str, text: bool) -> Result<ExitCode> {
    let result = if text {
        engine.full_text(identifier).await.map(|t| t.map(Output::Text))
    } else {
        engine
            .load_publication(identifier)
            .await
            .map(|p| p.map(Output::Path))
    };
    if let Some(code) = save(engine).await? {
        return Ok(code);
    }

    match result.with_context(|| format!("Failed to fetch {identifier}"))? {
        Some(Output::Path(path)) => println!("{}", path.display()),
        Some(Output::Text(text)) => println!("{text}"),
        None => {
            warn!(identifier, "No stored PDF (unknown, closed access or download failed)");
            return Ok(ExitCode::from(2));
        }
    }
    Ok(ExitCode::SUCCESS)
}

enum Output {
    Path(PathBuf),
    Text(String),
}

#[derive(Debug, Serialize)]
struct LookupView<'a> {
    dataset: Option<&'a DatasetRecord>,
    publication: Option<&'a PublicationRecord>,
    sources: Vec<&'a SourceRecord>,
}

fn lookup_view<'a>(registry: &'a Registry, identifier: &str) -> LookupView<'a> {
    let identifier = identifier.trim();
    let (dataset, publication) = if is_dataset_id(identifier)
        && let Some(found) = registry.lookup_dataset(identifier)
    {
        let publication = found
            .doi
            .as_deref()
            .and_then(|doi| registry.lookup_publication(doi));
        (Some(found), publication)
    } else {
        let publication = match PublicationId::parse(identifier) {
            Some(PublicationId::Doi(doi)) => registry.lookup_publication(&doi),
            Some(PublicationId::ExternalId(external_id)) => {
                registry.lookup_publication_by_external_id(&external_id)
            }
            None => None,
        };
        (
            publication.and_then(|p| registry.lookup_dataset_by_doi(&p.doi)),
            publication,
        )
    };

    let sources = publication.map_or_else(Vec::new, |p| registry.lookup_sources(&p.doi));
    LookupView {
        dataset,
        publication,
        sources,
    }
}

fn lookup(engine: &Engine, identifier: &str, json: bool) -> Result<ExitCode> {
    let view = lookup_view(engine.registry(), identifier);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialize lookup result")?
        );
    } else {
        if let Some(dataset) = view.dataset {
            println!(
                "dataset\t{}\t{}",
                dataset.dataset_id,
                dataset.doi.as_deref().unwrap_or("-")
            );
        }
        if let Some(publication) = view.publication {
            println!(
                "publication\t{}\t{}\t{}\t{}",
                publication.doi,
                publication.external_id,
                publication.download_status,
                publication.title
            );
        }
        for source in &view.sources {
            println!("source\t{}\t{}", source.hosting_domain, source.link);
        }
    }

    if view.dataset.is_none() && view.publication.is_none() {
        warn!(identifier, "Not in the registry");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
