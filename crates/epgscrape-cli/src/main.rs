//! epgscrape - schedule page to XMLTV guide generator.

/// Application configuration (defaults, TOML, environment).
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, resolve_config_path};
use epgscrape_core::{
    FileSource, HttpFetcher, LocalPageSource, Pipeline, RunGuard, RunOutcome, RunSummary,
    anchor_date,
};

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Config file (TOML). Defaults to `~/.config/epgscrape/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch the schedule page and write the XMLTV guide once.
    Run(RunArgs),
    /// Show the resolved configuration.
    Config,
}

/// Arguments for the `run` subcommand.
#[derive(clap::Args)]
struct RunArgs {
    /// Read the schedule page from a local HTML file instead of `SOURCE_URL`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Override `OUTPUT_FILE`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Date the page represents (default: today in the source timezone).
    /// Format: "2024-08-01".
    #[arg(long)]
    anchor_date: Option<NaiveDate>,

    /// Build the guide but do not write it.
    #[arg(long)]
    dry_run: bool,
}

/// Loads configuration from the resolved file and the process environment.
fn load_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    let path = resolve_config_path(explicit);
    AppConfig::resolve(path.as_deref(), |key| std::env::var(key).ok())
}

fn log_summary(summary: &RunSummary, message: &str) {
    tracing::info!(
        programmes = summary.programmes,
        extracted = summary.extracted,
        skipped = summary.skipped,
        first_start = ?summary.first_start,
        last_stop = ?summary.last_stop,
        path = %summary.output_file.display(),
        bytes = summary.bytes,
        "{message}"
    );
}

/// Runs one pipeline pass over `source`.
///
/// # Errors
///
/// Returns an error if the run fails.
async fn execute<S: LocalPageSource + Sync>(
    source: S,
    config: &AppConfig,
    anchor: NaiveDate,
    dry_run: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(source, config.to_pipeline_config()?);

    if dry_run {
        let guide = pipeline
            .generate(anchor)
            .await
            .context("pipeline run failed")?;
        log_summary(
            &guide.summary(config.output_file.clone()),
            "Dry run, guide not written",
        );
        return Ok(());
    }

    let guard = RunGuard::new(config.lock_path());
    match pipeline
        .run_guarded(&guard, anchor)
        .await
        .context("pipeline run failed")?
    {
        RunOutcome::Completed(summary) => log_summary(&summary, "Run completed"),
        RunOutcome::Skipped => tracing::info!("Run skipped, another run holds the lock"),
    }
    Ok(())
}

/// Runs the `run` subcommand.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the run fails.
#[instrument(skip_all)]
async fn run_once(args: &RunArgs, config_path: Option<&PathBuf>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(output) = &args.output {
        config.output_file.clone_from(output);
    }

    let tz = config.tz()?;
    let anchor = args
        .anchor_date
        .unwrap_or_else(|| anchor_date(tz, Utc::now()));
    tracing::info!(
        %anchor,
        timezone = %config.timezone,
        cron_schedule = %config.cron_schedule,
        run_on_startup = config.run_on_startup,
        "Starting guide generation"
    );

    if let Some(input) = &args.input {
        return execute(FileSource::new(input), &config, anchor, args.dry_run).await;
    }

    let fetcher = HttpFetcher::builder(config.url()?)
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout()?)
        .max_retries(config.max_retries)
        .build()
        .context("failed to build HTTP client")?;
    execute(fetcher, &config, anchor, args.dry_run).await
}

/// Runs the `config` subcommand.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid.
#[instrument(skip_all)]
fn show_config(config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    tracing::info!("SOURCE_URL              = {}", config.source_url);
    tracing::info!("OUTPUT_FILE             = {}", config.output_file.display());
    tracing::info!("TZ                      = {}", config.timezone);
    tracing::info!("CRON_SCHEDULE           = {}", config.cron_schedule);
    tracing::info!("RUN_ON_STARTUP          = {}", config.run_on_startup);
    tracing::info!("CHANNEL_ID              = {}", config.channel_id);
    tracing::info!("CHANNEL_NAME            = {}", config.channel_name);
    tracing::info!("CHANNEL_LANG            = {}", config.channel_lang);
    tracing::info!("USER_AGENT              = {}", config.user_agent);
    tracing::info!("TIMEOUT_SECONDS         = {}", config.timeout_seconds);
    tracing::info!("MAX_RETRIES             = {}", config.max_retries);
    tracing::info!("LAST_PROGRAMME_DURATION = {}", config.last_programme_duration);
    tracing::info!("LOCK_FILE               = {}", config.lock_path().display());

    config
        .to_pipeline_config()
        .context("configuration is invalid")?;
    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_once(&args, cli.config.as_ref()).await,
        Commands::Config => show_config(cli.config.as_ref()),
    }
}
