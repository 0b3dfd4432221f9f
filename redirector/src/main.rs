mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig, ValidationError};
use metrics_exporter_statsd::StatsdBuilder;
use redirect::RedirectServerError;
use resolver::cache::ResolutionCache;
use resolver::redirects::Redirects;
use resolver::upstream::{GitHubReleases, UpstreamClientError};
use shared::metrics_defs::{MetricDef, MetricType};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "redirector";

#[derive(Parser)]
#[command(version, about = "Redirects stable file keys to the newest release asset of a project")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve redirects
    Run(ConfigArgs),
    /// Check the configuration file and exit
    Validate(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not create upstream client: {0}")]
    Upstream(#[from] UpstreamClientError),
    #[error("server error: {0}")]
    Server(#[from] RedirectServerError),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Run(args) => run(&args.config),
        CliCommand::Validate(args) => validate(&args.config),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn load_config(path: &Path) -> Result<Config, CliError> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn validate(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;
    println!(
        "{}: ok ({} files configured)",
        path.display(),
        config.files.len()
    );
    Ok(())
}

fn run(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;

    // Keep the guard alive so buffered events are flushed on exit
    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics_config) = &config.common.metrics {
        init_metrics(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), CliError> {
    if config.files.is_empty() {
        tracing::warn!("No files configured, every request will be answered with 404");
    }

    tracing::info!(
        files = config.files.len(),
        api_url = %config.upstream.api_url,
        "Loaded configuration"
    );

    let upstream = GitHubReleases::new(&config.upstream)?;
    let redirects = Redirects::new(config.files, ResolutionCache::new(Arc::new(upstream)));

    redirect::run(&config.redirect, redirects, &config.upstream.user_agent).await?;
    Ok(())
}

fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = config.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;

    metrics::set_global_recorder(recorder)
        .map_err(|_| CliError::Metrics("a metrics recorder is already installed".into()))?;

    let all_metrics = resolver::metrics_defs::ALL_METRICS
        .iter()
        .chain(redirect::metrics_defs::ALL_METRICS);
    for def in all_metrics {
        describe_metric(def);
    }

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}

fn describe_metric(def: &MetricDef) {
    match def.metric_type {
        MetricType::Counter => metrics::describe_counter!(def.name, def.description),
        MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
        MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
    }
    tracing::debug!(
        metric = def.name,
        metric_type = def.metric_type.as_str(),
        "Registered metric"
    );
}
