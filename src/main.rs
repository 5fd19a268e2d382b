use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use voxload_audio::ChunkPool;
use voxload_client::HttpParticipantApi;
use voxload_core::{AppConfig, ConfigOverrides, ExecutorKind, SelectionMode};
use voxload_engine::{run_load_until, RunSettings, VuContext};
use voxload_metrics::MetricsSink;

#[derive(Parser)]
#[command(
    name = "voxload",
    about = "Load generator for chunked audio conversation uploads"
)]
struct Cli {
    /// Path to the configuration file (defaults to ./voxload.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "PROJECT_ID")]
    project_id: Option<String>,

    #[arg(long, env = "API_BASE")]
    api_base: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT")]
    request_timeout: Option<f64>,

    #[arg(long, env = "CHUNKS_DIR")]
    chunks_dir: Option<PathBuf>,

    /// First chunk index to load
    #[arg(long, env = "START")]
    start: Option<u32>,

    /// Last chunk index to load (inclusive)
    #[arg(long, env = "END")]
    end: Option<u32>,

    /// `random` sub-range or `all` chunks per conversation
    #[arg(long, env = "SELECTION")]
    selection: Option<SelectionMode>,

    #[arg(long, env = "MIN_CHUNKS")]
    min_chunks: Option<usize>,

    #[arg(long, env = "MAX_CHUNKS")]
    max_chunks: Option<usize>,

    /// Seconds between chunk uploads
    #[arg(long, env = "SLEEP")]
    record_interval: Option<f64>,

    /// Seconds between conversations
    #[arg(long, env = "THINK_TIME")]
    think_time: Option<f64>,

    /// `ramping` or `shared-iterations`
    #[arg(long, env = "EXECUTOR")]
    executor: Option<ExecutorKind>,

    #[arg(long, env = "VUS")]
    vus: Option<usize>,

    /// Total ramping run duration in minutes
    #[arg(long, env = "DURATION")]
    duration: Option<f64>,

    #[arg(long, env = "GRACEFUL_DRAIN")]
    graceful_drain: Option<f64>,

    #[arg(long, env = "ITERATIONS")]
    iterations: Option<usize>,

    /// Upper bound in minutes for shared-iterations runs
    #[arg(long, env = "MAX_DURATION")]
    max_duration: Option<f64>,

    #[arg(long, env = "CALL_FINISH", value_parser = clap::builder::BoolishValueParser::new())]
    call_finish: Option<bool>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            project_id: self.project_id.clone(),
            api_base: self.api_base.clone(),
            request_timeout_secs: self.request_timeout,
            chunks_dir: self.chunks_dir.clone(),
            start: self.start,
            end: self.end,
            selection: self.selection,
            min_chunks: self.min_chunks,
            max_chunks: self.max_chunks,
            record_interval_secs: self.record_interval,
            think_time_secs: self.think_time,
            executor: self.executor,
            max_vus: self.vus,
            duration_minutes: self.duration,
            graceful_drain_secs: self.graceful_drain,
            iterations: self.iterations,
            max_duration_minutes: self.max_duration,
            call_finish: self.call_finish,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_optional(cli.config.as_deref())
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;
    config.apply_overrides(cli.overrides());
    config.validate().context("invalid configuration")?;

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!(
        project_id = %config.target.project_id,
        api_base = %config.target.api_base,
        executor = ?config.load.executor,
        max_vus = config.load.max_vus,
        "voxload starting"
    );

    let window = config.chunks.start..=config.chunks.end;
    let pool = ChunkPool::load(&config.chunks.directory, window.clone())
        .with_context(|| format!("failed to load chunks from {:?}", config.chunks.directory))?;
    if pool.is_empty() {
        bail!(
            "no chunk files found in {:?} for indices {}..={}",
            config.chunks.directory,
            window.start(),
            window.end()
        );
    }
    if config.chunks.selection == SelectionMode::Random && pool.len() < config.chunks.min_chunks {
        tracing::warn!(
            "only {} chunk(s) loaded, fewer than min_chunks={}; every conversation uploads the whole pool",
            pool.len(),
            config.chunks.min_chunks
        );
    }
    tracing::info!(
        chunks = pool.len(),
        bytes = pool.total_bytes(),
        "chunk pool loaded from {:?}",
        config.chunks.directory
    );

    let metrics = Arc::new(MetricsSink::new());
    let api = HttpParticipantApi::new(&config.target, Arc::clone(&metrics))
        .context("failed to create participant API client")?;

    let context = Arc::new(VuContext {
        api: Arc::new(api),
        pool: Arc::new(pool),
        metrics: Arc::clone(&metrics),
        settings: RunSettings::from_config(&config),
    });

    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("interrupted, reporting partial results"),
            Err(e) => {
                tracing::error!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    run_load_until(context, &config.load, interrupted).await;
    tracing::info!("run complete");

    let report = metrics.report();
    report.log_summary();
    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
    }

    Ok(())
}
