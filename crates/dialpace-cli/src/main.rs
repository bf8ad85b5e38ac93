//! dialpace CLI - paced outbound calling with lifecycle metrics
//!
//! Usage:
//!   dialpace init                   Write a default dialpace.toml
//!   dialpace serve                  Run the webhook and call-control server
//!   dialpace call <number>          Place a single call
//!   dialpace batch <numbers...>     Run a capped, paced batch in the foreground
//!   dialpace stats                  Summarize finalized calls

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialpace_core::config::CONFIG_FILE;
use dialpace_core::{CallPlacer, DialpaceConfig};
use dialpace_metrics::{compute_stats, CallMetricsRecord, CallTracker, MetricsLog};
use dialpace_provider::HttpCallPlacer;
use dialpace_scheduler::{run_batch, BatchRequest, DailyCapStore, Dialer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "dialpace")]
#[command(author, version, about = "Paced outbound calling with lifecycle metrics")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the webhook and call-control server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Place a single call
    Call {
        /// Destination number
        number: String,

        /// Free-form tag forwarded to the provider
        #[arg(long)]
        tag: Option<String>,
    },

    /// Run a batch in the foreground
    Batch {
        /// Destination numbers
        numbers: Vec<String>,

        /// Newline-separated file of destination numbers
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Passes over the number list
        #[arg(short = 'n', long)]
        repeat: Option<u32>,

        /// Minimum seconds between calls
        #[arg(long)]
        min_delay: Option<u64>,

        /// Maximum seconds between calls
        #[arg(long)]
        max_delay: Option<u64>,

        /// Maximum calls per number per day
        #[arg(long)]
        daily_cap: Option<u32>,

        /// Plan and pace without calling anyone
        #[arg(long)]
        dry_run: bool,

        /// Free-form tag forwarded to the provider
        #[arg(long)]
        tag: Option<String>,
    },

    /// Summarize finalized calls as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose when set
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_target(false);
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )?;
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())?;
    }

    match cli.command {
        Commands::Init { force } => cmd_init(cli.config, force),
        Commands::Serve { bind } => cmd_serve(load_config(&cli.config)?, bind).await,
        Commands::Call { number, tag } => cmd_call(load_config(&cli.config)?, number, tag).await,
        Commands::Batch {
            numbers,
            file,
            repeat,
            min_delay,
            max_delay,
            daily_cap,
            dry_run,
            tag,
        } => {
            let config = load_config(&cli.config)?;
            let mut destinations = numbers;
            if let Some(file) = file {
                destinations.extend(read_numbers(&file).await?);
            }

            let request = BatchRequest {
                destinations,
                repeat: repeat.unwrap_or(config.batch.repeat),
                min_delay_sec: min_delay.unwrap_or(config.batch.min_delay_sec),
                max_delay_sec: max_delay.unwrap_or(config.batch.max_delay_sec),
                dry_run,
                daily_cap: daily_cap.unwrap_or(config.batch.daily_cap),
                tag,
            };
            cmd_batch(config, request).await
        }
        Commands::Stats => cmd_stats(load_config(&cli.config)?).await,
    }
}

fn load_config(path: &PathBuf) -> Result<DialpaceConfig> {
    DialpaceConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}

fn placer(config: &DialpaceConfig) -> Result<Arc<dyn CallPlacer>> {
    let api_key = config.api_key();
    if api_key.is_none() {
        warn!(
            "{} is not set; calling the provider without credentials",
            config.provider.api_key_env
        );
    }
    let placer: Arc<dyn CallPlacer> =
        Arc::new(HttpCallPlacer::from_config(&config.provider, api_key)?);
    Ok(placer)
}

fn dialer(config: &DialpaceConfig) -> Result<Dialer> {
    let log = Arc::new(MetricsLog::new(&config.storage.data_dir));
    let tracker = Arc::new(CallTracker::with_log_key(
        log,
        config.storage.metrics_file.clone(),
    ));
    Ok(Dialer::new(tracker, placer(config)?, config.event_url())
        .with_caller_id(config.provider.caller_id.clone()))
}

async fn read_numbers(path: &PathBuf) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read number list {:?}", path))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", path);
    }

    DialpaceConfig::write_default(&path)?;
    println!("Wrote default configuration to {:?}", path);
    println!("Set the provider API key in the environment before placing calls.");
    Ok(())
}

async fn cmd_serve(config: DialpaceConfig, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    info!("Webhook URL handed to provider: {}", config.event_url());

    let state = dialpace_server::build_state(&config, placer(&config)?);
    dialpace_server::serve(state, &addr).await
}

async fn cmd_call(config: DialpaceConfig, number: String, tag: Option<String>) -> Result<()> {
    let dialer = dialer(&config)?;
    let record = dialer
        .dial(number.trim(), tag.as_deref())
        .await
        .with_context(|| format!("Call to {} failed", number))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_batch(config: DialpaceConfig, request: BatchRequest) -> Result<()> {
    let request = request.normalized()?;
    if request.destinations.is_empty() {
        bail!("No destination numbers given");
    }

    let caps = DailyCapStore::new(config.caps_path());
    let dialer = dialer(&config)?;
    let report = run_batch(&request, &caps, &dialer).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_stats(config: DialpaceConfig) -> Result<()> {
    let log = MetricsLog::new(&config.storage.data_dir);
    let records: Vec<CallMetricsRecord> = log.read_all(&config.storage.metrics_file).await?;
    let stats = compute_stats(&records);

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
