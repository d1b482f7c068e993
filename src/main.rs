//! Presence Monitor CLI
//!
//! Watches one contact's presence and logs every transition.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use presence_monitor::{
    client::PresenceClient,
    config::{ClientConfig, Config, LoadOutcome},
    core::TIMESTAMP_FORMAT,
    JsonStatsFile, MonitorReport, MonitorSettings, PresenceMonitor, ReplayClient, Reporter,
    Statistics, StatsStore, VERSION,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "presence_monitor=info";

#[derive(Parser)]
#[command(name = "presence-monitor")]
#[command(version = VERSION)]
#[command(about = "Edge-triggered presence monitor for a single contact", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Diagnostic log filter, e.g. `presence_monitor=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring
    Start {
        /// Contact to watch (overrides the configured target)
        #[arg(long)]
        target: Option<String>,

        /// Seconds between checks (overrides the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show cumulative statistics
    Status,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration
    Config,

    /// Zero the statistics file
    ResetStats,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    let result = match cli.command {
        Commands::Start { target, interval } => cmd_start(&config_path, target, interval),
        Commands::Status => cmd_status(&config_path),
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Config => cmd_config(&config_path),
        Commands::ResetStats => cmd_reset_stats(&config_path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_start(
    config_path: &Path,
    target: Option<String>,
    interval: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = match Config::load_or_init(config_path)
        .with_context(|| format!("could not load {config_path:?}"))?
    {
        LoadOutcome::Loaded(config) => config,
        LoadOutcome::Created(path) => {
            println!("Created configuration file {path:?}.");
            println!("Set \"target\" and the client settings, then run again.");
            return Ok(());
        }
    };

    if let Some(target) = target {
        config.target = target;
    }
    if let Some(secs) = interval {
        config.check_interval = Duration::from_secs(secs);
    }
    config
        .validate()
        .with_context(|| format!("fix {config_path:?} or pass overrides"))?;

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    print_header(&config);

    // Set up Ctrl+C handler
    let cancel = CancellationToken::new();
    ctrlc_handler(cancel.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    let report = match &config.client {
        ClientConfig::Replay { script } => {
            let client = ReplayClient::from_path(script)
                .with_context(|| format!("could not load replay script {script:?}"))?;
            runtime.block_on(run_monitor(client, &config, cancel))?
        }
        #[cfg(feature = "bridge")]
        ClientConfig::Bridge { base_url, token } => {
            let bridge = presence_monitor::BridgeConfig::new(base_url.as_str(), token.clone());
            let client = presence_monitor::BridgeClient::new(bridge)?;
            runtime.block_on(run_monitor(client, &config, cancel))?
        }
        #[cfg(not(feature = "bridge"))]
        ClientConfig::Bridge { .. } => {
            bail!("this build has no bridge client; rebuild with `--features bridge` or configure a replay client")
        }
    };

    println!();
    println!("Disconnected.");
    println!();
    let now = Utc::now().with_timezone(&config.reference_time_zone);
    println!("{}", report.stats.summary(now));

    if report.reason.is_fatal() {
        bail!("{}", report.reason);
    }
    println!("{}", report.reason);
    Ok(())
}

async fn run_monitor<C: PresenceClient>(
    client: C,
    config: &Config,
    cancel: CancellationToken,
) -> anyhow::Result<MonitorReport> {
    let reporter = Reporter::new(&config.log_path, config.reference_time_zone);
    let store = JsonStatsFile::new(&config.stats_path);
    let monitor = PresenceMonitor::new(client, store, reporter, MonitorSettings::from(config), cancel)
        .with_context(|| format!("could not load statistics from {:?}", config.stats_path))?;

    println!("Session: {}", monitor.session_id());
    println!();
    Ok(monitor.run().await)
}

fn print_header(config: &Config) {
    let now = Utc::now().with_timezone(&config.reference_time_zone);
    println!("Presence Monitor v{VERSION}");
    println!();
    println!("  Started: {}", now.format(TIMESTAMP_FORMAT));
    println!("  Target: {}", config.target);
    println!("  Check interval: {}s", config.check_interval.as_secs());
    println!("  Time zone: {}", config.reference_time_zone);
    println!("  Log file: {:?}", config.log_path);
    println!();
    println!("Press Ctrl+C to stop");
    println!();
}

fn cmd_status(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default(config_path)?;
    let store = JsonStatsFile::new(&config.stats_path);

    println!("Presence Monitor Status");
    println!("=======================");
    println!();
    println!("Target: {}", config.target);
    println!("Statistics file: {:?}", store.path());
    println!();

    if !store.path().exists() {
        println!("No previous monitoring data found.");
        return Ok(());
    }

    let stats = store
        .load()
        .with_context(|| format!("could not read {:?}", store.path()))?;
    let now = Utc::now().with_timezone(&config.reference_time_zone);
    println!("{}", stats.summary(now));
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!("{config_path:?} already exists (use --force to overwrite)");
    }
    Config::default()
        .save(config_path)
        .with_context(|| format!("could not write {config_path:?}"))?;
    println!("Wrote default configuration to {config_path:?}");
    println!("Set \"target\" and the client settings before running `presence-monitor start`.");
    if !cfg!(feature = "bridge") {
        println!("This build has no bridge client; the template uses a replay script.");
        println!("Rebuild with `--features bridge` to monitor through a messaging bridge.");
    }
    Ok(())
}

fn cmd_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_reset_stats(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default(config_path)?;
    let mut store = JsonStatsFile::new(&config.stats_path);
    store
        .save(&Statistics::default())
        .with_context(|| format!("could not write {:?}", store.path()))?;
    println!("Statistics reset.");
    Ok(())
}

fn load_or_default(config_path: &Path) -> anyhow::Result<Config> {
    if config_path.exists() {
        Config::load(config_path).with_context(|| format!("could not load {config_path:?}"))
    } else {
        Ok(Config::default())
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(cancel: CancellationToken) {
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Stopping...");
        cancel.cancel();
    })
    .expect("Error setting Ctrl+C handler");
}
