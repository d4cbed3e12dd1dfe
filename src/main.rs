//! hostwatch - Host Metrics Trend and Anomaly Monitor Binary
//!
//! Samples the host periodically, logs trends and writes crash dumps, scheduled
//! snapshots and a running summary.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use hostwatch::metrics::collector::DEFAULT_WATCHED_MOUNTS;
use hostwatch::monitor::{render, shutdown_signal};
use hostwatch::{
    AcquisitionConfig, EngineConfig, MetricsProvider, Monitor, MonitorConfig, RunningSummary,
    Sample, SystemCollector, DEFAULT_INTERVAL_SECS, DEFAULT_SNAPSHOT_PERIOD_SECS,
    DEFAULT_SUMMARY_PERIOD_SECS,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hostwatch")]
#[command(about = "Host metrics trend and anomaly monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
#[command(
    long_about = "Samples host metrics, tracks sliding-window trends and writes crash dumps \
                  when anomalies appear"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Seconds between samples
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Number of samples in the short analysis window
    #[arg(long, default_value_t = 10)]
    history: usize,

    /// Temperature readings kept per sensor for long-term slopes [default: 10 x history]
    #[arg(long)]
    long_term_window: Option<usize>,

    /// Z-score above which a value counts as anomalous
    #[arg(long, default_value_t = 2.0)]
    anomaly_threshold: f64,

    /// Absolute slope per sample above which a metric counts as trending
    #[arg(long, default_value_t = 0.1)]
    trend_threshold: f64,

    /// Temperature in °C above which a sensor counts as overheating
    #[arg(long, default_value_t = 70.0)]
    temp_threshold: f64,

    /// Directory for scheduled snapshots
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Directory for crash dumps
    #[arg(long, default_value = "crashes")]
    crash_dir: PathBuf,

    /// Directory for the running summary
    #[arg(long, default_value = "summary")]
    summary_dir: PathBuf,

    /// Seconds between scheduled snapshots
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_PERIOD_SECS)]
    snapshot_period: u64,

    /// Seconds between running summary saves
    #[arg(long, default_value_t = DEFAULT_SUMMARY_PERIOD_SECS)]
    summary_period: u64,

    /// Report fixed sensor readings when the host has none
    #[arg(long)]
    mock_temperature: bool,

    /// Mount point to watch (repeatable)
    #[arg(long = "mount", value_name = "PATH")]
    mounts: Vec<String>,

    /// Watch every mounted disk
    #[arg(long, conflicts_with = "mounts")]
    all_mounts: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable trace-level logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run the monitoring loop (default)
    Run,

    /// Collect a single sample and exit
    Sample(SampleArgs),

    /// Show the effective configuration
    Info,
}

#[derive(Args, Debug, PartialEq)]
struct SampleArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

impl Cli {
    fn monitor_config(&self) -> MonitorConfig {
        let watched_mounts = if self.all_mounts {
            None
        } else if self.mounts.is_empty() {
            Some(DEFAULT_WATCHED_MOUNTS.iter().map(|m| m.to_string()).collect())
        } else {
            Some(self.mounts.clone())
        };

        let mut engine = EngineConfig::with_window(self.history);
        if let Some(long_term_window) = self.long_term_window {
            engine = engine.with_long_term_window(long_term_window);
        }
        let engine = engine
            .with_anomaly_threshold(self.anomaly_threshold)
            .with_trend_threshold(self.trend_threshold)
            .with_temp_threshold(self.temp_threshold);

        let acquisition = AcquisitionConfig::default()
            .with_mock_temperature(self.mock_temperature)
            .with_watched_mounts(watched_mounts);

        MonitorConfig::default()
            .with_interval(self.interval)
            .with_snapshot_period(self.snapshot_period)
            .with_summary_period(self.summary_period)
            .with_dirs(&self.snapshot_dir, &self.crash_dir, &self.summary_dir)
            .with_engine(engine)
            .with_acquisition(acquisition)
    }

    /// Default log level; `RUST_LOG` still overrides it.
    fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::TRACE
        } else if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = cli.monitor_config();
    config.validate().context("invalid configuration")?;

    match &cli.command {
        Some(Commands::Run) | None => run_command(config).await?,
        Some(Commands::Sample(args)) => sample_command(config, args).await?,
        Some(Commands::Info) => info_command(&config)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.log_level().into())
        .from_env_lossy();

    let log_file = cli.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!(
                    "Failed to open log file {}: {}, logging to stderr",
                    path.display(),
                    err
                );
                None
            }
        }
    });

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(file) => {
            let subscriber = builder.with_writer(Mutex::new(file)).with_ansi(false).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

async fn run_command(config: MonitorConfig) -> anyhow::Result<()> {
    info!("Starting hostwatch monitor...");

    let collector = SystemCollector::with_config(config.acquisition.clone())
        .context("failed to initialize system collector")?;
    let cpu_count = collector.cpu_count();
    info!("System collector initialized ({} CPUs)", cpu_count);

    info!("Monitor configuration:");
    info!("  - Interval: {}s", config.interval_secs);
    info!("  - Window: {} samples", config.engine.window);
    info!("  - Snapshot dir: {}", config.snapshot_dir.display());
    info!("  - Crash dir: {}", config.crash_dir.display());
    info!("  - Summary: {}", config.summary_path().display());

    let monitor = Monitor::new(config, collector, cpu_count)?;
    monitor.run(shutdown_signal()).await?;
    info!("Monitor stopped");
    Ok(())
}

async fn sample_command(config: MonitorConfig, args: &SampleArgs) -> anyhow::Result<()> {
    let mut collector = SystemCollector::with_config(config.acquisition)?;

    // CPU percentages come from the delta between two reads.
    collector.collect_sample().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let sample = collector.collect_sample().await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&sample)?),
        "pretty" => print_pretty_sample(&sample),
        other => bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

fn info_command(config: &MonitorConfig) -> anyhow::Result<()> {
    println!("hostwatch {}", env!("CARGO_PKG_VERSION"));
    println!("====================");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_pretty_sample(sample: &Sample) {
    let mut summary = RunningSummary::new();
    summary.update(sample);
    println!("{}", render::stats_block(sample, &summary));
    println!("Processes: {}", sample.processes.len());
}
