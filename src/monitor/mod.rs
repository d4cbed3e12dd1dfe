//! The sampling loop that ties acquisition, analysis and reporting together.
//!
//! A [`Monitor`] owns the trend engine and the running summary. All of its
//! work happens on one task, so sample ingestion, snapshot capture and summary
//! saves never interleave.

pub mod config;
pub mod render;

pub use config::MonitorConfig;

use crate::analysis::insights::{insight_for_spike, insights, Severity};
use crate::analysis::trend::{Trend, TrendEngine};
use crate::error::{MonitorError, Result};
use crate::metrics::data::Sample;
use crate::metrics::traits::MetricsProvider;
use crate::report::summary::RunningSummary;
use crate::report::timestamped_path;
use chrono::Utc;
use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// What a single processed sample produced.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Trend computed after ingesting the sample, once history allows it
    pub trend: Option<Trend>,
    /// Crash dump written for this sample, if one was triggered
    pub crash_dump: Option<PathBuf>,
}

/// Resolves once the process is asked to stop: Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Periodic host monitor.
pub struct Monitor<P> {
    config: MonitorConfig,
    provider: P,
    engine: TrendEngine,
    summary: RunningSummary,
    cpu_count: usize,
}

impl<P: MetricsProvider + Send> Monitor<P> {
    /// Create a monitor reading from `provider` on a host with `cpu_count`
    /// logical CPUs.
    pub fn new(config: MonitorConfig, provider: P, cpu_count: usize) -> Result<Self> {
        config.validate()?;
        let engine = TrendEngine::new(config.engine.clone());

        Ok(Self {
            config,
            provider,
            engine,
            summary: RunningSummary::new(),
            cpu_count,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn engine(&self) -> &TrendEngine {
        &self.engine
    }

    pub fn summary(&self) -> &RunningSummary {
        &self.summary
    }

    /// Collect one sample from the provider and process it.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let sample = self.provider.collect_sample().await?;
        Ok(self.process_sample(sample))
    }

    /// Ingest `sample`, log what it shows and write a crash dump if the
    /// resulting trend calls for one.
    ///
    /// Failures while writing the dump are logged and do not stop processing.
    pub fn process_sample(&mut self, sample: Sample) -> TickOutcome {
        let spike = self
            .engine
            .latest()
            .and_then(|previous| insight_for_spike(previous, &sample));
        for insight in insights(&sample, self.cpu_count).into_iter().chain(spike) {
            match insight.severity {
                Severity::Warning => warn!("[{}] {}", insight.kind, insight.description),
                Severity::Info => info!("[{}] {}", insight.kind, insight.description),
            }
        }

        self.summary.update(&sample);
        info!("\n{}", render::stats_block(&sample, &self.summary));

        self.engine.add_stats(sample);
        let trend = self.engine.analyze();

        let mut crash_dump = None;
        if let Some(trend) = trend.as_ref().filter(|t| t.requires_crash_dump()) {
            warn!("Detected conditions requiring crash dump:");
            for reason in trend.crash_reasons(self.engine.config()) {
                warn!("- {}", reason);
            }

            match self.write_crash_dump() {
                Ok(path) => {
                    warn!("Created crash dump: {}", path.display());
                    self.summary.record_crash(path.clone());
                    crash_dump = Some(path);
                }
                Err(err) => error!("Failed to create crash dump: {}", err),
            }
        }

        TickOutcome { trend, crash_dump }
    }

    /// Write a crash dump of the current engine state.
    pub fn write_crash_dump(&self) -> Result<PathBuf> {
        let path = timestamped_path(&self.config.crash_dir, "crash", Utc::now());
        self.engine.save_snapshot(&path)?;
        Ok(path)
    }

    /// Write a scheduled snapshot of the current engine state.
    pub fn write_snapshot(&self) -> Result<PathBuf> {
        let path = timestamped_path(&self.config.snapshot_dir, "snapshot", Utc::now());
        self.engine.save_snapshot(&path)?;
        Ok(path)
    }

    /// Persist the running summary to its fixed location.
    pub fn save_summary(&self) -> Result<PathBuf> {
        let path = self.config.summary_path();
        self.summary.save(&path)?;
        Ok(path)
    }

    /// Dump the current history after a panic and turn it into an error.
    fn recover_from_panic(&mut self, payload: &(dyn Any + Send)) -> MonitorError {
        let message = panic_message(payload);
        error!("Monitor loop panicked: {}", message);

        match self.write_crash_dump() {
            Ok(path) => {
                error!("Created crash dump: {}", path.display());
                self.summary.record_crash(path);
            }
            Err(err) => error!("Failed to create crash dump: {}", err),
        }
        if let Err(err) = self.save_summary() {
            error!("Failed to save running summary: {}", err);
        }

        MonitorError::Panic(message)
    }

    /// Run until `shutdown` resolves or the provider's stream ends.
    ///
    /// The running summary is saved one last time before returning. A panic
    /// while collecting or processing a sample writes a crash dump of the
    /// current history and ends the loop with [`MonitorError::Panic`].
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval_ms = self.config.interval_secs.saturating_mul(1000);
        let mut samples = self.provider.start_stream(interval_ms).await?;

        let snapshot_period = Duration::from_secs(self.config.snapshot_period_secs);
        let summary_period = Duration::from_secs(self.config.summary_period_secs);
        let mut snapshot_ticker =
            time::interval_at(Instant::now() + snapshot_period, snapshot_period);
        let mut summary_ticker =
            time::interval_at(Instant::now() + summary_period, summary_period);

        info!(
            "Monitoring every {}s, snapshots every {}s, crash dumps to {}",
            self.config.interval_secs,
            self.config.snapshot_period_secs,
            self.config.crash_dir.display()
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                next = AssertUnwindSafe(samples.next()).catch_unwind() => match next {
                    Ok(Some(sample)) => {
                        let processed =
                            panic::catch_unwind(AssertUnwindSafe(|| self.process_sample(sample)));
                        if let Err(payload) = processed {
                            return Err(self.recover_from_panic(payload.as_ref()));
                        }
                    }
                    Ok(None) => {
                        error!("Sample stream ended");
                        break;
                    }
                    Err(payload) => return Err(self.recover_from_panic(payload.as_ref())),
                },
                _ = snapshot_ticker.tick() => match self.write_snapshot() {
                    Ok(path) => info!("Created snapshot: {}", path.display()),
                    Err(err) => error!("Failed to create snapshot: {}", err),
                },
                _ = summary_ticker.tick() => match self.save_summary() {
                    Ok(path) => debug!("Saved running summary to {}", path.display()),
                    Err(err) => error!("Failed to save running summary: {}", err),
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        let path = self.save_summary()?;
        info!("Saved final summary to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::trend::EngineConfig;
    use futures_util::stream::{self, BoxStream};
    use std::fs;
    use std::path::Path;
    use std::task::Poll;

    struct ScriptedProvider {
        samples: Vec<Sample>,
        /// Panic once the scripted samples run out
        fault_at_end: bool,
    }

    impl ScriptedProvider {
        fn new(samples: Vec<Sample>) -> Self {
            Self {
                samples,
                fault_at_end: false,
            }
        }

        fn faulting(samples: Vec<Sample>) -> Self {
            Self {
                samples,
                fault_at_end: true,
            }
        }
    }

    impl MetricsProvider for ScriptedProvider {
        async fn collect_sample(&mut self) -> Result<Sample> {
            if self.samples.is_empty() {
                return Err(MonitorError::collection_error("script exhausted"));
            }
            Ok(self.samples.remove(0))
        }

        async fn start_stream(&mut self, _interval_ms: u64) -> Result<BoxStream<'static, Sample>> {
            let samples = stream::iter(std::mem::take(&mut self.samples));
            if self.fault_at_end {
                let fault =
                    stream::poll_fn(|_| -> Poll<Option<Sample>> { panic!("sensor bus fault") });
                Ok(Box::pin(samples.chain(fault)))
            } else {
                Ok(Box::pin(samples))
            }
        }
    }

    fn busy(user: f64) -> Sample {
        let mut sample = Sample::new();
        sample.cpu.user = user;
        sample.cpu.idle = 100.0 - user;
        sample
    }

    fn config_in(dir: &Path) -> MonitorConfig {
        MonitorConfig::default()
            .with_dirs(dir.join("snapshots"), dir.join("crashes"), dir.join("summary"))
            .with_engine(EngineConfig::with_window(10))
    }

    fn monitor_in(dir: &Path, samples: Vec<Sample>) -> Monitor<ScriptedProvider> {
        Monitor::new(config_in(dir), ScriptedProvider::new(samples), 4).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = MonitorConfig::default().with_interval(0);
        assert!(Monitor::new(config, ScriptedProvider::new(vec![]), 1).is_err());
    }

    #[tokio::test]
    async fn test_tick_without_history_has_no_trend() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_in(dir.path(), vec![busy(10.0)]);

        let outcome = monitor.tick().await.unwrap();
        assert!(outcome.trend.is_none());
        assert!(outcome.crash_dump.is_none());
        assert!(monitor.tick().await.is_err());
    }

    #[test]
    fn test_cpu_jump_writes_crash_dump() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_in(dir.path(), vec![]);

        for _ in 0..9 {
            let outcome = monitor.process_sample(busy(10.0));
            assert!(outcome.crash_dump.is_none());
        }
        let outcome = monitor.process_sample(busy(90.0));

        let trend = outcome.trend.unwrap();
        assert!(trend.cpu_usage.anomaly);
        let dump = outcome.crash_dump.unwrap();
        assert!(dump.starts_with(dir.path().join("crashes")));
        assert!(dump.exists());
        assert_eq!(monitor.summary().last_crash_file.as_ref(), Some(&dump));
    }

    #[tokio::test]
    async fn test_run_saves_summary_when_stream_ends() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor_in(dir.path(), vec![busy(10.0), busy(12.0)]);
        let summary_path = monitor.config().summary_path();

        monitor.run(std::future::pending()).await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();
        assert_eq!(saved["cpu"]["user"], 12.0);
    }

    #[test]
    fn test_failed_crash_dump_does_not_stop_processing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("plain-file");
        fs::write(&blocker, b"not a directory").unwrap();
        let config = MonitorConfig::default()
            .with_dirs(
                dir.path().join("snapshots"),
                blocker.join("crashes"),
                dir.path().join("summary"),
            )
            .with_engine(EngineConfig::with_window(5));
        let mut monitor = Monitor::new(config, ScriptedProvider::new(vec![]), 4).unwrap();

        for _ in 0..9 {
            monitor.process_sample(busy(10.0));
        }
        let outcome = monitor.process_sample(busy(95.0));

        let trend = outcome.trend.unwrap();
        assert!(trend.cpu_usage.anomaly);
        assert!(trend.requires_crash_dump());
        assert!(outcome.crash_dump.is_none());
        assert!(monitor.summary().last_crash_file.is_none());

        let next = monitor.process_sample(busy(10.0));
        assert!(next.trend.is_some());
        assert_eq!(monitor.engine().history().len(), 5);
    }

    #[tokio::test]
    async fn test_panic_during_collection_writes_crash_dump() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::faulting(vec![busy(10.0), busy(10.0)]);
        let monitor = Monitor::new(config_in(dir.path()), provider, 4).unwrap();
        let summary_path = monitor.config().summary_path();

        let result = monitor.run(std::future::pending()).await;
        assert!(matches!(result, Err(MonitorError::Panic(ref m)) if m == "sensor bus fault"));

        let dumps: Vec<_> = fs::read_dir(dir.path().join("crashes"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(dumps.len(), 1);

        let dump: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&dumps[0]).unwrap()).unwrap();
        assert_eq!(dump["stats"].as_array().unwrap().len(), 2);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
        assert_eq!(summary["lastCrashFile"], dumps[0].to_str().unwrap());
        assert!(summary["lastCrashTime"].is_string());
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static message"), "static message");
        assert_eq!(panic_message(&String::from("owned message")), "owned message");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
