//! Monitor configuration.

use crate::analysis::trend::EngineConfig;
use crate::error::{MonitorError, Result};
use crate::metrics::collector::AcquisitionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the persisted running summary inside `summary_dir`.
pub const SUMMARY_FILE_NAME: &str = "latest.json";

/// Configuration for the monitoring loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between samples
    pub interval_secs: u64,
    /// Seconds between scheduled snapshots
    pub snapshot_period_secs: u64,
    /// Seconds between running summary saves
    pub summary_period_secs: u64,
    /// Directory for scheduled snapshots
    pub snapshot_dir: PathBuf,
    /// Directory for crash dumps
    pub crash_dir: PathBuf,
    /// Directory for the running summary
    pub summary_dir: PathBuf,
    /// Trend detection parameters
    pub engine: EngineConfig,
    /// Acquisition options
    pub acquisition: AcquisitionConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: crate::DEFAULT_INTERVAL_SECS,
            snapshot_period_secs: crate::DEFAULT_SNAPSHOT_PERIOD_SECS,
            summary_period_secs: crate::DEFAULT_SUMMARY_PERIOD_SECS,
            snapshot_dir: PathBuf::from("snapshots"),
            crash_dir: PathBuf::from("crashes"),
            summary_dir: PathBuf::from("summary"),
            engine: EngineConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Set the sampling interval in seconds.
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set the scheduled snapshot period in seconds.
    pub fn with_snapshot_period(mut self, secs: u64) -> Self {
        self.snapshot_period_secs = secs;
        self
    }

    /// Set the running summary save period in seconds.
    pub fn with_summary_period(mut self, secs: u64) -> Self {
        self.summary_period_secs = secs;
        self
    }

    /// Set the snapshot, crash dump and summary directories.
    pub fn with_dirs(
        mut self,
        snapshot_dir: impl Into<PathBuf>,
        crash_dir: impl Into<PathBuf>,
        summary_dir: impl Into<PathBuf>,
    ) -> Self {
        self.snapshot_dir = snapshot_dir.into();
        self.crash_dir = crash_dir.into();
        self.summary_dir = summary_dir.into();
        self
    }

    /// Set the trend detection parameters.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the acquisition options.
    pub fn with_acquisition(mut self, acquisition: AcquisitionConfig) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Path of the persisted running summary.
    pub fn summary_path(&self) -> PathBuf {
        self.summary_dir.join(SUMMARY_FILE_NAME)
    }

    /// Directory that receives crash dumps.
    pub fn crash_dir(&self) -> &Path {
        &self.crash_dir
    }

    /// Check every period and the engine parameters.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("interval", self.interval_secs),
            ("snapshot period", self.snapshot_period_secs),
            ("summary period", self.summary_period_secs),
        ] {
            if value == 0 {
                return Err(MonitorError::config_error(format!(
                    "{} must be at least 1 second",
                    name
                )));
            }
        }
        self.engine.validate()
    }
}
