//! # hostwatch - Host Metrics Trend and Anomaly Engine
//!
//! Samples a Linux host on a fixed interval, keeps sliding windows of the
//! derived metrics and flags anomalies, trends and stress.
//!
//! ## Features
//!
//! - **Sliding-window analysis**: mean, standard deviation, z-score and slope per metric
//! - **Temperature and filesystem tracking**: per-sensor and per-partition windows
//! - **Stress scoring**: a 0-100 score for trends and for the running summary
//! - **Crash dumps**: JSON snapshots written whenever a trigger condition fires
//! - **Library + Binary**: Use as a crate or standalone application
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostwatch::{MetricsProvider, SystemCollector, TrendEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut collector = SystemCollector::new()?;
//!     let mut engine = TrendEngine::new(EngineConfig::default());
//!
//!     for _ in 0..3 {
//!         engine.add_stats(collector.collect_sample().await?);
//!     }
//!     if let Some(trend) = engine.analyze() {
//!         println!("stress: {:.1}", trend.system_stress);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod report;

// Re-export public API
pub use analysis::{EngineConfig, MetricSeries, Trend, TrendEngine};
pub use error::{MonitorError, Result};
pub use metrics::{
    collector::{AcquisitionConfig, SystemCollector},
    data::Sample,
    traits::MetricsProvider,
};
pub use monitor::{Monitor, MonitorConfig};
pub use report::{RunningSummary, SnapshotDocument};

/// The default sampling interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// The default period between scheduled snapshots in seconds
pub const DEFAULT_SNAPSHOT_PERIOD_SECS: u64 = 3600;

/// The default period between running summary saves in seconds
pub const DEFAULT_SUMMARY_PERIOD_SECS: u64 = 60;
