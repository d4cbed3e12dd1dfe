//! Trend, anomaly and stress analysis over host samples.

pub mod insights;
pub mod series;
pub mod stats;
pub mod stress;
pub mod trend;

// Re-export commonly used items
pub use insights::{Insight, Severity};
pub use series::MetricSeries;
pub use stress::{summary_stress, trend_stress};
pub use trend::{
    EngineConfig, FilesystemTrend, MetricTrend, PartitionTrend, SensorTrend, TemperatureTrend,
    Trend, TrendEngine,
};
