//! Sliding-window trend analysis over host samples.
//!
//! [`TrendEngine`] keeps one bounded [`MetricSeries`] per tracked metric,
//! temperature sensor and filesystem partition. [`TrendEngine::analyze`]
//! recomputes a fresh [`Trend`] from those windows: population statistics,
//! an OLS slope, and an anomaly flag combining the z-score and slope tests.

use crate::analysis::series::MetricSeries;
use crate::analysis::stats::{is_trend_anomaly, is_zscore_anomaly, mean_std_dev, slope};
use crate::analysis::stress::trend_stress;
use crate::error::{MonitorError, Result};
use crate::metrics::data::Sample;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Stress score at or above which a crash dump is taken.
pub const CRASH_STRESS_THRESHOLD: f64 = 85.0;

/// Free-space percentage below which a partition is critical.
pub const PARTITION_CRITICAL_FREE_PCT: f64 = 10.0;

/// Long-window slope is only evaluated once more than this many readings exist.
const LONG_TERM_MIN_SAMPLES: usize = 10;

/// Detection parameters of a [`TrendEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the short windows and of the sample history
    pub window: usize,
    /// Capacity of the long temperature windows
    pub long_term_window: usize,
    /// Z-score cutoff
    pub anomaly_threshold: f64,
    /// Slope cutoff
    pub trend_threshold: f64,
    /// Absolute temperature ceiling in Celsius
    pub temp_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: 10,
            long_term_window: 100,
            anomaly_threshold: 2.0,
            trend_threshold: 0.1,
            temp_threshold: 70.0,
        }
    }
}

impl EngineConfig {
    /// Default thresholds with the given short window and a long window ten
    /// times as large.
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            long_term_window: window * 10,
            ..Default::default()
        }
    }

    pub fn with_long_term_window(mut self, long_term_window: usize) -> Self {
        self.long_term_window = long_term_window;
        self
    }

    pub fn with_anomaly_threshold(mut self, threshold: f64) -> Self {
        self.anomaly_threshold = threshold;
        self
    }

    pub fn with_trend_threshold(mut self, threshold: f64) -> Self {
        self.trend_threshold = threshold;
        self
    }

    pub fn with_temp_threshold(mut self, threshold: f64) -> Self {
        self.temp_threshold = threshold;
        self
    }

    /// Reject parameter combinations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            return Err(MonitorError::config_error(format!(
                "window must hold at least 2 samples, got {}",
                self.window
            )));
        }
        if self.long_term_window == 0 {
            return Err(MonitorError::config_error("long-term window must not be empty"));
        }
        if !(self.anomaly_threshold > 0.0) {
            return Err(MonitorError::config_error(format!(
                "anomaly threshold must be positive, got {}",
                self.anomaly_threshold
            )));
        }
        if !(self.trend_threshold > 0.0) {
            return Err(MonitorError::config_error(format!(
                "trend threshold must be positive, got {}",
                self.trend_threshold
            )));
        }
        if !self.temp_threshold.is_finite() {
            return Err(MonitorError::config_error("temperature threshold must be finite"));
        }
        Ok(())
    }
}

/// Statistics of one scalar metric over its window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTrend {
    pub mean: f64,
    pub std_dev: f64,
    pub slope: f64,
    pub anomaly: bool,
}

/// Statistics of one temperature sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTrend {
    pub mean: f64,
    pub std_dev: f64,
    pub slope: f64,
    pub anomaly: bool,
    pub max: f64,
    pub min: f64,
    pub absolute_threshold: f64,
    pub threshold_exceeded: bool,
}

/// Temperature statistics aggregated over all sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureTrend {
    /// Mean of the per-sensor means
    pub mean: f64,
    /// Deviation of the pooled short-window readings
    pub std_dev: f64,
    /// Slope of the pooled short-window readings
    pub slope: f64,
    pub anomaly: bool,
    pub max: f64,
    pub min: f64,
    pub absolute_threshold: f64,
    pub threshold_exceeded: bool,
    pub sensors: BTreeMap<String, SensorTrend>,
}

/// Free-space statistics of one partition, in percent free.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionTrend {
    pub mean: f64,
    pub std_dev: f64,
    /// Negative when free space is shrinking
    pub slope: f64,
    pub anomaly: bool,
    pub min: f64,
    pub max: f64,
    pub current: f64,
    pub critical: bool,
    pub device: String,
    pub mount_point: String,
}

/// Per-partition trends plus any-partition flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemTrend {
    pub partitions: BTreeMap<String, PartitionTrend>,
    pub anomaly: bool,
    pub critical: bool,
}

/// Result of one [`TrendEngine::analyze`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub cpu_usage: MetricTrend,
    pub memory_usage: MetricTrend,
    pub process_count: MetricTrend,
    pub temperature: TemperatureTrend,
    pub filesystem: FilesystemTrend,
    /// Composite 0-100 stress score
    pub system_stress: f64,
}

impl Trend {
    /// Whether this trend warrants a crash dump.
    pub fn requires_crash_dump(&self) -> bool {
        self.system_stress >= CRASH_STRESS_THRESHOLD
            || self.cpu_usage.anomaly
            || self.memory_usage.anomaly
            || self.process_count.anomaly
            || self.temperature.anomaly
            || self.temperature.threshold_exceeded
            || self.filesystem.critical
            || self.filesystem.anomaly
    }

    /// Human-readable reasons behind [`Trend::requires_crash_dump`].
    pub fn crash_reasons(&self, config: &EngineConfig) -> Vec<String> {
        let mut reasons = Vec::new();
        let limit = |m: &MetricTrend| m.std_dev * config.anomaly_threshold;

        if self.system_stress >= CRASH_STRESS_THRESHOLD {
            reasons.push(format!("High system stress: {:.1}%", self.system_stress));
        }
        if self.cpu_usage.anomaly {
            reasons.push(format!(
                "CPU anomaly detected: {:.1}% (threshold: {:.1})",
                self.cpu_usage.mean,
                limit(&self.cpu_usage)
            ));
        }
        if self.memory_usage.anomaly {
            reasons.push(format!(
                "Memory anomaly detected: {:.1}% (threshold: {:.1})",
                self.memory_usage.mean,
                limit(&self.memory_usage)
            ));
        }
        if self.temperature.anomaly {
            reasons.push(format!(
                "Temperature anomaly detected: {:.1}°C (threshold: {:.1})",
                self.temperature.mean,
                self.temperature.std_dev * config.anomaly_threshold
            ));
        }
        if self.temperature.threshold_exceeded {
            reasons.push(format!(
                "Temperature threshold exceeded: {:.1}°C (threshold: {:.1}°C)",
                self.temperature.max, self.temperature.absolute_threshold
            ));
        }
        if self.process_count.anomaly {
            reasons.push(format!(
                "Process count anomaly detected: {:.1} (threshold: {:.1})",
                self.process_count.mean,
                limit(&self.process_count)
            ));
        }
        for (mount, fs) in &self.filesystem.partitions {
            if fs.critical {
                reasons.push(format!(
                    "CRITICAL: {} has only {:.1}% free space remaining",
                    mount, fs.current
                ));
            } else if fs.anomaly {
                if fs.slope < 0.0 {
                    reasons.push(format!(
                        "{}: abnormal decrease in free space (trend: {:.2}%/sample)",
                        mount, fs.slope
                    ));
                } else {
                    reasons.push(format!(
                        "{}: abnormal change in free space (current: {:.1}%, mean: {:.1}%)",
                        mount, fs.current, fs.mean
                    ));
                }
            }
        }

        reasons
    }
}

/// Short- and long-window readings for one temperature sensor.
#[derive(Debug, Clone)]
struct SensorSeries {
    short: MetricSeries,
    long: MetricSeries,
}

/// Free-space readings for one partition plus its last known device.
#[derive(Debug, Clone)]
struct PartitionSeries {
    free_pct: MetricSeries,
    device: String,
}

/// Owner of the sample history and every metric window.
///
/// Not synchronized: one control thread feeds [`TrendEngine::add_stats`] and
/// calls [`TrendEngine::analyze`].
#[derive(Debug, Clone)]
pub struct TrendEngine {
    config: EngineConfig,
    history: VecDeque<Sample>,
    cpu: MetricSeries,
    memory: MetricSeries,
    processes: MetricSeries,
    sensors: BTreeMap<String, SensorSeries>,
    partitions: BTreeMap<String, PartitionSeries>,
}

impl TrendEngine {
    pub fn new(config: EngineConfig) -> Self {
        let window = config.window.max(1);
        Self {
            history: VecDeque::with_capacity(window),
            cpu: MetricSeries::new(window),
            memory: MetricSeries::new(window),
            processes: MetricSeries::new(window),
            sensors: BTreeMap::new(),
            partitions: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Samples currently in the window, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.history.iter()
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.history.back()
    }

    /// Names of every sensor ever observed.
    pub fn sensor_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sensors.keys().map(String::as_str)
    }

    /// Length of a sensor's short and long windows.
    pub fn sensor_window_lens(&self, name: &str) -> Option<(usize, usize)> {
        self.sensors
            .get(name)
            .map(|s| (s.short.len(), s.long.len()))
    }

    /// Length of a partition's free-space window.
    pub fn partition_window_len(&self, mount_point: &str) -> Option<usize> {
        self.partitions.get(mount_point).map(|p| p.free_pct.len())
    }

    /// Record a sample in the history and every metric window.
    pub fn add_stats(&mut self, sample: Sample) {
        let window = self.config.window.max(1);
        let long_window = self.config.long_term_window;

        self.cpu.push(sample.cpu_busy());
        self.memory.push(sample.memory_used_pct());
        self.processes.push(sample.processes.len() as f64);

        for (name, &temp) in &sample.temperature {
            let series = self
                .sensors
                .entry(name.clone())
                .or_insert_with(|| SensorSeries {
                    short: MetricSeries::new(window),
                    long: MetricSeries::new(long_window),
                });
            series.short.push(temp);
            series.long.push(temp);
        }

        for (mount, fs) in &sample.filesystem {
            let series = self
                .partitions
                .entry(mount.clone())
                .or_insert_with(|| PartitionSeries {
                    free_pct: MetricSeries::new(window),
                    device: String::new(),
                });
            series.free_pct.push(fs.free_pct());
            series.device.clone_from(&fs.device);
        }

        self.history.push_back(sample);
        while self.history.len() > window {
            self.history.pop_front();
        }
    }

    /// Compute a fresh trend, or `None` while fewer than two samples exist.
    pub fn analyze(&self) -> Option<Trend> {
        if self.history.len() < 2 {
            return None;
        }

        let mut trend = Trend {
            cpu_usage: self.metric_trend(&self.cpu),
            memory_usage: self.metric_trend(&self.memory),
            process_count: self.metric_trend(&self.processes),
            temperature: self.temperature_trend(),
            filesystem: self.filesystem_trend(),
            system_stress: 0.0,
        };
        trend.system_stress = trend_stress(&trend);

        Some(trend)
    }

    fn metric_trend(&self, series: &MetricSeries) -> MetricTrend {
        let values = series.to_vec();
        let (mean, std_dev) = mean_std_dev(&values);
        let slope = slope(&values);
        let anomaly = is_zscore_anomaly(&values, mean, std_dev, self.config.anomaly_threshold)
            || is_trend_anomaly(slope, self.config.trend_threshold);

        MetricTrend {
            mean,
            std_dev,
            slope,
            anomaly,
        }
    }

    fn sensor_trend(&self, series: &SensorSeries) -> SensorTrend {
        let values = series.short.to_vec();
        let (mean, std_dev) = mean_std_dev(&values);
        let short_slope = slope(&values);
        let max = series.short.max().unwrap_or_default();
        let min = series.short.min().unwrap_or_default();
        let threshold_exceeded = max > self.config.temp_threshold;

        let long_term_slope = if series.long.len() > LONG_TERM_MIN_SAMPLES {
            slope(&series.long.to_vec())
        } else {
            0.0
        };

        let anomaly = is_zscore_anomaly(&values, mean, std_dev, self.config.anomaly_threshold)
            || is_trend_anomaly(short_slope, self.config.trend_threshold)
            || is_trend_anomaly(long_term_slope, self.config.trend_threshold * 0.5)
            || threshold_exceeded;

        SensorTrend {
            mean,
            std_dev,
            slope: short_slope,
            anomaly,
            max,
            min,
            absolute_threshold: self.config.temp_threshold,
            threshold_exceeded,
        }
    }

    fn temperature_trend(&self) -> TemperatureTrend {
        let mut temperature = TemperatureTrend {
            absolute_threshold: self.config.temp_threshold,
            ..Default::default()
        };

        let mut pooled = Vec::new();
        for (name, series) in &self.sensors {
            if series.short.is_empty() {
                continue;
            }
            temperature
                .sensors
                .insert(name.clone(), self.sensor_trend(series));
            pooled.extend(series.short.iter());
        }

        if temperature.sensors.is_empty() {
            return temperature;
        }

        let sensors = temperature.sensors.values();
        temperature.max = sensors.clone().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max);
        temperature.min = sensors.clone().map(|s| s.min).fold(f64::INFINITY, f64::min);
        temperature.mean =
            sensors.clone().map(|s| s.mean).sum::<f64>() / temperature.sensors.len() as f64;
        temperature.threshold_exceeded = temperature.max > self.config.temp_threshold;

        let (pooled_mean, pooled_std_dev) = mean_std_dev(&pooled);
        temperature.std_dev = pooled_std_dev;
        temperature.slope = slope(&pooled);
        temperature.anomaly = temperature.sensors.values().any(|s| s.anomaly)
            || is_zscore_anomaly(
                &pooled,
                pooled_mean,
                pooled_std_dev,
                self.config.anomaly_threshold,
            )
            || temperature.threshold_exceeded;

        temperature
    }

    fn filesystem_trend(&self) -> FilesystemTrend {
        let mut filesystem = FilesystemTrend::default();

        for (mount, series) in &self.partitions {
            if series.free_pct.len() < 2 {
                continue;
            }

            let values = series.free_pct.to_vec();
            let (mean, std_dev) = mean_std_dev(&values);
            let slope = slope(&values);
            let current = series.free_pct.last().unwrap_or_default();
            let anomaly = is_zscore_anomaly(&values, mean, std_dev, self.config.anomaly_threshold)
                || is_trend_anomaly(slope, self.config.trend_threshold * 2.0);
            let critical = current < PARTITION_CRITICAL_FREE_PCT;

            filesystem.anomaly |= anomaly;
            filesystem.critical |= critical;
            filesystem.partitions.insert(
                mount.clone(),
                PartitionTrend {
                    mean,
                    std_dev,
                    slope,
                    anomaly,
                    min: series.free_pct.min().unwrap_or_default(),
                    max: series.free_pct.max().unwrap_or_default(),
                    current,
                    critical,
                    device: series.device.clone(),
                    mount_point: mount.clone(),
                },
            );
        }

        filesystem
    }
}

impl Default for TrendEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
