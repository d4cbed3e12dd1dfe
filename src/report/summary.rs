//! Continuously updated "current state" projection of the host.
//!
//! Unlike the trend engine, the summary scores only the latest values plus a
//! short per-sensor and per-partition history. It is created once, updated in
//! place every tick and persisted on a coarser cadence.

use crate::analysis::series::MetricSeries;
use crate::analysis::stress::summary_stress;
use crate::error::Result;
use crate::metrics::data::Sample;
use crate::report::write_document;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Readings kept per sensor and per partition.
pub const SUMMARY_HISTORY_LEN: usize = 10;

/// Process CPU percentage above which it counts as high-CPU.
pub const HIGH_CPU_PERCENT: f64 = 10.0;

/// Process virtual-size percentage above which it counts as high-memory.
pub const HIGH_MEMORY_PERCENT: f64 = 5.0;

/// Human-readable location for well-known sensor names.
pub fn sensor_location(name: &str) -> &'static str {
    match name {
        "f10e4078.thermal" => "CPU Core",
        "lm75" => "External I2C Sensor",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSummary {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSummary {
    pub value: f64,
    pub location: String,
    pub max_temp: f64,
    pub avg_temp: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureSummary {
    /// Sensors reported by the latest sample
    pub sensors: BTreeMap<String, SensorSummary>,
    /// Maximum over every sensor's history, 0 without history
    pub max_temp: f64,
    /// Mean over every sensor's history, 0 without history
    pub avg_temp: f64,
    pub history: BTreeMap<String, MetricSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSummary {
    pub device: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
    pub free_space_percent: f64,
    pub mount_point: String,
    pub critical: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemSummary {
    pub partitions: BTreeMap<String, PartitionSummary>,
    /// Free space percentage per partition
    pub history: BTreeMap<String, MetricSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighCpuProcess {
    pub name: String,
    pub cpu_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub total: usize,
    pub running: usize,
    pub sleeping: usize,
    pub uninterruptible: usize,
    pub zombie: usize,
    pub high_cpu: usize,
    pub high_memory: usize,
    pub high_cpu_processes: Vec<HighCpuProcess>,
}

/// Latest-value projection of the host with its own stress score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningSummary {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_crash_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_crash_time: Option<DateTime<Utc>>,
    pub cpu: CpuSummary,
    pub memory: MemorySummary,
    pub temperature: TemperatureSummary,
    pub filesystem: FilesystemSummary,
    pub processes: ProcessSummary,
    pub system_stress: f64,
}

impl RunningSummary {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            last_crash_file: None,
            last_crash_time: None,
            cpu: CpuSummary::default(),
            memory: MemorySummary::default(),
            temperature: TemperatureSummary::default(),
            filesystem: FilesystemSummary::default(),
            processes: ProcessSummary::default(),
            system_stress: 0.0,
        }
    }

    /// Fold the latest sample into the summary and rescore it.
    pub fn update(&mut self, sample: &Sample) {
        self.timestamp = Utc::now();

        self.cpu = CpuSummary {
            user: sample.cpu.user,
            system: sample.cpu.sys,
            idle: sample.cpu.idle,
            load1: sample.load.one,
            load5: sample.load.five,
            load15: sample.load.fifteen,
        };

        self.memory = MemorySummary {
            total: sample.memory.total,
            used: sample.memory.used,
            free: sample.memory.free,
            used_percent: sample.memory.used_pct(),
        };

        self.update_temperature(sample);
        self.update_processes(sample);
        self.update_filesystem(sample);

        self.system_stress = summary_stress(self);
    }

    /// Point the summary at the most recent crash dump.
    pub fn record_crash(&mut self, path: impl Into<PathBuf>) {
        self.last_crash_file = Some(path.into());
        self.last_crash_time = Some(Utc::now());
    }

    /// Persist the summary as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_document(path, self)
    }

    fn update_temperature(&mut self, sample: &Sample) {
        let temperature = &mut self.temperature;

        for (name, &temp) in &sample.temperature {
            temperature
                .history
                .entry(name.clone())
                .or_insert_with(|| MetricSeries::new(SUMMARY_HISTORY_LEN))
                .push(temp);
        }

        temperature.sensors = sample
            .temperature
            .iter()
            .map(|(name, &value)| {
                let history = &temperature.history[name];
                let sensor = SensorSummary {
                    value,
                    location: sensor_location(name).to_string(),
                    max_temp: history.max().unwrap_or(value),
                    avg_temp: history.iter().sum::<f64>() / history.len() as f64,
                };
                (name.clone(), sensor)
            })
            .collect();

        let all: Vec<f64> = temperature
            .history
            .values()
            .flat_map(MetricSeries::iter)
            .collect();
        if all.is_empty() {
            temperature.max_temp = 0.0;
            temperature.avg_temp = 0.0;
        } else {
            temperature.max_temp = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            temperature.avg_temp = all.iter().sum::<f64>() / all.len() as f64;
        }
    }

    fn update_processes(&mut self, sample: &Sample) {
        let mut processes = ProcessSummary {
            total: sample.processes.len(),
            ..Default::default()
        };

        for process in &sample.processes {
            match process.state.as_str() {
                "R" => processes.running += 1,
                "S" => processes.sleeping += 1,
                "D" => processes.uninterruptible += 1,
                "Z" => processes.zombie += 1,
                _ => {}
            }
            if process.cpu_percent > HIGH_CPU_PERCENT {
                processes.high_cpu += 1;
                processes.high_cpu_processes.push(HighCpuProcess {
                    name: process.command.clone(),
                    cpu_percent: process.cpu_percent,
                });
            }
            if process.vsz_percent > HIGH_MEMORY_PERCENT {
                processes.high_memory += 1;
            }
        }

        self.processes = processes;
    }

    fn update_filesystem(&mut self, sample: &Sample) {
        for (mount, fs) in &sample.filesystem {
            let free_space = fs.free_pct();
            self.filesystem.partitions.insert(
                mount.clone(),
                PartitionSummary {
                    device: fs.device.clone(),
                    size: fs.size,
                    used: fs.used,
                    available: fs.available,
                    used_percent: fs.used_pct,
                    free_space_percent: free_space,
                    mount_point: mount.clone(),
                    critical: fs.critical,
                },
            );
            self.filesystem
                .history
                .entry(mount.clone())
                .or_insert_with(|| MetricSeries::new(SUMMARY_HISTORY_LEN))
                .push(free_space);
        }
    }
}

impl Default for RunningSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{FilesystemStats, Process};

    fn proc_with(state: &str, cpu_percent: f64, vsz_percent: f64) -> Process {
        Process {
            state: state.to_string(),
            cpu_percent,
            vsz_percent,
            command: format!("cmd-{}", state),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_projects_latest_values() {
        let mut sample = Sample::new();
        sample.cpu.user = 40.0;
        sample.cpu.sys = 10.0;
        sample.cpu.idle = 50.0;
        sample.load.one = 1.5;
        sample.memory.total = 1000;
        sample.memory.used = 600;
        sample.memory.free = 400;

        let mut summary = RunningSummary::new();
        summary.update(&sample);

        assert_eq!(summary.cpu.user, 40.0);
        assert_eq!(summary.cpu.system, 10.0);
        assert_eq!(summary.cpu.load1, 1.5);
        assert_eq!(summary.memory.used_percent, 60.0);
        // memory > 50 => +10
        assert_eq!(summary.system_stress, 10.0);
    }

    #[test]
    fn test_temperature_history_is_bounded() {
        let mut summary = RunningSummary::new();
        for i in 0..25 {
            let mut sample = Sample::new();
            sample.temperature.insert("lm75".to_string(), 30.0 + i as f64);
            summary.update(&sample);
        }

        let history = &summary.temperature.history["lm75"];
        assert_eq!(history.len(), SUMMARY_HISTORY_LEN);
        let sensor = &summary.temperature.sensors["lm75"];
        assert_eq!(sensor.location, "External I2C Sensor");
        assert_eq!(sensor.value, 54.0);
        assert_eq!(sensor.max_temp, 54.0);
        assert_eq!(sensor.avg_temp, 49.5);
        assert_eq!(summary.temperature.max_temp, 54.0);
        // max 54 => +10
        assert_eq!(summary.system_stress, 10.0);
    }

    #[test]
    fn test_no_sensors_scores_no_temperature_stress() {
        let mut summary = RunningSummary::new();
        summary.update(&Sample::new());
        assert_eq!(summary.temperature.max_temp, 0.0);
        assert_eq!(summary.temperature.avg_temp, 0.0);
        assert_eq!(summary.system_stress, 0.0);
    }

    #[test]
    fn test_process_counts() {
        let mut sample = Sample::new();
        sample.processes = vec![
            proc_with("R", 50.0, 1.0),
            proc_with("S", 0.0, 6.0),
            proc_with("S", 0.0, 0.0),
            proc_with("D", 0.0, 0.0),
            proc_with("Z", 0.0, 0.0),
            proc_with("I", 11.0, 0.0),
        ];

        let mut summary = RunningSummary::new();
        summary.update(&sample);

        let processes = &summary.processes;
        assert_eq!(processes.total, 6);
        assert_eq!(processes.running, 1);
        assert_eq!(processes.sleeping, 2);
        assert_eq!(processes.uninterruptible, 1);
        assert_eq!(processes.zombie, 1);
        assert_eq!(processes.high_cpu, 2);
        assert_eq!(processes.high_memory, 1);
        assert_eq!(processes.high_cpu_processes[0].name, "cmd-R");
    }

    #[test]
    fn test_filesystem_scored_in_same_tick() {
        let mut sample = Sample::new();
        sample.filesystem.insert(
            "/".to_string(),
            FilesystemStats {
                device: "/dev/root".to_string(),
                size: 100,
                used: 95,
                available: 5,
                used_pct: 95.0,
                critical: true,
            },
        );

        let mut summary = RunningSummary::new();
        summary.update(&sample);

        let root = &summary.filesystem.partitions["/"];
        assert_eq!(root.free_space_percent, 5.0);
        assert!(root.critical);
        assert_eq!(summary.filesystem.history["/"].len(), 1);
        assert_eq!(summary.system_stress, 40.0);
    }

    #[test]
    fn test_record_crash_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary/latest.json");

        let mut summary = RunningSummary::new();
        summary.save(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("lastCrashFile").is_none());
        assert!(value.get("systemStress").is_some());

        summary.record_crash("crashes/crash-1.json");
        summary.save(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["lastCrashFile"], "crashes/crash-1.json");
        assert!(value.get("lastCrashTime").is_some());
        assert!(value["processes"].get("highCpuProcesses").is_some());
        assert!(value["temperature"].get("maxTemp").is_some());
    }
}
