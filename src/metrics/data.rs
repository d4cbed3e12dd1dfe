//! Data structures for host metric samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete observation of the host at a point in time.
///
/// Samples are immutable once produced by a collector; the engine and the
/// running summary only ever read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Capture time
    pub time: DateTime<Utc>,
    /// CPU time breakdown in percent
    pub cpu: CpuStats,
    /// Memory usage in bytes
    pub memory: MemoryStats,
    /// Load averages (1, 5, 15 minutes)
    pub load: LoadAverage,
    /// Process table in collection order
    pub processes: Vec<Process>,
    /// Sensor name -> temperature in Celsius
    pub temperature: BTreeMap<String, f64>,
    /// Mount point -> filesystem usage
    pub filesystem: BTreeMap<String, FilesystemStats>,
}

/// CPU time breakdown, each field a percentage of total CPU time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub user: f64,
    pub sys: f64,
    pub nice: f64,
    pub idle: f64,
    pub io: f64,
    pub irq: f64,
    pub sirq: f64,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub shared: u64,
    pub buffers: u64,
    pub cached: u64,
}

/// System load averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// One entry of the process table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub pid: u32,
    pub ppid: u32,
    pub user: String,
    pub priority: i32,
    pub nice: i32,
    /// Virtual size in bytes
    pub vsz: u64,
    /// Virtual size as a percentage of total memory
    pub vsz_percent: f64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Single-letter scheduler state (R, S, D, Z, T, I, ...)
    pub state: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    /// Accumulated CPU time, formatted `M:SS`
    pub time: String,
    pub command: String,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemStats {
    /// Backing device (e.g., "/dev/mmcblk0p2")
    pub device: String,
    /// Total size in bytes
    pub size: u64,
    /// Used space in bytes
    pub used: u64,
    /// Available space in bytes
    pub available: u64,
    /// Used space percentage (0.0 to 100.0)
    pub used_pct: f64,
    /// Set by the collector when used space exceeds 90%
    pub critical: bool,
}

impl Sample {
    /// Create an empty sample stamped with the current time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create an empty sample stamped with the given time.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            time,
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            load: LoadAverage::default(),
            processes: Vec::new(),
            temperature: BTreeMap::new(),
            filesystem: BTreeMap::new(),
        }
    }

    /// Busy CPU percentage (user + system).
    pub fn cpu_busy(&self) -> f64 {
        self.cpu.user + self.cpu.sys
    }

    /// Used memory as a percentage of total, 0 when total is unknown.
    pub fn memory_used_pct(&self) -> f64 {
        self.memory.used_pct()
    }
}

impl Default for Sample {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStats {
    /// Used memory as a percentage of total, 0 when total is unknown.
    pub fn used_pct(&self) -> f64 {
        if self.total > 0 {
            self.used as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl FilesystemStats {
    /// Free space percentage derived from `used_pct`.
    pub fn free_pct(&self) -> f64 {
        100.0 - self.used_pct
    }
}
