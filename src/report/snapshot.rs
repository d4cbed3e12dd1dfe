//! Snapshot and crash dump documents.

use crate::analysis::trend::{Trend, TrendEngine};
use crate::error::Result;
use crate::metrics::data::{Process, Sample};
use crate::report::write_document;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Used-space percentage above which a non-critical partition is listed as low.
pub const LOW_SPACE_USED_PCT: f64 = 80.0;

/// Storage totals over the latest sample's filesystems.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSummary {
    pub total_storage: u64,
    pub used_storage: u64,
    pub free_storage: u64,
    pub storage_usage_pct: f64,
    pub critical_partitions: Vec<String>,
    pub low_space_partitions: Vec<String>,
}

impl StorageSummary {
    pub fn from_sample(sample: &Sample) -> Self {
        let mut summary = Self::default();

        for (mount_point, fs) in &sample.filesystem {
            summary.total_storage += fs.size;
            summary.used_storage += fs.used;
            summary.free_storage += fs.available;

            if fs.critical {
                summary.critical_partitions.push(mount_point.clone());
            } else if fs.used_pct > LOW_SPACE_USED_PCT {
                summary.low_space_partitions.push(mount_point.clone());
            }
        }

        if summary.total_storage > 0 {
            summary.storage_usage_pct =
                summary.used_storage as f64 / summary.total_storage as f64 * 100.0;
        }

        summary
    }
}

/// Full-history diagnostic document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub timestamp: DateTime<Utc>,
    /// History with processes deduplicated by command
    pub stats: Vec<Sample>,
    pub trend: Option<Trend>,
    pub summary: StorageSummary,
}

impl SnapshotDocument {
    /// Capture the engine's current history and a freshly computed trend.
    pub fn capture(engine: &TrendEngine) -> Self {
        let stats: Vec<Sample> = engine
            .history()
            .map(|sample| Sample {
                processes: dedup_processes(&sample.processes),
                ..sample.clone()
            })
            .collect();
        let summary = stats
            .last()
            .map(StorageSummary::from_sample)
            .unwrap_or_default();

        Self {
            timestamp: Utc::now(),
            stats,
            trend: engine.analyze(),
            summary,
        }
    }
}

/// Collapse processes sharing a command into one entry.
///
/// A later entry replaces the kept one when it has a larger `vsz_percent`
/// or a larger `cpu_percent`; on a tie the first-seen entry stays. Output
/// keeps the order in which commands first appear.
pub fn dedup_processes(processes: &[Process]) -> Vec<Process> {
    let mut kept: Vec<Process> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for process in processes {
        match index.get(process.command.as_str()) {
            Some(&i) => {
                let existing = &kept[i];
                if process.vsz_percent > existing.vsz_percent
                    || process.cpu_percent > existing.cpu_percent
                {
                    kept[i] = process.clone();
                }
            }
            None => {
                index.insert(process.command.as_str(), kept.len());
                kept.push(process.clone());
            }
        }
    }

    kept
}

/// Write a snapshot of `engine` to `path`.
///
/// Used both for scheduled snapshots and crash dumps.
pub fn save_snapshot(engine: &TrendEngine, path: &Path) -> Result<()> {
    write_document(path, &SnapshotDocument::capture(engine))
}

impl TrendEngine {
    /// Write a snapshot of this engine to `path`.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        save_snapshot(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::trend::EngineConfig;
    use crate::metrics::data::FilesystemStats;

    fn process(pid: u32, command: &str, vsz_percent: f64, cpu_percent: f64) -> Process {
        Process {
            pid,
            command: command.to_string(),
            vsz_percent,
            cpu_percent,
            ..Default::default()
        }
    }

    fn partition(size: u64, used: u64, critical: bool) -> FilesystemStats {
        FilesystemStats {
            device: "/dev/mmcblk0p2".to_string(),
            size,
            used,
            available: size - used,
            used_pct: used as f64 / size as f64 * 100.0,
            critical,
        }
    }

    #[test]
    fn test_dedup_keeps_larger_vsz() {
        let deduped = dedup_processes(&[
            process(1, "worker", 3.0, 0.0),
            process(2, "worker", 8.0, 0.0),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].vsz_percent, 8.0);
        assert_eq!(deduped[0].pid, 2);
    }

    #[test]
    fn test_dedup_keeps_larger_cpu() {
        let deduped = dedup_processes(&[
            process(1, "worker", 5.0, 1.0),
            process(2, "worker", 5.0, 40.0),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].pid, 2);
    }

    #[test]
    fn test_dedup_tie_keeps_first_seen() {
        let deduped = dedup_processes(&[
            process(7, "sshd", 2.0, 0.5),
            process(9, "sshd", 2.0, 0.5),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].pid, 7);
    }

    #[test]
    fn test_dedup_preserves_first_appearance_order() {
        let deduped = dedup_processes(&[
            process(1, "b", 1.0, 0.0),
            process(2, "a", 1.0, 0.0),
            process(3, "b", 9.0, 0.0),
            process(4, "c", 1.0, 0.0),
        ]);
        let commands: Vec<&str> = deduped.iter().map(|p| p.command.as_str()).collect();
        assert_eq!(commands, vec!["b", "a", "c"]);
        assert_eq!(deduped[0].pid, 3);
    }

    #[test]
    fn test_storage_summary() {
        let mut sample = Sample::new();
        sample.filesystem.insert("/".to_string(), partition(1000, 950, true));
        sample.filesystem.insert("/boot".to_string(), partition(1000, 850, false));
        sample.filesystem.insert("/mnt/user".to_string(), partition(2000, 200, false));

        let summary = StorageSummary::from_sample(&sample);
        assert_eq!(summary.total_storage, 4000);
        assert_eq!(summary.used_storage, 2000);
        assert_eq!(summary.free_storage, 2000);
        assert_eq!(summary.storage_usage_pct, 50.0);
        assert_eq!(summary.critical_partitions, vec!["/".to_string()]);
        assert_eq!(summary.low_space_partitions, vec!["/boot".to_string()]);
    }

    #[test]
    fn test_storage_summary_without_filesystems() {
        let summary = StorageSummary::from_sample(&Sample::new());
        assert_eq!(summary, StorageSummary::default());
    }

    #[test]
    fn test_capture_deduplicates_every_sample() {
        let mut engine = TrendEngine::new(EngineConfig::with_window(3));
        for _ in 0..2 {
            let mut sample = Sample::new();
            sample.processes = vec![
                process(1, "kworker", 0.0, 0.0),
                process(2, "kworker", 0.0, 0.0),
                process(3, "init", 0.1, 0.0),
            ];
            engine.add_stats(sample);
        }

        let document = SnapshotDocument::capture(&engine);
        assert_eq!(document.stats.len(), 2);
        assert!(document.stats.iter().all(|s| s.processes.len() == 2));
        assert!(document.trend.is_some());
        assert_eq!(engine.history().next().unwrap().processes.len(), 3);
    }

    #[test]
    fn test_save_snapshot_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashes/crash-test.json");

        let mut engine = TrendEngine::default();
        let mut sample = Sample::new();
        sample.filesystem.insert("/".to_string(), partition(1000, 500, false));
        engine.add_stats(sample);
        engine.save_snapshot(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("timestamp").is_some());
        assert_eq!(value["stats"].as_array().unwrap().len(), 1);
        assert!(value["trend"].is_null());
        assert_eq!(value["summary"]["totalStorage"], 1000);
        assert_eq!(value["summary"]["storageUsagePct"], 50.0);
        assert!(value["summary"]["criticalPartitions"].as_array().unwrap().is_empty());
    }
}
