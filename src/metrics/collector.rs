//! Host sample acquisition using sysinfo and direct /proc access.

use crate::error::{MonitorError, Result};
use crate::metrics::{
    data::*,
    traits::MetricsProvider,
};
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;
use sysinfo::{Components, Disks, ProcessStatus, System, Users};
use tokio::time;

/// Mount points watched when no explicit list is configured.
pub const DEFAULT_WATCHED_MOUNTS: [&str; 4] = ["/", "/boot", "/mnt/user", "/mnt/config"];

/// Used-space percentage above which the collector flags a filesystem critical.
pub const FILESYSTEM_CRITICAL_USED_PCT: f64 = 90.0;

/// Options for the acquisition side of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Report fixed sensor readings when the host exposes none
    pub mock_temperature: bool,
    /// Mount points to report; `None` reports every disk
    pub watched_mounts: Option<Vec<String>>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            mock_temperature: false,
            watched_mounts: Some(DEFAULT_WATCHED_MOUNTS.iter().map(|m| m.to_string()).collect()),
        }
    }
}

impl AcquisitionConfig {
    /// Enable or disable mock temperature readings.
    pub fn with_mock_temperature(mut self, enabled: bool) -> Self {
        self.mock_temperature = enabled;
        self
    }

    /// Restrict filesystem reporting to the given mount points.
    pub fn with_watched_mounts(mut self, mounts: Option<Vec<String>>) -> Self {
        self.watched_mounts = mounts;
        self
    }

    fn watches(&self, mount_point: &str) -> bool {
        match &self.watched_mounts {
            Some(mounts) => mounts.iter().any(|m| m == mount_point),
            None => true,
        }
    }
}

/// Raw jiffy counters from the aggregate `cpu` line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Percentages of CPU time spent in each state between `prev` and `self`.
    pub fn percentages_since(&self, prev: &CpuTimes) -> CpuStats {
        let total = self.total().saturating_sub(prev.total());
        if total == 0 {
            return CpuStats {
                idle: 100.0,
                ..Default::default()
            };
        }
        let pct = |now: u64, before: u64| now.saturating_sub(before) as f64 / total as f64 * 100.0;
        CpuStats {
            user: pct(self.user, prev.user),
            sys: pct(self.system, prev.system),
            nice: pct(self.nice, prev.nice),
            idle: pct(self.idle, prev.idle),
            io: pct(self.iowait, prev.iowait),
            irq: pct(self.irq, prev.irq),
            sirq: pct(self.softirq, prev.softirq),
        }
    }
}

/// Parse the aggregate `cpu` line of /proc/stat.
pub fn parse_proc_stat(content: &str) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| MonitorError::parse_error("no aggregate cpu line in /proc/stat"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| MonitorError::parse_error(format!("bad /proc/stat field: {}", e)))?;

    if fields.len() < 7 {
        return Err(MonitorError::parse_error(format!(
            "expected at least 7 cpu fields, found {}",
            fields.len()
        )));
    }

    Ok(CpuTimes {
        user: fields[0],
        nice: fields[1],
        system: fields[2],
        idle: fields[3],
        iowait: fields[4],
        irq: fields[5],
        softirq: fields[6],
        steal: fields.get(7).copied().unwrap_or(0),
    })
}

/// Parse /proc/loadavg.
pub fn parse_loadavg(content: &str) -> Result<LoadAverage> {
    let mut parts = content.split_whitespace().map(|part| {
        part.parse::<f64>()
            .map_err(|_| MonitorError::parse_error(format!("bad /proc/loadavg field: {:?}", part)))
    });
    let mut next = || {
        parts
            .next()
            .unwrap_or_else(|| Err(MonitorError::parse_error("truncated /proc/loadavg")))
    };

    Ok(LoadAverage {
        one: next()?,
        five: next()?,
        fifteen: next()?,
    })
}

/// Parse shared, buffers and cached byte counts out of /proc/meminfo.
pub fn parse_meminfo(content: &str) -> (u64, u64, u64) {
    let mut shared = 0;
    let mut buffers = 0;
    let mut cached = 0;

    for line in content.lines() {
        if let Some((key, value_str)) = line.split_once(':') {
            if let Some(Ok(kb)) = value_str.split_whitespace().next().map(str::parse::<u64>) {
                let bytes = kb * 1024;
                match key {
                    "Shmem" => shared = bytes,
                    "Buffers" => buffers = bytes,
                    "Cached" => cached = bytes,
                    _ => {}
                }
            }
        }
    }

    (shared, buffers, cached)
}

/// Parse priority and nice out of /proc/<pid>/stat.
///
/// The command field may contain spaces and parentheses, so fields are
/// counted from the last closing parenthesis.
pub fn parse_priority_nice(content: &str) -> Option<(i32, i32)> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let priority = fields.get(15)?.parse().ok()?;
    let nice = fields.get(16)?.parse().ok()?;
    Some((priority, nice))
}

fn read_and_parse<T>(path: &str, parse: impl Fn(&str) -> Result<T>) -> Result<T> {
    let content = fs::read_to_string(path)?;
    parse(&content)
}

fn state_letter(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "R",
        ProcessStatus::Sleep => "S",
        ProcessStatus::UninterruptibleDiskSleep => "D",
        ProcessStatus::Zombie => "Z",
        ProcessStatus::Stop | ProcessStatus::Tracing => "T",
        ProcessStatus::Idle => "I",
        ProcessStatus::Dead => "X",
        _ => "?",
    }
}

fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Host sample collector.
pub struct SystemCollector {
    config: AcquisitionConfig,
    system: System,
    disks: Disks,
    components: Components,
    users: Users,
    last_cpu_times: Option<CpuTimes>,
}

impl SystemCollector {
    /// Create a collector with default acquisition options.
    pub fn new() -> Result<Self> {
        Self::with_config(AcquisitionConfig::default())
    }

    /// Create a collector with explicit acquisition options.
    pub fn with_config(config: AcquisitionConfig) -> Result<Self> {
        let mut system = System::new_all();
        system.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let components = Components::new_with_refreshed_list();
        let users = Users::new_with_refreshed_list();

        if system.cpus().is_empty() {
            return Err(MonitorError::collection_error("No CPU information available"));
        }

        let last_cpu_times = fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|content| parse_proc_stat(&content).ok());

        Ok(Self {
            config,
            system,
            disks,
            components,
            users,
            last_cpu_times,
        })
    }

    /// Number of logical CPUs.
    pub fn cpu_count(&self) -> usize {
        self.system.cpus().len()
    }

    /// Acquisition options in use.
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    fn refresh(&mut self) {
        self.system.refresh_all();
        self.disks.refresh();
        self.components.refresh();
    }

    fn collect_cpu(&mut self) -> CpuStats {
        let current = match read_and_parse("/proc/stat", parse_proc_stat) {
            Ok(times) => Some(times),
            Err(err) => {
                tracing::debug!("CPU times unavailable: {}", err);
                None
            }
        };

        match (current, self.last_cpu_times) {
            (Some(now), Some(prev)) => {
                self.last_cpu_times = Some(now);
                now.percentages_since(&prev)
            }
            (Some(now), None) => {
                self.last_cpu_times = Some(now);
                now.percentages_since(&CpuTimes::default())
            }
            _ => {
                // Without /proc/stat only the aggregate figure is known
                let busy = self.system.global_cpu_usage() as f64;
                CpuStats {
                    user: busy,
                    idle: 100.0 - busy,
                    ..Default::default()
                }
            }
        }
    }

    fn collect_memory(&self) -> MemoryStats {
        let (shared, buffers, cached) = fs::read_to_string("/proc/meminfo")
            .map(|content| parse_meminfo(&content))
            .unwrap_or_default();

        MemoryStats {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            free: self.system.free_memory(),
            shared,
            buffers,
            cached,
        }
    }

    fn collect_load(&self) -> LoadAverage {
        read_and_parse("/proc/loadavg", parse_loadavg)
            .unwrap_or_else(|err| {
                tracing::debug!("Falling back to sysinfo load average: {}", err);
                let load = System::load_average();
                LoadAverage {
                    one: load.one,
                    five: load.five,
                    fifteen: load.fifteen,
                }
            })
    }

    fn collect_processes(&self) -> Vec<Process> {
        let total_memory = self.system.total_memory();
        let pct = |bytes: u64| {
            if total_memory > 0 {
                bytes as f64 / total_memory as f64 * 100.0
            } else {
                0.0
            }
        };

        let mut processes: Vec<Process> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let (priority, nice) = fs::read_to_string(format!("/proc/{}/stat", pid.as_u32()))
                    .ok()
                    .and_then(|content| parse_priority_nice(&content))
                    .unwrap_or((0, 0));
                let user = process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|user| user.name().to_string())
                    .unwrap_or_default();

                Process {
                    pid: pid.as_u32(),
                    ppid: process.parent().map(|p| p.as_u32()).unwrap_or(0),
                    user,
                    priority,
                    nice,
                    vsz: process.virtual_memory(),
                    vsz_percent: pct(process.virtual_memory()),
                    rss: process.memory(),
                    state: state_letter(process.status()).to_string(),
                    cpu_percent: process.cpu_usage() as f64,
                    mem_percent: pct(process.memory()),
                    time: format_elapsed(process.run_time()),
                    command: process.name().to_string_lossy().into_owned(),
                }
            })
            .collect();

        processes.sort_by_key(|p| p.pid);
        processes
    }

    fn collect_temperature(&self) -> BTreeMap<String, f64> {
        let mut sensors: BTreeMap<String, f64> = self
            .components
            .list()
            .iter()
            .map(|component| (component.label().to_string(), component.temperature() as f64))
            .filter(|(_, temp)| temp.is_finite())
            .collect();

        if sensors.is_empty() {
            if self.config.mock_temperature {
                sensors.insert("cpu".to_string(), 45.5);
                sensors.insert("board".to_string(), 38.2);
            } else {
                tracing::debug!("No temperature sensors detected");
            }
        }

        sensors
    }

    fn collect_filesystem(&self) -> BTreeMap<String, FilesystemStats> {
        self.disks
            .iter()
            .filter_map(|disk| {
                let mount_point = disk.mount_point().to_string_lossy().to_string();
                if !self.config.watches(&mount_point) {
                    return None;
                }

                let size = disk.total_space();
                let available = disk.available_space();
                let used = size.saturating_sub(available);
                let used_pct = if size > 0 {
                    used as f64 / size as f64 * 100.0
                } else {
                    0.0
                };

                Some((
                    mount_point,
                    FilesystemStats {
                        device: disk.name().to_string_lossy().to_string(),
                        size,
                        used,
                        available,
                        used_pct,
                        critical: used_pct > FILESYSTEM_CRITICAL_USED_PCT,
                    },
                ))
            })
            .collect()
    }
}

impl MetricsProvider for SystemCollector {
    async fn collect_sample(&mut self) -> Result<Sample> {
        self.refresh();

        let mut sample = Sample::new();
        sample.cpu = self.collect_cpu();
        sample.memory = self.collect_memory();
        sample.load = self.collect_load();
        sample.processes = self.collect_processes();
        sample.temperature = self.collect_temperature();
        sample.filesystem = self.collect_filesystem();

        Ok(sample)
    }

    async fn start_stream(&mut self, interval_ms: u64) -> Result<BoxStream<'static, Sample>> {
        let interval = Duration::from_millis(interval_ms);
        let collector = SystemCollector::with_config(self.config.clone())?;

        let stream = stream::unfold(
            (collector, time::interval(interval)),
            |(mut collector, mut interval)| async move {
                interval.tick().await;
                match collector.collect_sample().await {
                    Ok(sample) => Some((sample, (collector, interval))),
                    Err(err) => {
                        tracing::error!("Failed to collect host sample: {}", err);
                        None
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "cpu  100 10 50 800 20 5 15 0 0 0\ncpu0 50 5 25 400 10 2 8 0 0 0\n";

    #[test]
    fn test_parse_proc_stat() {
        let times = parse_proc_stat(PROC_STAT).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.nice, 10);
        assert_eq!(times.system, 50);
        assert_eq!(times.idle, 800);
        assert_eq!(times.softirq, 15);
    }

    #[test]
    fn test_cpu_percentages_between_readings() {
        let prev = parse_proc_stat(PROC_STAT).unwrap();
        let now = CpuTimes {
            user: prev.user + 30,
            system: prev.system + 10,
            idle: prev.idle + 60,
            ..prev
        };
        let cpu = now.percentages_since(&prev);
        assert!((cpu.user - 30.0).abs() < 1e-9);
        assert!((cpu.sys - 10.0).abs() < 1e-9);
        assert!((cpu.idle - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percentages_without_progress() {
        let times = parse_proc_stat(PROC_STAT).unwrap();
        let cpu = times.percentages_since(&times);
        assert_eq!(cpu.idle, 100.0);
        assert_eq!(cpu.user, 0.0);
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.five, 0.58);
        assert_eq!(load.fifteen, 0.59);
        assert!(matches!(parse_loadavg("garbage"), Err(MonitorError::Parse(_))));
        assert!(matches!(parse_loadavg("0.5 0.4"), Err(MonitorError::Parse(_))));
    }

    #[test]
    fn test_parse_proc_stat_rejects_malformed_input() {
        assert!(matches!(parse_proc_stat("cpu0 1 2 3\n"), Err(MonitorError::Parse(_))));
        assert!(matches!(parse_proc_stat("cpu  1 2 3\n"), Err(MonitorError::Parse(_))));
        assert!(matches!(parse_proc_stat("cpu  1 2 x 4 5 6 7\n"), Err(MonitorError::Parse(_))));
    }

    #[test]
    fn test_parse_meminfo() {
        let content =
            "MemTotal:  8000 kB\nBuffers:   100 kB\nCached:    200 kB\nShmem:     30 kB\n";
        let (shared, buffers, cached) = parse_meminfo(content);
        assert_eq!(shared, 30 * 1024);
        assert_eq!(buffers, 100 * 1024);
        assert_eq!(cached, 200 * 1024);
    }

    #[test]
    fn test_parse_priority_nice_with_odd_command() {
        let content = "1234 (my (odd) cmd) S 1 1234 1234 0 -1 4194560 \
                       100 0 0 0 5 3 0 0 20 -5 1 0 100 1000 50";
        assert_eq!(parse_priority_nice(content), Some((20, -5)));
    }

    #[test]
    fn test_watched_mounts() {
        let config = AcquisitionConfig::default();
        assert!(config.watches("/"));
        assert!(config.watches("/boot"));
        assert!(!config.watches("/run/user/1000"));

        let all = config.with_watched_mounts(None);
        assert!(all.watches("/run/user/1000"));
    }

    #[tokio::test]
    async fn test_sample_collection() {
        let mut collector = SystemCollector::new().unwrap();
        let sample = collector.collect_sample().await.unwrap();
        assert!(sample.memory.total > 0);
        assert!(!sample.processes.is_empty());
    }

    #[tokio::test]
    async fn test_mock_temperature_fills_empty_sensor_map() {
        let config = AcquisitionConfig::default().with_mock_temperature(true);
        let mut collector = SystemCollector::with_config(config).unwrap();
        let sample = collector.collect_sample().await.unwrap();
        assert!(!sample.temperature.is_empty());
    }
}
