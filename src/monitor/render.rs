//! Human-readable rendering of samples for logs and the terminal.

use crate::metrics::data::Sample;
use crate::report::summary::RunningSummary;
use std::collections::BTreeMap;
use std::fmt::Write;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: u64 = 1024 * 1024;

/// Per-sensor lines with the summary's rolling max and average.
pub fn temperature_block(summary: &RunningSummary) -> String {
    let temperature = &summary.temperature;
    if temperature.sensors.is_empty() {
        return "  No temperature sensors detected\n".to_string();
    }

    let mut out = String::new();
    for (name, sensor) in &temperature.sensors {
        let _ = writeln!(
            out,
            "  {} ({}): Current: {:.1}°C, Max: {:.1}°C, Avg: {:.1}°C",
            name, sensor.location, sensor.value, sensor.max_temp, sensor.avg_temp
        );
    }
    let _ = writeln!(
        out,
        "  Overall: Max: {:.1}°C, Avg: {:.1}°C",
        temperature.max_temp, temperature.avg_temp
    );
    out
}

/// Per-partition usage lines with an OK/WARNING/CRITICAL status.
pub fn filesystem_block(sample: &Sample) -> String {
    if sample.filesystem.is_empty() {
        return "  No filesystem information available\n".to_string();
    }

    let mut out = String::new();
    for (mount, fs) in &sample.filesystem {
        let status = if fs.critical {
            "CRITICAL"
        } else if fs.free_pct() < 20.0 {
            "WARNING"
        } else {
            "OK"
        };
        let _ = writeln!(
            out,
            "  {} ({}): {:.1}% used, {:.2} GB free [{}]",
            mount,
            fs.device,
            fs.used_pct,
            fs.available as f64 / GIB,
            status
        );
    }
    out
}

/// Processes above 5% virtual size, one line per command with its largest share.
pub fn high_memory_block(sample: &Sample) -> String {
    let mut by_command: BTreeMap<&str, f64> = BTreeMap::new();
    for process in sample.processes.iter().filter(|p| p.vsz_percent > 5.0) {
        let entry = by_command.entry(process.command.as_str()).or_insert(0.0);
        *entry = entry.max(process.vsz_percent);
    }

    let mut out = String::new();
    for (command, pct) in by_command {
        let _ = writeln!(out, "  {}: {:.1}%", command, pct);
    }
    out
}

/// The full per-tick stats block.
pub fn stats_block(sample: &Sample, summary: &RunningSummary) -> String {
    let mut out = String::new();
    let memory = &summary.memory;
    let processes = &summary.processes;

    let _ = writeln!(out, "=== System Stats at {} ===", summary.timestamp.to_rfc3339());
    let _ = writeln!(
        out,
        "CPU: {:.1}% user, {:.1}% system, {:.1}% idle",
        summary.cpu.user, summary.cpu.system, summary.cpu.idle
    );
    let _ = writeln!(
        out,
        "Memory: {:.1}% used (Total: {} MB, Used: {} MB, Free: {} MB)",
        memory.used_percent,
        memory.total / MIB,
        memory.used / MIB,
        memory.free / MIB
    );
    let _ = writeln!(
        out,
        "Load: {:.2} (1min), {:.2} (5min), {:.2} (15min)",
        sample.load.one, sample.load.five, sample.load.fifteen
    );
    let _ = writeln!(out, "System Stress: {:.1}%", summary.system_stress);
    let _ = writeln!(
        out,
        "Process States: S: {}, R: {}, D: {}, Z: {}",
        processes.sleeping, processes.running, processes.uninterruptible, processes.zombie
    );
    out.push_str("Temperature:\n");
    out.push_str(&temperature_block(summary));
    out.push_str("Filesystem:\n");
    out.push_str(&filesystem_block(sample));
    out.push_str("High Memory Usage Processes (>5%):\n");
    out.push_str(&high_memory_block(sample));
    let _ = writeln!(out, "Total CPU Usage: {:.1}%", sample.cpu_busy());
    let _ = writeln!(out, "Total Memory Usage: {:.1}%", sample.memory_used_pct());
    out.push_str("=============================");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{FilesystemStats, Process};

    #[test]
    fn test_empty_blocks() {
        let sample = Sample::new();
        let summary = RunningSummary::new();
        assert!(temperature_block(&summary).contains("No temperature sensors"));
        assert!(filesystem_block(&sample).contains("No filesystem information"));
        assert!(high_memory_block(&sample).is_empty());
    }

    #[test]
    fn test_filesystem_status() {
        let mut sample = Sample::new();
        sample.filesystem.insert(
            "/".to_string(),
            FilesystemStats {
                device: "/dev/root".to_string(),
                used_pct: 85.0,
                ..Default::default()
            },
        );
        assert!(filesystem_block(&sample).contains("[WARNING]"));
    }

    #[test]
    fn test_high_memory_dedup() {
        let mut sample = Sample::new();
        for pct in [6.0, 9.0, 2.0] {
            sample.processes.push(Process {
                command: "java".to_string(),
                vsz_percent: pct,
                ..Default::default()
            });
        }
        assert_eq!(high_memory_block(&sample), "  java: 9.0%\n");
    }

    #[test]
    fn test_stats_block_sections() {
        let mut sample = Sample::new();
        sample.temperature.insert("cpu".to_string(), 41.0);
        sample.cpu.user = 30.0;
        sample.cpu.idle = 70.0;
        sample.memory.total = 4 * 1024 * MIB;
        sample.memory.used = 1024 * MIB;
        let mut summary = RunningSummary::new();
        summary.update(&sample);

        let block = stats_block(&sample, &summary);
        assert!(block.contains("System Stress: 0.0%"));
        assert!(block.contains("cpu (Unknown): Current: 41.0°C"));
        assert!(block.contains("Filesystem:"));
        assert!(block.contains("Total CPU Usage: 30.0%"));
        assert!(block.contains("Total Memory Usage: 25.0%\n"));
        assert!(block.ends_with("============================="));
    }
}
