//! Point-in-time observations about the latest sample.

use crate::metrics::data::{Process, Sample};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

/// One observation with a short category label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: String,
    pub description: String,
    pub severity: Severity,
}

impl Insight {
    fn new(kind: &str, description: String, severity: Severity) -> Self {
        Self {
            kind: kind.to_string(),
            description,
            severity,
        }
    }
}

/// Number of top CPU consumers inspected for per-process insights.
const TOP_PROCESSES: usize = 5;

fn top_by_cpu(processes: &[Process], count: usize) -> Vec<&Process> {
    let mut sorted: Vec<&Process> = processes.iter().collect();
    sorted.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    sorted.truncate(count);
    sorted
}

/// Observations about `sample` on a host with `cpu_count` logical CPUs.
pub fn insights(sample: &Sample, cpu_count: usize) -> Vec<Insight> {
    let mut insights = Vec::new();

    if sample.cpu_busy() > 80.0 {
        insights.push(Insight::new(
            "High CPU Usage",
            format!(
                "CPU usage is high: {:.1}% user, {:.1}% system",
                sample.cpu.user, sample.cpu.sys
            ),
            Severity::Warning,
        ));
    }

    let memory_pct = sample.memory_used_pct();
    if memory_pct > 90.0 {
        insights.push(Insight::new(
            "High Memory Usage",
            format!("Memory usage is high: {:.1}%", memory_pct),
            Severity::Warning,
        ));
    }

    if sample.load.one > cpu_count as f64 * 2.0 {
        insights.push(Insight::new(
            "High System Load",
            format!("System load is high: {:.2} (1min)", sample.load.one),
            Severity::Warning,
        ));
    }

    for process in top_by_cpu(&sample.processes, TOP_PROCESSES) {
        if process.cpu_percent > 50.0 {
            insights.push(Insight::new(
                "High CPU Process",
                format!(
                    "Process {} (PID: {}) using {:.1}% CPU",
                    process.command, process.pid, process.cpu_percent
                ),
                Severity::Info,
            ));
        }
        if process.vsz_percent > 10.0 {
            insights.push(Insight::new(
                "High Memory Process",
                format!(
                    "Process {} (PID: {}) using {:.1}% memory",
                    process.command, process.pid, process.vsz_percent
                ),
                Severity::Info,
            ));
        }
    }

    insights
}

/// A CPU spike between two consecutive samples, if busy CPU rose by more
/// than 20 points.
pub fn insight_for_spike(previous: &Sample, current: &Sample) -> Option<Insight> {
    let delta = current.cpu_busy() - previous.cpu_busy();
    (delta > 20.0).then(|| {
        Insight::new(
            "CPU Usage Spike",
            format!("CPU usage increased by {:.1}%", delta),
            Severity::Warning,
        )
    })
}
