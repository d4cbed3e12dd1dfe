//! Composite 0-100 stress scoring.
//!
//! Two independent strategies share the same rule shape: each factor
//! contributes the points of its single highest matching tier, factors add
//! up, and the total saturates at 100. [`trend_stress`] scores windowed
//! statistics; [`summary_stress`] scores latest-only values with its own
//! tiers. They are deliberately not unified.

use crate::analysis::trend::Trend;
use crate::report::summary::RunningSummary;

/// Upper bound of every stress score.
pub const MAX_STRESS: f64 = 100.0;

/// Points for the first `(limit, points)` tier whose limit `value` exceeds.
/// Tiers must be ordered from the highest limit down.
fn tier_above(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(limit, _)| value > *limit)
        .map_or(0.0, |&(_, points)| points)
}

/// Points for the first `(limit, points)` tier whose limit `value` is under.
/// Tiers must be ordered from the lowest limit up.
fn tier_below(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(limit, _)| value < *limit)
        .map_or(0.0, |&(_, points)| points)
}

/// Points by mount point importance.
#[derive(Debug, Clone, Copy)]
struct MountTiers {
    root: f64,
    boot: f64,
    other: f64,
}

impl MountTiers {
    fn points(&self, mount_point: &str) -> f64 {
        match mount_point {
            "/" => self.root,
            "/boot" => self.boot,
            _ => self.other,
        }
    }
}

const TREND_CPU: [(f64, f64); 2] = [(20.0, 20.0), (10.0, 10.0)];
const TREND_MEMORY: [(f64, f64); 3] = [(90.0, 30.0), (80.0, 20.0), (70.0, 10.0)];
const TREND_PROCESSES: [(f64, f64); 2] = [(100.0, 20.0), (50.0, 10.0)];
const TREND_HOT: [(f64, f64); 2] = [(60.0, 20.0), (50.0, 10.0)];
const TREND_COLD: [(f64, f64); 2] = [(-20.0, 20.0), (-10.0, 10.0)];
const TREND_PARTITION_CRITICAL: MountTiers = MountTiers { root: 30.0, boot: 25.0, other: 15.0 };
const TREND_PARTITION_LOW: MountTiers = MountTiers { root: 15.0, boot: 10.0, other: 5.0 };

/// Stress from a windowed [`Trend`].
pub fn trend_stress(trend: &Trend) -> f64 {
    let mut risk = 0.0;

    risk += tier_above(trend.cpu_usage.mean, &TREND_CPU);
    risk += tier_above(trend.memory_usage.mean, &TREND_MEMORY);
    risk += tier_above(trend.process_count.mean, &TREND_PROCESSES);

    if trend.process_count.anomaly {
        risk += 20.0;
    }
    if trend.cpu_usage.anomaly {
        risk += 20.0;
    }

    let temperature = &trend.temperature;
    if temperature.threshold_exceeded {
        risk += 50.0;
    } else {
        let hot = tier_above(temperature.max, &TREND_HOT);
        risk += if hot > 0.0 {
            hot
        } else {
            tier_below(temperature.max, &TREND_COLD)
        };
        // Trend-only signal, weighted below a hard breach
        if temperature.anomaly {
            risk += 15.0;
        }
    }

    let filesystem = &trend.filesystem;
    if filesystem.critical {
        risk += 40.0;
    } else if filesystem.anomaly {
        risk += 20.0;
    }

    for (mount_point, partition) in &filesystem.partitions {
        if partition.critical {
            risk += TREND_PARTITION_CRITICAL.points(mount_point);
        } else if partition.current < 20.0 {
            risk += TREND_PARTITION_LOW.points(mount_point);
        }

        if partition.slope < -1.0 {
            risk += 15.0;
        } else if partition.slope < -0.5 {
            risk += 5.0;
        }
    }

    risk.min(MAX_STRESS)
}

const SUMMARY_CPU: [(f64, f64); 3] = [(90.0, 30.0), (70.0, 20.0), (50.0, 10.0)];
const SUMMARY_MEMORY: [(f64, f64); 3] = [(90.0, 30.0), (70.0, 20.0), (50.0, 10.0)];
const SUMMARY_LOAD: [(f64, f64); 3] = [(10.0, 30.0), (5.0, 20.0), (2.0, 10.0)];
const SUMMARY_HOT: [(f64, f64); 3] = [(70.0, 30.0), (60.0, 20.0), (50.0, 10.0)];
const SUMMARY_COLD: [(f64, f64); 2] = [(-20.0, 20.0), (-10.0, 10.0)];
const SUMMARY_PARTITION_CRITICAL: MountTiers = MountTiers { root: 40.0, boot: 30.0, other: 20.0 };
const SUMMARY_PARTITION_LOW: MountTiers = MountTiers { root: 20.0, boot: 15.0, other: 10.0 };

/// Stress from the latest-only values of a [`RunningSummary`].
pub fn summary_stress(summary: &RunningSummary) -> f64 {
    let mut stress = 0.0;

    stress += tier_above(summary.cpu.user + summary.cpu.system, &SUMMARY_CPU);
    stress += tier_above(summary.memory.used_percent, &SUMMARY_MEMORY);
    stress += tier_above(summary.cpu.load1, &SUMMARY_LOAD);

    let max_temp = summary.temperature.max_temp;
    let hot = tier_above(max_temp, &SUMMARY_HOT);
    stress += if hot > 0.0 {
        hot
    } else {
        tier_below(max_temp, &SUMMARY_COLD)
    };

    if summary.processes.uninterruptible > 5 {
        stress += 20.0;
    }
    if summary.processes.high_cpu > 10 {
        stress += 20.0;
    }

    for (mount_point, partition) in &summary.filesystem.partitions {
        if partition.free_space_percent < 10.0 {
            stress += SUMMARY_PARTITION_CRITICAL.points(mount_point);
        } else if partition.free_space_percent < 20.0 {
            stress += SUMMARY_PARTITION_LOW.points(mount_point);
        }
    }

    stress.min(MAX_STRESS)
}
