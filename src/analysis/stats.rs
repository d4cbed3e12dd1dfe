//! Window statistics and the two anomaly tests.

/// Population mean and standard deviation. An empty slice yields `(0, 0)`.
pub fn mean_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    (mean, variance.sqrt())
}

/// Ordinary least-squares slope of value against 0-based sample index.
///
/// Fewer than two points have no slope and yield 0.
pub fn slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x)
}

/// True when the latest value lies more than `threshold` standard deviations
/// from `mean`. A zero deviation never flags.
pub fn is_zscore_anomaly(values: &[f64], mean: f64, std_dev: f64, threshold: f64) -> bool {
    let Some(&last) = values.last() else {
        return false;
    };
    if std_dev == 0.0 {
        return false;
    }

    ((last - mean) / std_dev).abs() > threshold
}

/// True when the magnitude of `slope` exceeds `threshold`.
pub fn is_trend_anomaly(slope: f64, threshold: f64) -> bool {
    slope.abs() > threshold
}
