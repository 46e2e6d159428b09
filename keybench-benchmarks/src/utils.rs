//! Formatting helpers for console output

use std::time::Duration;

/// Elapsed time in the largest unit that keeps the value at or above one
pub fn format_duration(duration: Duration) -> String {
    const SCALES: [(f64, &str); 3] = [(1.0, "s"), (1e-3, "ms"), (1e-6, "µs")];

    let secs = duration.as_secs_f64();
    SCALES
        .iter()
        .find(|(scale, _)| secs >= *scale)
        .map(|(scale, unit)| format!("{:.2}{}", secs / scale, unit))
        .unwrap_or_else(|| format!("{}ns", duration.as_nanos()))
}

/// Byte count in binary units, e.g. an index size of `8.00 KiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let exponent = ((63 - bytes.leading_zeros()) / 10).min(UNITS.len() as u32) as usize;
    let value = bytes as f64 / (1u64 << (10 * exponent)) as f64;
    format!("{:.2} {}", value, UNITS[exponent - 1])
}

pub fn format_rate(ops_per_sec: f64) -> String {
    if ops_per_sec >= 1_000_000.0 {
        format!("{:.2}M ops/s", ops_per_sec / 1_000_000.0)
    } else if ops_per_sec >= 1_000.0 {
        format!("{:.2}K ops/s", ops_per_sec / 1_000.0)
    } else {
        format!("{:.1} ops/s", ops_per_sec)
    }
}

/// Signed percentage, e.g. `+12.5%`
pub fn format_percent_diff(diff: f64) -> String {
    format!("{:+.1}%", diff)
}

/// Format value with a fixed number of decimals, chosen per metric
pub fn format_metric_value(metric: &str, value: f64) -> String {
    if metric.ends_with("_percent") || metric == "error_rate" {
        format!("{:.2}", value)
    } else {
        format!("{:.0}", value)
    }
}
