//! Result tables and file exports
//!
//! Renders the per-variant statistics and baseline comparisons as
//! fixed-width tables and writes the experiment out as CSV and JSON.

use crate::analysis::{MetricComparison, Stats, VariantComparator};
use crate::config::BenchmarkConfig;
use crate::utils::{format_metric_value, format_percent_diff};
use chrono::{DateTime, Utc};
use keybench_common::{KeybenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{create_dir_all, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Metrics shown in the console report, with their table titles
pub const DISPLAY_METRICS: &[(&str, &str)] = &[
    ("throughput", "Throughput (ops/sec)"),
    ("p50_latency_us", "Latency P50 (µs)"),
    ("p99_latency_us", "Latency P99 (µs)"),
    ("error_rate", "Error Rate"),
    ("index_page_splits", "Page Splits"),
    ("index_fragmentation_percent", "Index Fragmentation (%)"),
    ("index_density_percent", "Leaf Density (%)"),
    ("index_size_bytes", "Index Size (bytes)"),
];

/// Everything one `run` produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: BenchmarkConfig,
    /// Variant name to metric name to statistics
    pub variants: BTreeMap<String, BTreeMap<String, Stats>>,
    pub comparisons: Vec<MetricComparison>,
}

impl Experiment {
    /// Variants in configured order, then any extras
    pub fn variant_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self
            .config
            .variants
            .iter()
            .map(String::as_str)
            .filter(|v| self.variants.contains_key(*v))
            .collect();
        for name in self.variants.keys() {
            if !order.contains(&name.as_str()) {
                order.push(name);
            }
        }
        order
    }

    pub fn baseline(&self) -> &str {
        &self.config.baseline
    }

    /// Recompute the comparisons against a different baseline variant
    pub fn rebaseline(&mut self, baseline: &str) -> Result<()> {
        self.comparisons = VariantComparator::new(baseline).compare_all(&self.variants)?;
        self.config.baseline = baseline.to_string();
        Ok(())
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .variants
            .values()
            .flat_map(|metrics| metrics.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn stats(&self, variant: &str, metric: &str) -> Option<&Stats> {
        self.variants.get(variant).and_then(|m| m.get(metric))
    }

    pub fn comparisons_for(&self, metric: &str) -> impl Iterator<Item = &MetricComparison> + '_ {
        let metric = metric.to_string();
        self.comparisons.iter().filter(move |c| c.metric == metric)
    }
}

/// Per-variant statistics table for one metric
pub fn statistics_table(experiment: &Experiment, metric: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "┌─────────────┬──────────────┬──────────────┬──────────────┬──────────────┬──────────────┬───────┐");
    let _ = writeln!(out, "│ Key Type    │ Median       │ Mean         │ StdDev       │ Min          │ Max          │ CV %  │");
    let _ = writeln!(out, "├─────────────┼──────────────┼──────────────┼──────────────┼──────────────┼──────────────┼───────┤");
    for variant in experiment.variant_order() {
        let stats = experiment.stats(variant, metric).cloned().unwrap_or_default();
        let _ = writeln!(
            out,
            "│ {:<11} │ {:>12} │ {:>12} │ {:>12} │ {:>12} │ {:>12} │ {:>5.1} │",
            variant.to_uppercase(),
            format_metric_value(metric, stats.median),
            format_metric_value(metric, stats.mean),
            format_metric_value(metric, stats.std_dev),
            format_metric_value(metric, stats.min),
            format_metric_value(metric, stats.max),
            stats.cv,
        );
    }
    let _ = writeln!(out, "└─────────────┴──────────────┴──────────────┴──────────────┴──────────────┴──────────────┴───────┘");
    out
}

/// Baseline comparison table for one metric
pub fn comparison_table(experiment: &Experiment, metric: &str) -> String {
    let baseline = experiment.baseline().to_uppercase();
    let mut out = String::new();
    let _ = writeln!(out, "Statistical Comparisons (vs {}):", baseline);
    let _ = writeln!(out, "┌───────────────────────────┬─────────────┬──────────┬───────────┬──────────────┐");
    let _ = writeln!(out, "│ Comparison                │ Median Diff │ p-value  │ Overlap?  │ Significant? │");
    let _ = writeln!(out, "├───────────────────────────┼─────────────┼──────────┼───────────┼──────────────┤");
    for cmp in experiment.comparisons_for(metric) {
        let label = format!("{} vs {}", baseline, cmp.variant.to_uppercase());
        let c = &cmp.comparison;
        let _ = writeln!(
            out,
            "│ {:<25} │ {:>11} │ {:>8.4} │ {:<9} │ {:<12} │",
            label,
            format_percent_diff(c.median_diff_percent),
            c.p_value,
            if c.ranges_overlap { "Yes" } else { "No" },
            c.verdict(),
        );
    }
    let _ = writeln!(out, "└───────────────────────────┴─────────────┴──────────┴───────────┴──────────────┘");
    out
}

/// Full console report over the display metrics present in the experiment
pub fn render_report(experiment: &Experiment) -> String {
    let mut out = String::new();
    let rule = "=".repeat(100);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "{} - Statistical Summary ({} runs per key type)",
        experiment.config.scenario, experiment.config.runs
    );
    let _ = writeln!(out, "{}", rule);

    let present = experiment.metric_names();
    for (metric, title) in DISPLAY_METRICS {
        if !present.iter().any(|m| m == metric) {
            continue;
        }
        let _ = writeln!(out, "\n{}", title);
        out.push_str(&statistics_table(experiment, metric));
        if experiment.variants.len() > 1 {
            out.push('\n');
            out.push_str(&comparison_table(experiment, metric));
        }
    }
    out
}

/// Configuration for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output directory for reports
    pub output_dir: PathBuf,
    /// Whether to write the per-run values CSV
    pub include_raw_data: bool,
    /// Whether to write the experiment JSON
    pub include_json: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./keybench_results"),
            include_raw_data: true,
            include_json: true,
        }
    }
}

/// Writes experiment exports into one directory
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Write every enabled export and return the created paths
    pub fn generate_report(&self, experiment: &Experiment) -> Result<Vec<PathBuf>> {
        create_dir_all(&self.config.output_dir)?;
        let stem = format!(
            "{}_{}",
            experiment.config.scenario,
            experiment.started_at.format("%Y%m%d_%H%M%S")
        );

        let mut written = Vec::new();
        let summary = self.config.output_dir.join(format!("{}_summary.csv", stem));
        write_summary_csv(experiment, &summary)?;
        written.push(summary);

        if self.config.include_raw_data {
            let raw = self.config.output_dir.join(format!("{}_raw.csv", stem));
            write_raw_csv(experiment, &raw)?;
            written.push(raw);
        }

        if self.config.include_json {
            let json = self.config.output_dir.join(format!("{}.json", stem));
            write_json(experiment, &json)?;
            written.push(json);
        }

        info!("Wrote {} report files to {}", written.len(), self.config.output_dir.display());
        Ok(written)
    }
}

fn csv_error(e: csv::Error) -> KeybenchError {
    KeybenchError::Csv(e.to_string())
}

/// One row per (variant, metric) with the descriptive statistics
pub fn write_summary_csv(experiment: &Experiment, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer
        .write_record(["KeyType", "Metric", "Median", "Mean", "StdDev", "Min", "Max", "CV_Percent"])
        .map_err(csv_error)?;

    for variant in experiment.variant_order() {
        let Some(metrics) = experiment.variants.get(variant) else {
            continue;
        };
        for (metric, stats) in metrics {
            writer
                .write_record([
                    variant.to_uppercase(),
                    metric.clone(),
                    format!("{:.2}", stats.median),
                    format!("{:.2}", stats.mean),
                    format!("{:.2}", stats.std_dev),
                    format!("{:.2}", stats.min),
                    format!("{:.2}", stats.max),
                    format!("{:.2}", stats.cv),
                ])
                .map_err(csv_error)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// One row per (variant, metric) with every run's raw value
pub fn write_raw_csv(experiment: &Experiment, path: &Path) -> Result<()> {
    let runs = experiment
        .variants
        .values()
        .flat_map(|metrics| metrics.values())
        .map(|stats| stats.raw_values.len())
        .max()
        .unwrap_or(0);

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    let mut header = vec!["KeyType".to_string(), "Metric".to_string()];
    header.extend((1..=runs).map(|run| format!("Run{}", run)));
    writer.write_record(&header).map_err(csv_error)?;

    for variant in experiment.variant_order() {
        let Some(metrics) = experiment.variants.get(variant) else {
            continue;
        };
        for (metric, stats) in metrics {
            let mut row = vec![variant.to_uppercase(), metric.clone()];
            row.extend(
                (0..runs).map(|i| stats.raw_values.get(i).map(|v| format!("{:.2}", v)).unwrap_or_default()),
            );
            writer.write_record(&row).map_err(csv_error)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json(experiment: &Experiment, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), experiment)?;
    Ok(())
}

pub fn load_experiment(path: &Path) -> Result<Experiment> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate;

    fn sample_experiment() -> Experiment {
        let mut variants = BTreeMap::new();
        variants.insert(
            "bigserial".to_string(),
            [("throughput".to_string(), aggregate(&[100.0, 102.0, 98.0, 101.0, 99.0]))]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        );
        variants.insert(
            "uuidv4".to_string(),
            [("throughput".to_string(), aggregate(&[150.0, 148.0, 152.0, 149.0, 151.0]))]
                .into_iter()
                .collect(),
        );
        let config = BenchmarkConfig {
            variants: vec!["uuidv4".to_string(), "bigserial".to_string()],
            runs: 5,
            ..BenchmarkConfig::default()
        };
        let comparisons = VariantComparator::new("bigserial").compare_all(&variants).unwrap();
        Experiment {
            id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            config,
            variants,
            comparisons,
        }
    }

    #[test]
    fn test_variant_order_follows_config() {
        let experiment = sample_experiment();
        assert_eq!(experiment.variant_order(), vec!["uuidv4", "bigserial"]);
    }

    #[test]
    fn test_tables_render() {
        let experiment = sample_experiment();
        let table = statistics_table(&experiment, "throughput");
        assert!(table.contains("UUIDV4"));
        assert!(table.contains("BIGSERIAL"));

        let cmp = comparison_table(&experiment, "throughput");
        assert!(cmp.contains("BIGSERIAL vs UUIDV4"));
        assert!(cmp.contains("+50.0%"));
        assert!(cmp.contains("No overlap"));

        let report = render_report(&experiment);
        assert!(report.contains("Throughput (ops/sec)"));
        assert!(!report.contains("Page Splits"));
    }

    #[test]
    fn test_rebaseline() {
        let mut experiment = sample_experiment();
        experiment.rebaseline("uuidv4").unwrap();
        assert_eq!(experiment.baseline(), "uuidv4");
        assert_eq!(experiment.comparisons[0].variant, "bigserial");
        assert!(experiment.comparisons[0].comparison.median_diff_percent < 0.0);
        assert!(experiment.rebaseline("ulid").is_err());
    }

    #[test]
    fn test_exports() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = sample_experiment();
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: dir.path().to_path_buf(),
            ..ReportConfig::default()
        });
        let written = generator.generate_report(&experiment).unwrap();
        assert_eq!(written.len(), 3);

        let summary = std::fs::read_to_string(&written[0]).unwrap();
        let mut lines = summary.lines();
        assert_eq!(
            lines.next().unwrap(),
            "KeyType,Metric,Median,Mean,StdDev,Min,Max,CV_Percent"
        );
        assert!(lines.next().unwrap().starts_with("UUIDV4,throughput,150.00"));

        let raw = std::fs::read_to_string(&written[1]).unwrap();
        assert!(raw.starts_with("KeyType,Metric,Run1,Run2,Run3,Run4,Run5"));
        assert!(raw.contains("BIGSERIAL,throughput,100.00,102.00,98.00,101.00,99.00"));

        let loaded = load_experiment(&written[2]).unwrap();
        assert_eq!(loaded.id, experiment.id);
        assert_eq!(loaded.config, experiment.config);
        assert_eq!(loaded.comparisons.len(), 1);
        assert_eq!(loaded.stats("bigserial", "throughput").unwrap().median, 100.0);
    }
}
