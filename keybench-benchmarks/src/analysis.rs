//! Repeated-run statistics and variant comparison
//!
//! [`RunAggregator`] collects one observation per metric per run and reduces
//! them to [`Stats`]. [`compare`] contrasts two such summaries with a relative
//! median difference, a range overlap check and a two-sided Mann–Whitney U
//! test under the normal approximation.

use crate::metrics::RunResult;
use keybench_common::{KeybenchError, Result, SIGNIFICANCE_LEVEL};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use tracing::debug;

/// Descriptive statistics over one metric's repeated observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Coefficient of variation in percent
    pub cv: f64,
    /// Observations in the order they were recorded
    pub raw_values: Vec<f64>,
}

/// Summarise `values`; an empty slice yields all zeros
pub fn aggregate(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mean = mean(values);
    let std_dev = std_dev(values, mean);

    Stats {
        median: median_sorted(&sorted),
        mean,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        cv: coefficient_of_variation(std_dev, mean),
        raw_values: values.to_vec(),
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_sorted(&sorted)
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

pub fn coefficient_of_variation(std_dev: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        0.0
    } else {
        std_dev / mean.abs() * 100.0
    }
}

/// Collects named metric observations across repeated runs of one variant
#[derive(Debug, Clone, Default)]
pub struct RunAggregator {
    observations: BTreeMap<String, Vec<f64>>,
    runs: usize,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the named metric view of one run
    pub fn record_run(&mut self, result: &RunResult) {
        for (name, value) in result.metrics() {
            self.observations.entry(name).or_default().push(value);
        }
        self.runs += 1;
    }

    /// Record an externally measured metric, e.g. an index size
    pub fn record_metric(&mut self, name: impl Into<String>, value: f64) {
        self.observations.entry(name.into()).or_default().push(value);
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn observations(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.observations
    }

    pub fn aggregate(&self) -> BTreeMap<String, Stats> {
        self.observations
            .iter()
            .map(|(name, values)| (name.clone(), aggregate(values)))
            .collect()
    }
}

/// Baseline versus candidate summary for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub median_diff_percent: f64,
    pub p_value: f64,
    pub ranges_overlap: bool,
    pub significant: bool,
}

impl Comparison {
    /// Short marker for result tables
    pub fn verdict(&self) -> &'static str {
        if !self.ranges_overlap {
            "No overlap"
        } else if self.p_value < 0.001 {
            "***"
        } else if self.p_value < 0.01 {
            "**"
        } else if self.p_value < SIGNIFICANCE_LEVEL {
            "*"
        } else {
            "n.s."
        }
    }
}

pub fn compare(baseline: &Stats, candidate: &Stats) -> Comparison {
    let median_diff_percent = if baseline.median == 0.0 {
        0.0
    } else {
        (candidate.median - baseline.median) / baseline.median * 100.0
    };
    let p_value = mann_whitney_u(&baseline.raw_values, &candidate.raw_values);

    Comparison {
        median_diff_percent,
        p_value,
        ranges_overlap: ranges_overlap(baseline, candidate),
        significant: p_value < SIGNIFICANCE_LEVEL,
    }
}

pub fn ranges_overlap(a: &Stats, b: &Stats) -> bool {
    !(a.min > b.max || b.min > a.max)
}

/// Two-sided Mann–Whitney U p-value under the normal approximation.
///
/// Ties share their average rank. Returns 1.0 when either group is empty.
/// Values are ranked by `f64::total_cmp`, so a NaN ranks above every number
/// and equal NaNs tie.
pub fn mann_whitney_u(group_a: &[f64], group_b: &[f64]) -> f64 {
    if group_a.is_empty() || group_b.is_empty() {
        return 1.0;
    }

    let n1 = group_a.len();
    let n2 = group_b.len();

    let mut combined: Vec<(f64, bool)> = group_a
        .iter()
        .map(|&v| (v, true))
        .chain(group_b.iter().map(|&v| (v, false)))
        .collect();
    combined.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut rank_sum_a = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let mut j = i + 1;
        while j < combined.len() && combined[j].0.total_cmp(&combined[i].0).is_eq() {
            j += 1;
        }
        // positions i..j hold ranks i+1..=j
        let avg_rank = (i + j + 1) as f64 / 2.0;
        rank_sum_a += combined[i..j].iter().filter(|(_, in_a)| *in_a).count() as f64 * avg_rank;
        i = j;
    }

    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let u1 = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let u = u1.min(u2);

    let mean_u = n1f * n2f / 2.0;
    let sd_u = (n1f * n2f * (n1f + n2f + 1.0) / 12.0).sqrt();
    if sd_u == 0.0 {
        return 1.0;
    }

    let z = (u - mean_u) / sd_u;
    debug!("Mann-Whitney U={} z={:.4} (n1={}, n2={})", u, z, n1, n2);
    2.0 * normal_cdf(-z.abs())
}

fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).unwrap_or_else(|_| unreachable!("unit variance is valid"))
}

/// Standard normal CDF
pub fn normal_cdf(z: f64) -> f64 {
    standard_normal().cdf(z)
}

/// One candidate metric compared against the baseline variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub variant: String,
    pub metric: String,
    pub comparison: Comparison,
}

/// Compares every variant against a named baseline
#[derive(Debug, Clone)]
pub struct VariantComparator {
    baseline: String,
}

impl VariantComparator {
    pub fn new(baseline: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
        }
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Compare each non-baseline variant on every metric it shares with the
    /// baseline, in variant then metric name order.
    pub fn compare_all(
        &self,
        variants: &BTreeMap<String, BTreeMap<String, Stats>>,
    ) -> Result<Vec<MetricComparison>> {
        let baseline = variants.get(&self.baseline).ok_or_else(|| {
            KeybenchError::Config(format!("baseline variant '{}' has no results", self.baseline))
        })?;

        let mut comparisons = Vec::new();
        for (variant, metrics) in variants {
            if *variant == self.baseline {
                continue;
            }
            for (metric, candidate) in metrics {
                if let Some(base) = baseline.get(metric) {
                    comparisons.push(MetricComparison {
                        variant: variant.clone(),
                        metric: metric.clone(),
                        comparison: compare(base, candidate),
                    });
                }
            }
        }
        Ok(comparisons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = aggregate(&[]);
        assert_eq!(stats, Stats::default());
        assert!(stats.raw_values.is_empty());
    }

    #[test]
    fn test_aggregate_single_value() {
        let stats = aggregate(&[42.0]);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.min, 42.0);
        assert_eq!(stats.max, 42.0);
        assert_eq!(stats.cv, 0.0);
    }

    #[test]
    fn test_aggregate_keeps_input_order() {
        let stats = aggregate(&[3.0, 1.0, 4.0, 2.0]);
        assert_eq!(stats.raw_values, vec![3.0, 1.0, 4.0, 2.0]);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        // sample variance of 1..=4 is 5/3
        assert!(approx(stats.std_dev, (5.0f64 / 3.0).sqrt(), 1e-12));
        assert!(approx(stats.cv, stats.std_dev / 2.5 * 100.0, 1e-12));
    }

    #[test]
    fn test_cv_zero_mean() {
        let stats = aggregate(&[-1.0, 1.0]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.cv, 0.0);
        assert!(stats.std_dev > 0.0);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&[5.0, 1.0, 3.0, 7.0]), 4.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_compare_identical() {
        let stats = aggregate(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let cmp = compare(&stats, &stats);
        assert_eq!(cmp.median_diff_percent, 0.0);
        assert!(cmp.p_value > 0.99);
        assert!(cmp.ranges_overlap);
        assert!(!cmp.significant);
        assert_eq!(cmp.verdict(), "n.s.");
    }

    #[test]
    fn test_compare_clear_difference() {
        let baseline = aggregate(&[100.0, 102.0, 98.0, 101.0, 99.0]);
        let candidate = aggregate(&[150.0, 148.0, 152.0, 149.0, 151.0]);
        let cmp = compare(&baseline, &candidate);

        assert!(approx(cmp.median_diff_percent, 50.0, 1e-9));
        assert!(!cmp.ranges_overlap);
        assert!(cmp.significant);
        // U = 0, z = -2.611
        assert!(approx(cmp.p_value, 0.009, 0.001));
        assert_eq!(cmp.verdict(), "No overlap");
    }

    #[test]
    fn test_compare_zero_baseline_median() {
        let baseline = aggregate(&[0.0, 0.0, 0.0]);
        let candidate = aggregate(&[1.0, 2.0, 3.0]);
        assert_eq!(compare(&baseline, &candidate).median_diff_percent, 0.0);
    }

    #[test]
    fn test_mann_whitney_empty_group() {
        assert_eq!(mann_whitney_u(&[], &[1.0, 2.0]), 1.0);
        assert_eq!(mann_whitney_u(&[1.0], &[]), 1.0);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        let p = mann_whitney_u(&[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]);
        assert!(p > 0.99);
    }

    #[test]
    fn test_verdict_markers() {
        let cmp = |p_value: f64| Comparison {
            median_diff_percent: 0.0,
            p_value,
            ranges_overlap: true,
            significant: p_value < SIGNIFICANCE_LEVEL,
        };
        assert_eq!(cmp(0.0005).verdict(), "***");
        assert_eq!(cmp(0.005).verdict(), "**");
        assert_eq!(cmp(0.03).verdict(), "*");
        assert_eq!(cmp(0.2).verdict(), "n.s.");
    }

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!(approx(normal_cdf(0.0), 0.5, 1e-6));
        assert!(approx(normal_cdf(1.96), 0.975, 1e-4));
        assert!(approx(normal_cdf(-1.96), 0.025, 1e-4));
        assert!(approx(normal_cdf(-0.5), 1.0 - normal_cdf(0.5), 1e-12));
    }

    #[test]
    fn test_mann_whitney_ranks_nan_last() {
        // NaN sorts above every number under total_cmp, so it takes rank 4
        let p = mann_whitney_u(&[1.0, f64::NAN], &[2.0, 3.0]);
        assert!(p.is_finite());
        assert!(p > 0.5);

        let tied = mann_whitney_u(&[f64::NAN, f64::NAN], &[f64::NAN, f64::NAN]);
        assert!(tied > 0.99);
    }

    #[test]
    fn test_compare_with_nan_observation() {
        let mut runs = RunAggregator::new();
        runs.record_metric("external", 1.0);
        runs.record_metric("external", f64::NAN);
        let baseline = runs.aggregate().remove("external").unwrap();
        let candidate = aggregate(&[2.0, 3.0]);

        let cmp = compare(&baseline, &candidate);
        assert!(cmp.p_value.is_finite());
        assert!(!cmp.significant);
    }

    #[test]
    fn test_run_aggregator_collects_per_metric() {
        let mut runs = RunAggregator::new();
        runs.record_run(&RunResult::default());
        runs.record_run(&RunResult::default());
        runs.record_metric("index_size_bytes", 1024.0);
        runs.record_metric("index_size_bytes", 2048.0);

        assert_eq!(runs.runs(), 2);
        let stats = runs.aggregate();
        assert_eq!(stats["index_size_bytes"].median, 1536.0);
        assert_eq!(stats["throughput"].raw_values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_variant_comparator() {
        let mut variants = BTreeMap::new();
        variants.insert(
            "bigserial".to_string(),
            [("throughput".to_string(), aggregate(&[100.0, 102.0, 98.0, 101.0, 99.0]))]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        );
        variants.insert(
            "uuidv4".to_string(),
            [
                ("throughput".to_string(), aggregate(&[150.0, 148.0, 152.0, 149.0, 151.0])),
                ("only_here".to_string(), aggregate(&[1.0])),
            ]
            .into_iter()
            .collect(),
        );

        let comparisons = VariantComparator::new("bigserial").compare_all(&variants).unwrap();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].variant, "uuidv4");
        assert_eq!(comparisons[0].metric, "throughput");
        assert!(comparisons[0].comparison.significant);

        let err = VariantComparator::new("ulid").compare_all(&variants).unwrap_err();
        assert!(err.is_configuration());
    }
}
