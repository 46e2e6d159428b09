//! Latency aggregation for a single run
//!
//! Merges per-worker sample batches into a [`RunResult`] and derives
//! nearest-rank percentiles, throughput and a flat named-metric view that
//! feeds the repeated-run statistics in [`crate::analysis`].

use keybench_common::{LatencySample, OperationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const METRIC_THROUGHPUT: &str = "throughput";
pub const METRIC_P50_LATENCY_US: &str = "p50_latency_us";
pub const METRIC_P95_LATENCY_US: &str = "p95_latency_us";
pub const METRIC_P99_LATENCY_US: &str = "p99_latency_us";
pub const METRIC_ERROR_RATE: &str = "error_rate";

/// Name of the per-kind throughput metric, e.g. `insert_throughput`
pub fn kind_throughput_metric(kind: OperationKind) -> String {
    format!("{}_throughput", kind)
}

/// Name of the per-kind tail latency metric, e.g. `read_p99_latency_us`
pub fn kind_p99_metric(kind: OperationKind) -> String {
    format!("{}_p99_latency_us", kind)
}

/// Nearest-rank latency percentiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Compute p50/p95/p99 over `samples`.
///
/// Returns all zeros for an empty slice, so callers that care must check the
/// sample count first.
pub fn percentiles(samples: &[Duration]) -> LatencyPercentiles {
    if samples.is_empty() {
        return LatencyPercentiles::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    LatencyPercentiles {
        p50: nearest_rank(&sorted, 50),
        p95: nearest_rank(&sorted, 95),
        p99: nearest_rank(&sorted, 99),
    }
}

/// Zero-indexed nearest rank `floor(n * p / 100)` on pre-sorted input
pub fn nearest_rank(sorted: &[Duration], percentile: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
    sorted[idx]
}

/// Operations per second over a wall clock, zero when nothing elapsed
pub fn throughput(ops: u64, wall_clock: Duration) -> f64 {
    let secs = wall_clock.as_secs_f64();
    if secs > 0.0 {
        ops as f64 / secs
    } else {
        0.0
    }
}

fn duration_us(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}

/// Outcome of one workload execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    per_kind: BTreeMap<OperationKind, Vec<LatencySample>>,
    wall_clock: Duration,
    ops_succeeded: u64,
    ops_failed: u64,
}

impl RunResult {
    /// Build a result from already merged samples, counting outcomes
    pub fn from_samples(
        per_kind: BTreeMap<OperationKind, Vec<LatencySample>>,
        wall_clock: Duration,
    ) -> Self {
        let (ops_succeeded, ops_failed) = per_kind
            .values()
            .flatten()
            .fold((0, 0), |(ok, failed), sample| {
                if sample.is_success() {
                    (ok + 1, failed)
                } else {
                    (ok, failed + 1)
                }
            });

        Self {
            per_kind,
            wall_clock,
            ops_succeeded,
            ops_failed,
        }
    }

    pub fn per_kind(&self) -> &BTreeMap<OperationKind, Vec<LatencySample>> {
        &self.per_kind
    }

    pub fn samples(&self, kind: OperationKind) -> &[LatencySample] {
        self.per_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn wall_clock(&self) -> Duration {
        self.wall_clock
    }

    pub fn ops_succeeded(&self) -> u64 {
        self.ops_succeeded
    }

    pub fn ops_failed(&self) -> u64 {
        self.ops_failed
    }

    pub fn ops_completed(&self) -> u64 {
        self.ops_succeeded + self.ops_failed
    }

    /// Completed operations per second over the run's wall clock
    pub fn throughput(&self) -> f64 {
        throughput(self.ops_completed(), self.wall_clock)
    }

    /// Percentiles over every recorded duration, failures included
    pub fn percentiles(&self) -> LatencyPercentiles {
        let all: Vec<Duration> = self
            .per_kind
            .values()
            .flatten()
            .map(|sample| sample.duration)
            .collect();
        percentiles(&all)
    }

    pub fn error_rate(&self) -> f64 {
        let completed = self.ops_completed();
        if completed == 0 {
            0.0
        } else {
            self.ops_failed as f64 / completed as f64
        }
    }

    pub fn summary(&self) -> RunSummary {
        let kinds = self
            .per_kind
            .iter()
            .map(|(&kind, samples)| (kind, KindSummary::from_samples(samples)))
            .collect();

        RunSummary {
            wall_clock: self.wall_clock,
            ops_succeeded: self.ops_succeeded,
            ops_failed: self.ops_failed,
            throughput: self.throughput(),
            percentiles: self.percentiles(),
            kinds,
        }
    }

    /// Flat named view used as one observation per repeated run
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let overall = self.percentiles();
        let mut metrics = BTreeMap::new();
        metrics.insert(METRIC_THROUGHPUT.to_string(), self.throughput());
        metrics.insert(METRIC_P50_LATENCY_US.to_string(), duration_us(overall.p50));
        metrics.insert(METRIC_P95_LATENCY_US.to_string(), duration_us(overall.p95));
        metrics.insert(METRIC_P99_LATENCY_US.to_string(), duration_us(overall.p99));
        metrics.insert(METRIC_ERROR_RATE.to_string(), self.error_rate());

        for (&kind, samples) in &self.per_kind {
            if samples.is_empty() {
                continue;
            }
            let kind_summary = KindSummary::from_samples(samples);
            metrics.insert(kind_throughput_metric(kind), kind_summary.throughput);
            metrics.insert(kind_p99_metric(kind), duration_us(kind_summary.percentiles.p99));
        }

        metrics
    }
}

/// Per-kind breakdown of a run.
///
/// `throughput` is operations per second of time spent inside this kind's
/// calls, so kinds sharing a run are rated independently of each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub count: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub mean: Duration,
    pub percentiles: LatencyPercentiles,
    pub throughput: f64,
}

impl KindSummary {
    fn from_samples(samples: &[LatencySample]) -> Self {
        let count = samples.len() as u64;
        let succeeded = samples.iter().filter(|s| s.is_success()).count() as u64;
        let durations: Vec<Duration> = samples.iter().map(|s| s.duration).collect();
        let busy: Duration = durations.iter().sum();
        let mean = if durations.is_empty() {
            Duration::ZERO
        } else {
            busy / durations.len() as u32
        };

        Self {
            count,
            succeeded,
            failed: count - succeeded,
            mean,
            percentiles: percentiles(&durations),
            throughput: throughput(count, busy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub wall_clock: Duration,
    pub ops_succeeded: u64,
    pub ops_failed: u64,
    pub throughput: f64,
    pub percentiles: LatencyPercentiles,
    pub kinds: BTreeMap<OperationKind, KindSummary>,
}

/// Shared accumulator that worker batches are merged into
#[derive(Debug, Default)]
pub struct LatencyAggregator {
    per_kind: BTreeMap<OperationKind, Vec<LatencySample>>,
    batches: usize,
}

impl LatencyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one worker's samples
    pub fn merge(&mut self, kind: OperationKind, batch: Vec<LatencySample>) {
        debug!("Merging {} {} samples", batch.len(), kind);
        self.per_kind.entry(kind).or_default().extend(batch);
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn sample_count(&self) -> usize {
        self.per_kind.values().map(Vec::len).sum()
    }

    pub fn finish(self, wall_clock: Duration) -> RunResult {
        RunResult::from_samples(self.per_kind, wall_clock)
    }
}
