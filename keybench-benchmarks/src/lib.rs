//! keybench benchmarking framework
//!
//! Runs weighted insert/read/update workloads against interchangeable
//! variants of a system under test and compares the variants statistically.
//! It includes:
//! - Worker distribution for weighted operation mixes
//! - Concurrent execution with per-operation latency capture
//! - Repeated-run statistics and Mann–Whitney U comparisons
//! - A simulated B-tree index for comparing primary-key encodings

pub mod analysis;
pub mod benchmarks;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod utils;
pub mod workload;

pub use analysis::{aggregate, compare, Comparison, RunAggregator, Stats, VariantComparator};
pub use config::BenchmarkConfig;
pub use executor::{ConcurrentExecutor, FnOperation, OperationCallback, OperationMap};
pub use metrics::{percentiles, LatencyAggregator, LatencyPercentiles, RunResult};
pub use report::Experiment;
pub use workload::{distribute, WorkerAssignment, WorkloadSpec};
