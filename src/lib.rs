//! keybench
//!
//! Workload execution and statistical comparison engine for primary-key
//! benchmarks. The engine lives in `keybench-benchmarks`; shared types and
//! errors live in `keybench-common`.

pub use keybench_benchmarks::{
    analysis, benchmarks, config, executor, metrics, report, utils, workload,
};
pub use keybench_common::{
    KeybenchError, LatencySample, OperationError, OperationKind, Outcome, Result,
};

/// Commonly used engine types
pub mod prelude {
    pub use keybench_benchmarks::analysis::{
        aggregate, compare, Comparison, RunAggregator, Stats, VariantComparator,
    };
    pub use keybench_benchmarks::executor::{
        ConcurrentExecutor, FnOperation, OperationCallback, OperationMap,
    };
    pub use keybench_benchmarks::metrics::{percentiles, LatencyPercentiles, RunResult};
    pub use keybench_benchmarks::workload::{distribute, WorkerAssignment, WorkloadSpec};
    pub use keybench_common::{KeybenchError, OperationError, OperationKind};
}
