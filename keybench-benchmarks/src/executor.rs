//! Concurrent workload execution
//!
//! Spawns one tokio task per (operation kind, worker index). Each task drives
//! its injected [`OperationCallback`] sequentially over its slice of logical
//! indices, times every call, and merges its samples into the shared
//! [`LatencyAggregator`] exactly once when it finishes.

use crate::metrics::{LatencyAggregator, RunResult};
use crate::workload::{WorkerAssignment, WorkloadSpec};
use async_trait::async_trait;
use keybench_common::{KeybenchError, LatencySample, OperationError, OperationKind, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A unit of work against the system under test.
///
/// Returning `Ok(Some(elapsed))` overrides the executor's own measurement
/// with a self-reported latency.
#[async_trait]
pub trait OperationCallback: Send + Sync {
    async fn execute(
        &self,
        kind: OperationKind,
        logical_index: u64,
    ) -> std::result::Result<Option<Duration>, OperationError>;
}

/// Adapter turning a closure into an [`OperationCallback`]
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(OperationKind, u64) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Option<Duration>, OperationError>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> OperationCallback for FnOperation<F>
where
    F: Fn(OperationKind, u64) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Option<Duration>, OperationError>> + Send,
{
    async fn execute(
        &self,
        kind: OperationKind,
        logical_index: u64,
    ) -> std::result::Result<Option<Duration>, OperationError> {
        (self.f)(kind, logical_index).await
    }
}

/// Callback registry keyed by the closed set of operation kinds
pub type OperationMap = BTreeMap<OperationKind, Arc<dyn OperationCallback>>;

/// Runs worker assignments against registered callbacks
#[derive(Clone, Default)]
pub struct ConcurrentExecutor {
    operations: OperationMap,
}

impl ConcurrentExecutor {
    pub fn new(operations: OperationMap) -> Self {
        Self { operations }
    }

    /// Register the callback for `kind`, replacing any previous one
    pub fn with_operation(mut self, kind: OperationKind, op: Arc<dyn OperationCallback>) -> Self {
        self.operations.insert(kind, op);
        self
    }

    pub fn operations(&self) -> &OperationMap {
        &self.operations
    }

    /// Distribute a workload and execute it
    pub async fn run_spec(&self, spec: &WorkloadSpec) -> Result<RunResult> {
        let assignment = spec.assignments()?;
        self.run(&assignment).await
    }

    /// Execute every assignment and wait for all workers.
    ///
    /// Fails before spawning anything when an active kind has no callback.
    /// A panicking worker is reported once every other worker has joined.
    pub async fn run(
        &self,
        assignment: &BTreeMap<OperationKind, WorkerAssignment>,
    ) -> Result<RunResult> {
        let mut plan: Vec<(Arc<dyn OperationCallback>, OperationKind, Range<u64>)> = Vec::new();
        for (&kind, worker) in assignment {
            if worker.ops_assigned == 0 || worker.worker_count == 0 {
                continue;
            }
            let op = self
                .operations
                .get(&kind)
                .ok_or(KeybenchError::MissingOperation(kind))?;
            for range in worker.worker_ranges() {
                plan.push((Arc::clone(op), kind, range));
            }
        }

        if plan.is_empty() {
            info!("Empty workload, nothing to execute");
            return Ok(LatencyAggregator::new().finish(Duration::ZERO));
        }

        info!(
            "Starting run with {} workers: {}",
            plan.len(),
            assignment
                .values()
                .map(|a| format!("{}={}x{}", a.kind, a.worker_count, a.ops_assigned))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let shared = Arc::new(Mutex::new(LatencyAggregator::new()));
        let mut workers = JoinSet::new();
        let start = Instant::now();

        for (worker_id, (op, kind, range)) in plan.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            workers.spawn(async move {
                let mut local = Vec::with_capacity((range.end - range.start) as usize);
                for logical_index in range {
                    let started = Instant::now();
                    let outcome = op.execute(kind, logical_index).await;
                    let measured = started.elapsed();
                    local.push(match outcome {
                        Ok(reported) => LatencySample::success(kind, reported.unwrap_or(measured)),
                        Err(e) => {
                            debug!("{} #{} failed: {}", kind, logical_index, e);
                            LatencySample::failure(kind, measured)
                        }
                    });
                }
                debug!("Worker {} ({}) finished {} operations", worker_id, kind, local.len());
                shared.lock().await.merge(kind, local);
            });
        }

        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker task failed: {}", e);
                panicked.get_or_insert_with(|| e.to_string());
            }
        }
        let wall_clock = start.elapsed();

        if let Some(reason) = panicked {
            return Err(KeybenchError::WorkerPanicked(reason));
        }

        let aggregator = std::mem::take(&mut *shared.lock().await);
        debug!(
            "Merged {} worker batches, {} samples",
            aggregator.batches(),
            aggregator.sample_count()
        );
        let result = aggregator.finish(wall_clock);
        info!(
            "Run finished in {:?}: {} ok, {} failed, {:.1} ops/s",
            result.wall_clock(),
            result.ops_succeeded(),
            result.ops_failed(),
            result.throughput()
        );
        Ok(result)
    }
}

/// Execute `assignment` with the given callbacks
pub async fn run(
    assignment: &BTreeMap<OperationKind, WorkerAssignment>,
    operations: OperationMap,
) -> Result<RunResult> {
    ConcurrentExecutor::new(operations).run(assignment).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::distribute;
    use std::sync::atomic::{AtomicU64, Ordering};
    use OperationKind::{Insert, Read, Update};

    fn fixed_latency(latency: Duration) -> Arc<dyn OperationCallback> {
        Arc::new(FnOperation::new(move |_, _| async move { Ok(Some(latency)) }))
    }

    fn failing() -> Arc<dyn OperationCallback> {
        Arc::new(FnOperation::new(|_, _| async { Err(OperationError::new("rejected")) }))
    }

    #[tokio::test]
    async fn test_fixed_latency_percentiles() {
        let assignment: BTreeMap<_, _> = [(
            Read,
            WorkerAssignment {
                kind: Read,
                ops_assigned: 400,
                worker_count: 4,
            },
        )]
        .into_iter()
        .collect();

        let result = run(
            &assignment,
            [(Read, fixed_latency(Duration::from_millis(10)))].into_iter().collect(),
        )
        .await
        .unwrap();

        assert_eq!(result.samples(Read).len(), 400);
        let p = result.percentiles();
        assert_eq!(p.p50, Duration::from_millis(10));
        assert_eq!(p.p95, Duration::from_millis(10));
        assert_eq!(p.p99, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_always_failing_callback() {
        let spec = WorkloadSpec::new(250, [(Insert, 60), (Update, 40)], 5).unwrap();
        let executor = ConcurrentExecutor::default()
            .with_operation(Insert, failing())
            .with_operation(Update, failing());

        let result = executor.run_spec(&spec).await.unwrap();
        assert_eq!(result.ops_failed(), 250);
        assert_eq!(result.ops_succeeded(), 0);
        assert_eq!(result.samples(Insert).len(), 150);
        assert!(result.percentiles().p99 >= result.percentiles().p50);
    }

    #[tokio::test]
    async fn test_missing_callback_fails_before_any_work() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let counting: Arc<dyn OperationCallback> = Arc::new(FnOperation::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        }));

        let spec = WorkloadSpec::new(100, [(Insert, 50), (Read, 50)], 4).unwrap();
        let err = ConcurrentExecutor::default()
            .with_operation(Insert, counting)
            .run_spec(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, KeybenchError::MissingOperation(Read)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_logical_index_runs_once() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let op: Arc<dyn OperationCallback> = Arc::new(FnOperation::new(move |_, idx| {
            recorder.lock().unwrap().push(idx);
            async { Ok(None) }
        }));

        let assignment = distribute(7, &[(Update, 103)].into_iter().collect()).unwrap();
        let result = run(&assignment, [(Update, op)].into_iter().collect()).await.unwrap();

        let mut indices = seen.lock().unwrap().clone();
        indices.sort_unstable();
        assert_eq!(indices, (0..103).collect::<Vec<u64>>());
        assert_eq!(result.ops_succeeded(), 103);
    }

    #[tokio::test]
    async fn test_partial_failures_continue() {
        let op: Arc<dyn OperationCallback> = Arc::new(FnOperation::new(|_, idx| async move {
            if idx % 4 == 0 {
                Err(OperationError::new("conflict"))
            } else {
                Ok(None)
            }
        }));

        let spec = WorkloadSpec::new(40, [(Insert, 100)], 2).unwrap();
        let result = ConcurrentExecutor::default()
            .with_operation(Insert, op)
            .run_spec(&spec)
            .await
            .unwrap();
        assert_eq!(result.ops_failed(), 10);
        assert_eq!(result.ops_succeeded(), 30);
    }

    #[tokio::test]
    async fn test_empty_workload_has_zero_wall_clock() {
        let spec = WorkloadSpec::new(0, [(Insert, 100)], 4).unwrap();
        let result = ConcurrentExecutor::default().run_spec(&spec).await.unwrap();
        assert_eq!(result.wall_clock(), Duration::ZERO);
        assert_eq!(result.ops_completed(), 0);
        assert_eq!(result.throughput(), 0.0);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let op: Arc<dyn OperationCallback> = Arc::new(FnOperation::new(|_, idx| async move {
            if idx == 3 {
                panic!("callback blew up");
            }
            Ok(None)
        }));

        let spec = WorkloadSpec::new(20, [(Read, 100)], 2).unwrap();
        let err = ConcurrentExecutor::default()
            .with_operation(Read, op)
            .run_spec(&spec)
            .await
            .unwrap_err();
        assert!(matches!(err, KeybenchError::WorkerPanicked(_)));
    }
}
