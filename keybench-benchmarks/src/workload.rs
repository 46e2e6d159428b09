//! Workload definition and worker distribution
//!
//! Turns a weighted operation mix into a fixed number of operations per kind,
//! then into a deterministic number of workers per kind and a contiguous
//! range of logical operation indices per worker.

use keybench_common::{KeybenchError, OperationKind, Result, WEIGHT_TOTAL};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Validated description of one workload execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadSpec {
    total_ops: u64,
    weights: BTreeMap<OperationKind, u32>,
    worker_budget: usize,
}

impl WorkloadSpec {
    /// Build a workload, rejecting weights that do not sum to 100 and a zero
    /// worker budget.
    pub fn new(
        total_ops: u64,
        weights: impl IntoIterator<Item = (OperationKind, u32)>,
        worker_budget: usize,
    ) -> Result<Self> {
        let weights: BTreeMap<OperationKind, u32> = weights.into_iter().collect();
        let sum: u32 = weights.values().sum();
        if sum != WEIGHT_TOTAL {
            return Err(KeybenchError::InvalidWeights { sum });
        }
        if worker_budget == 0 {
            return Err(KeybenchError::ZeroWorkerBudget);
        }

        Ok(Self {
            total_ops,
            weights,
            worker_budget,
        })
    }

    pub fn total_ops(&self) -> u64 {
        self.total_ops
    }

    pub fn weights(&self) -> &BTreeMap<OperationKind, u32> {
        &self.weights
    }

    pub fn worker_budget(&self) -> usize {
        self.worker_budget
    }

    /// Operation count per kind.
    ///
    /// Each kind gets `floor(total_ops * weight / 100)`; the flooring
    /// remainder goes to the heaviest kind (earliest kind on ties) so the
    /// counts always add up to `total_ops`.
    pub fn ops_by_kind(&self) -> BTreeMap<OperationKind, u64> {
        let total = self.total_ops as u128;
        let mut ops: BTreeMap<OperationKind, u64> = self
            .weights
            .iter()
            .map(|(&kind, &weight)| {
                (kind, (total * weight as u128 / WEIGHT_TOTAL as u128) as u64)
            })
            .collect();

        let assigned: u64 = ops.values().sum();
        let remainder = self.total_ops - assigned;
        if remainder > 0 {
            let heaviest = self
                .weights
                .iter()
                .fold(None, |best: Option<(OperationKind, u32)>, (&kind, &weight)| match best {
                    Some((_, best_weight)) if best_weight >= weight => best,
                    _ => Some((kind, weight)),
                });
            if let Some((kind, _)) = heaviest {
                *ops.entry(kind).or_insert(0) += remainder;
            }
        }

        ops
    }

    /// Worker assignment for this workload
    pub fn assignments(&self) -> Result<BTreeMap<OperationKind, WorkerAssignment>> {
        distribute(self.worker_budget, &self.ops_by_kind())
    }
}

/// Workers and operations allotted to one operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerAssignment {
    pub kind: OperationKind,
    pub ops_assigned: u64,
    pub worker_count: usize,
}

impl WorkerAssignment {
    /// Operations handled by worker `index`.
    ///
    /// The first `ops % workers` workers take one extra operation.
    pub fn ops_for_worker(&self, index: usize) -> u64 {
        if self.worker_count == 0 || index >= self.worker_count {
            return 0;
        }
        let workers = self.worker_count as u64;
        let base = self.ops_assigned / workers;
        let remainder = self.ops_assigned % workers;
        if (index as u64) < remainder {
            base + 1
        } else {
            base
        }
    }

    /// Contiguous logical index range per worker, in worker order
    pub fn worker_ranges(&self) -> Vec<Range<u64>> {
        let mut start = 0;
        (0..self.worker_count)
            .map(|index| {
                let end = start + self.ops_for_worker(index);
                let range = start..end;
                start = end;
                range
            })
            .collect()
    }
}

/// Split `total_workers` across the kinds that have work.
///
/// Kinds with zero operations get no entry. Every active kind gets at least
/// one worker; when those forced minimums push the total over budget, the
/// surplus is taken one worker at a time from the largest allocation that
/// still has more than one worker.
pub fn distribute(
    total_workers: usize,
    ops_by_kind: &BTreeMap<OperationKind, u64>,
) -> Result<BTreeMap<OperationKind, WorkerAssignment>> {
    if total_workers == 0 {
        return Err(KeybenchError::ZeroWorkerBudget);
    }

    let total_ops: u128 = ops_by_kind.values().map(|&ops| ops as u128).sum();
    if total_ops == 0 {
        return Ok(BTreeMap::new());
    }

    let mut counts: BTreeMap<OperationKind, usize> = ops_by_kind
        .iter()
        .filter(|(_, &ops)| ops > 0)
        .map(|(&kind, &ops)| {
            let proportional = (total_workers as u128 * ops as u128 / total_ops) as usize;
            (kind, proportional.max(1))
        })
        .collect();

    let mut allocated: usize = counts.values().sum();
    while allocated > total_workers {
        match largest_reducible(&counts) {
            Some(kind) => {
                if let Some(count) = counts.get_mut(&kind) {
                    *count -= 1;
                }
                allocated -= 1;
                debug!("Removed surplus worker from {}", kind);
            }
            None => {
                warn!(
                    "{} active operation kinds exceed the worker budget of {}",
                    counts.len(),
                    total_workers
                );
                break;
            }
        }
    }

    Ok(counts
        .into_iter()
        .map(|(kind, worker_count)| {
            let ops_assigned = ops_by_kind.get(&kind).copied().unwrap_or(0);
            (
                kind,
                WorkerAssignment {
                    kind,
                    ops_assigned,
                    worker_count,
                },
            )
        })
        .collect())
}

/// Kind with the largest allocation above one worker, earliest kind on ties
fn largest_reducible(counts: &BTreeMap<OperationKind, usize>) -> Option<OperationKind> {
    counts
        .iter()
        .filter(|(_, &count)| count > 1)
        .fold(None, |best: Option<(OperationKind, usize)>, (&kind, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((kind, count)),
        })
        .map(|(kind, _)| kind)
}
