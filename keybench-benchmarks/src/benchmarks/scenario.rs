//! Runs a workload against one key encoding on the simulated index
//!
//! The three operation callbacks share one [`SimulatedTable`] behind a tokio
//! `RwLock`: inserts and updates take the write lock, reads share it. Rows to
//! read or update are drawn from a seeded RNG so repeated runs with the same
//! seed touch the same rows.

use super::index_sim::{IndexMetrics, LeafIndex};
use super::key_encoding::{render_key, KeyEncoding, KeyGenerator};
use crate::analysis::{RunAggregator, VariantComparator};
use crate::config::BenchmarkConfig;
use crate::executor::{ConcurrentExecutor, OperationCallback};
use crate::metrics::RunResult;
use crate::report::Experiment;
use async_trait::async_trait;
use chrono::Utc;
use keybench_common::{KeybenchError, OperationError, OperationKind, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

pub const METRIC_PAGE_SPLITS: &str = "index_page_splits";
pub const METRIC_WORKLOAD_PAGE_SPLITS: &str = "workload_page_splits";
pub const METRIC_LEAF_PAGES: &str = "index_leaf_pages";
pub const METRIC_DENSITY: &str = "index_density_percent";
pub const METRIC_FRAGMENTATION: &str = "index_fragmentation_percent";
pub const METRIC_INDEX_SIZE: &str = "index_size_bytes";

/// Index plus the key source and the rows written so far
#[derive(Debug)]
pub struct SimulatedTable {
    index: LeafIndex,
    generator: KeyGenerator,
    rows: Vec<u128>,
    row_picker: Mutex<StdRng>,
}

impl SimulatedTable {
    pub fn new(encoding: KeyEncoding, page_capacity: usize, seed: u64) -> Self {
        Self {
            index: LeafIndex::new(page_capacity),
            generator: KeyGenerator::new(encoding, seed),
            rows: Vec::new(),
            row_picker: Mutex::new(StdRng::seed_from_u64(seed.rotate_left(32))),
        }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.generator.encoding()
    }

    pub fn index(&self) -> &LeafIndex {
        &self.index
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Generate the next key and insert it
    pub fn insert_next(&mut self) -> std::result::Result<u128, OperationError> {
        let key = self.generator.next_key();
        if self.index.insert(key) {
            self.rows.push(key);
            Ok(key)
        } else {
            Err(OperationError::new(format!(
                "duplicate key {}",
                render_key(self.encoding(), key)
            )))
        }
    }

    pub fn preload(&mut self, rows: u64) -> std::result::Result<(), OperationError> {
        for _ in 0..rows {
            self.insert_next()?;
        }
        Ok(())
    }

    fn random_row(&self) -> Option<u128> {
        if self.rows.is_empty() {
            return None;
        }
        let mut rng = self
            .row_picker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let idx = rng.gen_range(0..self.rows.len());
        Some(self.rows[idx])
    }

    pub fn read_random(&self) -> std::result::Result<u128, OperationError> {
        let key = self.random_row().ok_or_else(|| OperationError::new("no rows to read"))?;
        if self.index.contains(key) {
            Ok(key)
        } else {
            Err(OperationError::new(format!(
                "row {} missing from index",
                render_key(self.encoding(), key)
            )))
        }
    }

    pub fn update_random(&mut self) -> std::result::Result<u128, OperationError> {
        let key = self.random_row().ok_or_else(|| OperationError::new("no rows to update"))?;
        if self.index.update(key) {
            Ok(key)
        } else {
            Err(OperationError::new(format!(
                "row {} missing from index",
                render_key(self.encoding(), key)
            )))
        }
    }
}

pub type SharedTable = Arc<RwLock<SimulatedTable>>;

struct InsertOperation {
    table: SharedTable,
}

#[async_trait]
impl OperationCallback for InsertOperation {
    async fn execute(
        &self,
        _kind: OperationKind,
        _logical_index: u64,
    ) -> std::result::Result<Option<Duration>, OperationError> {
        self.table.write().await.insert_next().map(|_| None)
    }
}

struct ReadOperation {
    table: SharedTable,
}

#[async_trait]
impl OperationCallback for ReadOperation {
    async fn execute(
        &self,
        _kind: OperationKind,
        _logical_index: u64,
    ) -> std::result::Result<Option<Duration>, OperationError> {
        self.table.read().await.read_random().map(|_| None)
    }
}

struct UpdateOperation {
    table: SharedTable,
}

#[async_trait]
impl OperationCallback for UpdateOperation {
    async fn execute(
        &self,
        _kind: OperationKind,
        _logical_index: u64,
    ) -> std::result::Result<Option<Duration>, OperationError> {
        self.table.write().await.update_random().map(|_| None)
    }
}

/// Executor with insert, read and update callbacks bound to `table`
pub fn table_executor(table: &SharedTable) -> ConcurrentExecutor {
    ConcurrentExecutor::default()
        .with_operation(
            OperationKind::Insert,
            Arc::new(InsertOperation {
                table: Arc::clone(table),
            }),
        )
        .with_operation(
            OperationKind::Read,
            Arc::new(ReadOperation {
                table: Arc::clone(table),
            }),
        )
        .with_operation(
            OperationKind::Update,
            Arc::new(UpdateOperation {
                table: Arc::clone(table),
            }),
        )
}

/// One measured run of one variant
#[derive(Debug, Clone)]
pub struct VariantRun {
    pub encoding: KeyEncoding,
    pub result: RunResult,
    pub preloaded: IndexMetrics,
    pub index: IndexMetrics,
}

impl VariantRun {
    /// Index metrics reported alongside the run's latency metrics
    pub fn extra_metrics(&self) -> BTreeMap<String, f64> {
        [
            (METRIC_PAGE_SPLITS, self.index.page_splits as f64),
            (
                METRIC_WORKLOAD_PAGE_SPLITS,
                (self.index.page_splits - self.preloaded.page_splits) as f64,
            ),
            (METRIC_LEAF_PAGES, self.index.leaf_pages as f64),
            (METRIC_DENSITY, self.index.avg_density_percent),
            (METRIC_FRAGMENTATION, self.index.fragmentation_percent),
            (METRIC_INDEX_SIZE, self.index.size_bytes as f64),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

/// Preload a fresh table for `encoding` and run the configured workload on it
pub async fn run_variant(
    config: &BenchmarkConfig,
    encoding: KeyEncoding,
    run: usize,
) -> Result<VariantRun> {
    let spec = config.workload_spec()?;
    let seed = config.seed.wrapping_add(run as u64);
    let table: SharedTable = Arc::new(RwLock::new(SimulatedTable::new(
        encoding,
        config.page_capacity,
        seed,
    )));

    let preloaded = {
        let mut guard = table.write().await;
        guard
            .preload(config.initial_dataset)
            .map_err(|e| KeybenchError::Preload(e.to_string()))?;
        guard.index().metrics()
    };

    let result = table_executor(&table).run_spec(&spec).await?;
    let index = table.read().await.index().metrics();

    Ok(VariantRun {
        encoding,
        result,
        preloaded,
        index,
    })
}

/// Run every configured variant `config.runs` times and compare them
pub async fn run_experiment(config: &BenchmarkConfig) -> Result<Experiment> {
    config.validate()?;
    let encodings = config.encodings()?;
    let started_at = Utc::now();
    info!(
        "Experiment '{}': {} variants x {} runs, {} ops on {} workers",
        config.scenario,
        encodings.len(),
        config.runs,
        config.total_ops,
        config.workers
    );

    let mut variants = BTreeMap::new();
    for encoding in encodings {
        let mut aggregator = RunAggregator::new();
        for run in 0..config.runs {
            let variant_run = run_variant(config, encoding, run).await?;
            info!(
                "{} run {}/{}: {:.0} ops/s, {} page splits",
                encoding,
                run + 1,
                config.runs,
                variant_run.result.throughput(),
                variant_run.index.page_splits
            );
            aggregator.record_run(&variant_run.result);
            for (name, value) in variant_run.extra_metrics() {
                aggregator.record_metric(name, value);
            }
        }
        variants.insert(encoding.to_string(), aggregator.aggregate());
    }

    let comparisons = VariantComparator::new(config.baseline.as_str()).compare_all(&variants)?;

    Ok(Experiment {
        id: Uuid::now_v7(),
        started_at,
        finished_at: Utc::now(),
        config: config.clone(),
        variants,
        comparisons,
    })
}
