//! Configuration management for keybench

use crate::benchmarks::key_encoding::KeyEncoding;
use crate::benchmarks::ScenarioPreset;
use crate::workload::WorkloadSpec;
use keybench_common::{KeybenchError, OperationKind, Result, WEIGHT_TOTAL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Operation mix in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub insert: u32,
    pub read: u32,
    pub update: u32,
}

impl WeightConfig {
    pub fn as_map(&self) -> BTreeMap<OperationKind, u32> {
        [
            (OperationKind::Insert, self.insert),
            (OperationKind::Read, self.read),
            (OperationKind::Update, self.update),
        ]
        .into_iter()
        .collect()
    }

    pub fn total(&self) -> u32 {
        self.insert + self.read + self.update
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            insert: 50,
            read: 30,
            update: 20,
        }
    }
}

/// Configuration for one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Preset the weights and dataset size came from
    pub scenario: String,
    /// Operations per run, split across kinds by weight
    pub total_ops: u64,
    /// Concurrent workers per run
    pub workers: usize,
    /// Repetitions per variant
    pub runs: usize,
    pub weights: WeightConfig,
    /// Rows loaded before the measured workload starts
    pub initial_dataset: u64,
    /// Key encodings to compare
    pub variants: Vec<String>,
    /// Variant every other one is compared against
    pub baseline: String,
    /// Keys per simulated leaf page
    pub page_capacity: usize,
    pub seed: u64,
    pub output_dir: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            scenario: "balanced".to_string(),
            total_ops: 10_000,
            workers: num_cpus::get(),
            runs: 5,
            weights: WeightConfig::default(),
            initial_dataset: 10_000,
            variants: KeyEncoding::ALL.iter().map(|e| e.to_string()).collect(),
            baseline: KeyEncoding::Bigserial.to_string(),
            page_capacity: 128,
            seed: 42,
            output_dir: PathBuf::from("./keybench_results"),
        }
    }
}

impl BenchmarkConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KeybenchError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        save_config(self, path)
    }

    /// Take weights and preload size from a preset
    pub fn apply_preset(&mut self, preset: &ScenarioPreset) {
        self.scenario = preset.name.clone();
        self.weights = WeightConfig {
            insert: preset.insert,
            read: preset.read,
            update: preset.update,
        };
        self.initial_dataset = preset.initial_dataset;
    }

    /// Override fields from `KEYBENCH_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        override_from_env("KEYBENCH_TOTAL_OPS", &mut self.total_ops);
        override_from_env("KEYBENCH_WORKERS", &mut self.workers);
        override_from_env("KEYBENCH_RUNS", &mut self.runs);
        if let Ok(dir) = std::env::var("KEYBENCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
    }

    pub fn encodings(&self) -> Result<Vec<KeyEncoding>> {
        self.variants.iter().map(|v| v.parse()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.weights.total() != WEIGHT_TOTAL {
            return Err(KeybenchError::InvalidWeights {
                sum: self.weights.total(),
            });
        }
        if self.workers == 0 {
            return Err(KeybenchError::ZeroWorkerBudget);
        }
        if self.runs == 0 {
            return Err(KeybenchError::Config("runs must be at least 1".to_string()));
        }
        if self.page_capacity < 2 {
            return Err(KeybenchError::Config(
                "page_capacity must be at least 2".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(KeybenchError::Config("no variants configured".to_string()));
        }
        let encodings = self.encodings()?;
        let baseline: KeyEncoding = self.baseline.parse()?;
        if !encodings.contains(&baseline) {
            return Err(KeybenchError::Config(format!(
                "baseline '{}' is not among the variants",
                self.baseline
            )));
        }
        let needs_rows = self.weights.read > 0 || self.weights.update > 0;
        if needs_rows && self.initial_dataset == 0 && self.weights.insert == 0 {
            return Err(KeybenchError::Config(
                "reads and updates need an initial dataset or inserts".to_string(),
            ));
        }
        Ok(())
    }

    pub fn workload_spec(&self) -> Result<WorkloadSpec> {
        WorkloadSpec::new(self.total_ops, self.weights.as_map(), self.workers)
    }
}

fn override_from_env<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}={}: not a valid value", name, raw),
        }
    }
}

/// Configuration source for loading benchmark settings
pub enum ConfigSource {
    File(PathBuf),
    Default,
    Environment,
}

/// Load benchmark configuration from various sources
pub fn load_config(source: ConfigSource) -> Result<BenchmarkConfig> {
    match source {
        ConfigSource::File(path) => BenchmarkConfig::from_file(&path),
        ConfigSource::Default => Ok(BenchmarkConfig::default()),
        ConfigSource::Environment => {
            let mut config = BenchmarkConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}

/// Save benchmark configuration to file
pub fn save_config(config: &BenchmarkConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| KeybenchError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
