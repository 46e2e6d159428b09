//! Reference system under test: key encodings on a simulated index

pub mod index_sim;
pub mod key_encoding;
pub mod scenario;

use keybench_common::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named operation mix with a matching preload size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioPreset {
    pub name: String,
    pub description: String,
    pub insert: u32,
    pub read: u32,
    pub update: u32,
    pub initial_dataset: u64,
}

impl ScenarioPreset {
    fn new(name: &str, description: &str, mix: (u32, u32, u32), initial_dataset: u64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            insert: mix.0,
            read: mix.1,
            update: mix.2,
            initial_dataset,
        }
    }

    pub fn weights(&self) -> BTreeMap<OperationKind, u32> {
        [
            (OperationKind::Insert, self.insert),
            (OperationKind::Read, self.read),
            (OperationKind::Update, self.update),
        ]
        .into_iter()
        .collect()
    }
}

/// Collection of all available scenarios
pub struct ScenarioSuite {
    presets: Vec<ScenarioPreset>,
}

impl ScenarioSuite {
    pub fn new() -> Self {
        let presets = vec![
            ScenarioPreset::new(
                "insert-heavy",
                "90% inserts, 10% reads (logging, event streams)",
                (90, 10, 0),
                100_000,
            ),
            ScenarioPreset::new(
                "read-heavy",
                "10% inserts, 90% reads (catalogs, user profiles)",
                (10, 90, 0),
                1_000_000,
            ),
            ScenarioPreset::new(
                "balanced",
                "50% inserts, 30% reads, 20% updates (OLTP)",
                (50, 30, 20),
                500_000,
            ),
            ScenarioPreset::new("insert-only", "100% inserts into an empty index", (100, 0, 0), 0),
            ScenarioPreset::new(
                "read-after-fragmentation",
                "100% point reads over an index built by the preload",
                (0, 100, 0),
                100_000,
            ),
            ScenarioPreset::new(
                "update-only",
                "100% updates of preloaded rows",
                (0, 0, 100),
                100_000,
            ),
        ];
        Self { presets }
    }

    pub fn presets(&self) -> &[ScenarioPreset] {
        &self.presets
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }
}

impl Default for ScenarioSuite {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_sum_to_100() {
        let suite = ScenarioSuite::new();
        assert_eq!(suite.presets().len(), 6);
        for preset in suite.presets() {
            assert_eq!(preset.weights().values().sum::<u32>(), 100, "{}", preset.name);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let suite = ScenarioSuite::new();
        let preset = suite.get("insert-heavy").unwrap();
        assert_eq!(preset.weights()[&OperationKind::Insert], 90);
        assert_eq!(preset.initial_dataset, 100_000);
        assert!(suite.get("delete-heavy").is_none());
        assert!(suite.names().contains(&"balanced"));
    }

    #[test]
    fn test_single_kind_presets_need_preload() {
        let suite = ScenarioSuite::new();
        let reads = suite.get("read-after-fragmentation").unwrap();
        assert_eq!(reads.weights()[&OperationKind::Read], 100);
        assert!(reads.initial_dataset > 0);

        let updates = suite.get("update-only").unwrap();
        assert_eq!(updates.weights()[&OperationKind::Update], 100);
        assert_eq!(updates.weights()[&OperationKind::Insert], 0);
        assert!(updates.initial_dataset > 0);
    }
}
