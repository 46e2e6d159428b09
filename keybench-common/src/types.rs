use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::KeybenchError;

/// Significance threshold applied to every variant comparison
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Percent total every workload weight table must add up to
pub const WEIGHT_TOTAL: u32 = 100;

/// Category of unit of work driving proportional worker allocation.
///
/// The declaration order is the tie-break order used everywhere a
/// deterministic choice between kinds is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Read,
    Update,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Insert,
        OperationKind::Read,
        OperationKind::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = KeybenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(OperationKind::Insert),
            "read" => Ok(OperationKind::Read),
            "update" => Ok(OperationKind::Update),
            other => Err(KeybenchError::Config(format!("unknown operation kind: {}", other))),
        }
    }
}

/// Result of a single timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

/// One timed invocation of an operation callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    pub kind: OperationKind,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl LatencySample {
    pub fn success(kind: OperationKind, duration: Duration) -> Self {
        Self { kind, duration, outcome: Outcome::Success }
    }

    pub fn failure(kind: OperationKind, duration: Duration) -> Self {
        Self { kind, duration, outcome: Outcome::Failure }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ordering_follows_declaration() {
        assert!(OperationKind::Insert < OperationKind::Read);
        assert!(OperationKind::Read < OperationKind::Update);
        let mut kinds = vec![OperationKind::Update, OperationKind::Insert, OperationKind::Read];
        kinds.sort();
        assert_eq!(kinds, OperationKind::ALL.to_vec());
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.to_string().parse::<OperationKind>().unwrap(), kind);
        }
        assert_eq!(" READ ".parse::<OperationKind>().unwrap(), OperationKind::Read);
        assert!("delete".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_sample_constructors() {
        let ok = LatencySample::success(OperationKind::Insert, Duration::from_millis(3));
        let failed = LatencySample::failure(OperationKind::Insert, Duration::from_millis(3));
        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert_eq!(ok.duration, failed.duration);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&OperationKind::Update).unwrap();
        assert_eq!(json, "\"update\"");
    }
}
