use thiserror::Error;
use crate::types::OperationKind;

/// Main error type for keybench
#[derive(Error, Debug)]
pub enum KeybenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workload weights must sum to 100, got {sum}")]
    InvalidWeights { sum: u32 },

    #[error("Worker budget must be at least 1")]
    ZeroWorkerBudget,

    #[error("No operation callback registered for {0}")]
    MissingOperation(OperationKind),

    #[error("Worker task panicked: {0}")]
    WorkerPanicked(String),

    #[error("Preload failed: {0}")]
    Preload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl KeybenchError {
    /// Whether the error was raised before any work started
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KeybenchError::InvalidWeights { .. }
                | KeybenchError::ZeroWorkerBudget
                | KeybenchError::MissingOperation(_)
                | KeybenchError::Config(_)
        )
    }
}

impl From<serde_json::Error> for KeybenchError {
    fn from(error: serde_json::Error) -> Self {
        KeybenchError::Serialization(error.to_string())
    }
}

/// Failure reported by an operation callback.
///
/// Recorded as a failed sample; never aborts a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

pub type Result<T> = std::result::Result<T, KeybenchError>;
