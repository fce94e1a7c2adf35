//! Error types for the benchmark harness.
//!
//! Two tiers: [`BenchError`] aborts a run (configuration and persistence
//! problems), [`BackendError`] is scoped to a single trial and is recorded
//! in the raw table instead of being propagated.

use thiserror::Error;

/// Result type for harness operations.
pub type BenchResult<T> = Result<T, BenchError>;

/// Result type for a single backend invocation.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BenchError {
    /// Invalid sweep bounds or missing external dependency.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Requested support size does not fit into the state space.
    #[error("Cardinality {cardinality} exceeds 2^{n} amplitudes")]
    InvalidCardinality {
        /// Number of qubits.
        n: u32,
        /// Requested number of nonzero amplitudes.
        cardinality: u64,
    },

    /// Qubit count outside the supported range.
    #[error("Qubit count {n} outside supported range 1..={max}")]
    InvalidQubitCount {
        /// Requested number of qubits.
        n: u32,
        /// Largest supported qubit count.
        max: u32,
    },

    /// No configured backend could be used.
    #[error("No backend available: {0}")]
    NoBackend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    /// YAML configuration could not be parsed.
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Errors raised by a backend for one trial.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend's underlying dependency cannot be used.
    #[error("Backend not available: {0}")]
    Unavailable(String),

    /// The external program could not be started.
    #[error("Failed to run '{command}': {message}")]
    Spawn {
        /// Program that was invoked.
        command: String,
        /// OS-level failure.
        message: String,
    },

    /// The external program exited unsuccessfully.
    #[error("'{command}' exited with {status}: {stderr}")]
    NonZeroExit {
        /// Program that was invoked.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The backend produced output that could not be interpreted.
    #[error("Malformed backend output: {0}")]
    MalformedOutput(String),

    /// The backend cannot handle this target state.
    #[error("Unsupported state: {0}")]
    UnsupportedState(String),

    /// The invocation did not finish within the configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A native library call failed.
    #[error("Library error: {0}")]
    Library(String),

    /// The emitted circuit could not be tokenized.
    #[error("QASM error: {0}")]
    Qasm(String),
}

impl From<std::io::Error> for BenchError {
    fn from(e: std::io::Error) -> Self {
        BenchError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::MalformedOutput(e.to_string())
    }
}
