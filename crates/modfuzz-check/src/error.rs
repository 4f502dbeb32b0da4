//! Error types for generation, configuration and the harness protocol.

use std::path::PathBuf;

use modfuzz_core::error::CoreError;
use thiserror::Error;

/// A harness event stream that breaks the event vocabulary or the run's
/// state machine. Always fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected harness event: '{line}'")]
    UnknownEvent { line: String },

    #[error("harness event '{event}' is missing its node index")]
    MissingIndex { event: String },

    #[error("bad node index '{token}' in harness event '{event}'")]
    BadIndex { event: String, token: String },

    #[error("harness event '{event}' names node {index} but the graph has {size} nodes")]
    IndexOutOfRange {
        event: String,
        index: u32,
        size: usize,
    },

    #[error("harness event '{event}' arrived after the run concluded")]
    AfterConclusion { event: String },

    #[error("harness trace ended before the run concluded")]
    Unfinished,
}

/// Invalid generator or oracle configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("probability '{name}' must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("graphs need at least 2 nodes, got {size}")]
    GraphTooSmall { size: usize },

    #[error("invalid size range {min}..={max}")]
    InvalidSizeRange { min: usize, max: usize },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors from [`generate`](crate::generator::generate).
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A construction step broke a graph rule.
    #[error("generator produced an invalid graph: {0}")]
    Graph(#[from] CoreError),
}
