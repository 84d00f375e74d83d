//! Error types for relink-core operations.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Per-line Record Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a single log line could not be decoded into a `TaskRecord`.
///
/// These never abort a run: the pipeline reports the line and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("missing marker {0:?}")]
    MissingMarker(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("proc count must be at least 1")]
    ZeroProcCount,

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid timestamp {value:?}: {details}")]
    InvalidTimestamp { value: String, details: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Run Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur while relinking.
#[derive(Debug, thiserror::Error)]
pub enum RelinkError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Cannot read task log {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Queue Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn queue tool: {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using RelinkError.
pub type Result<T> = std::result::Result<T, RelinkError>;
