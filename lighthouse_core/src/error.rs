//! Error types for the stepping engine and value-table persistence.

use std::path::PathBuf;
use thiserror::Error;

use lighthouse_env::AgentId;

/// Errors raised while saving or loading a value table.
///
/// A missing table is not an error: loading it yields `Ok(None)` and the
/// policy starts from an empty table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage target refused the write
    #[error("Storage target {target} is not writable: {reason}")]
    Unwritable { target: String, reason: String },

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored table was learned over a different action set
    #[error("Incompatible value table: {0}")]
    Incompatible(String),
}

/// Errors raised by the stepping engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn worker thread for agent {agent}: {source}")]
    Spawn {
        agent: AgentId,
        #[source]
        source: std::io::Error,
    },

    /// The worker thread died; its agent will never finish another tick
    #[error("Worker for agent {0} panicked")]
    WorkerPanicked(AgentId),

    #[error("Coordinator has been shut down")]
    Stopped,
}
