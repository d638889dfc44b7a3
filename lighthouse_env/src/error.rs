//! Error types for the Lighthouse environment layer.

use thiserror::Error;

use crate::types::AgentId;

/// Errors that can occur while resolving actions or assembling observations.
///
/// None of these are fatal to a running simulation: action resolution turns
/// them into a zero-reward no-op and logs them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// The action kind tag is not one the world knows how to apply
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    /// A named direction that is not one of the eight compass directions
    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    /// A move action without a usable direction parameter
    #[error("Move action has no direction parameter")]
    MissingDirection,

    /// An explicit direction vector that cannot be turned into a grid step
    #[error("Invalid direction vector ({dx}, {dy})")]
    InvalidVector {
        /// Horizontal component
        dx: f64,
        /// Vertical component
        dy: f64,
    },

    /// The agent has never been placed in this world
    #[error("Agent not present in world: {0}")]
    UnknownAgent(AgentId),

    /// Two perception sources published the same channel (strict merge only)
    #[error("Observation channel published twice: {0}")]
    ChannelCollision(String),
}

impl EnvError {
    /// Creates an unknown-direction error.
    pub fn unknown_direction(name: impl Into<String>) -> Self {
        Self::UnknownDirection(name.into())
    }

    /// Creates an unknown-action-kind error.
    pub fn unknown_kind(kind: impl std::fmt::Display) -> Self {
        Self::UnknownActionKind(kind.to_string())
    }
}
