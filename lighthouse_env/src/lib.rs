//! Lighthouse Environment Layer
//!
//! This crate holds everything the agents share: the grid world itself and
//! the vocabulary agents use to talk to it.
//!
//! # Core Concept: One Lock, One Resolution
//!
//! All mutable world state lives in [`SharedWorld`], behind a single mutex:
//! - Agents submit [`Action`]s and receive scalar rewards (`resolve`)
//! - Walls and obstacles are outcomes, not errors: they come back as penalties
//! - Malformed actions resolve to a logged zero-reward no-op
//!
//! Sensors ([`PerceptionSource`]) read cloned [`WorldState`] snapshots and
//! publish named [`Observation`] channels.
//!
//! # Example
//!
//! ```
//! use lighthouse_env::{Action, AgentId, Cell, Direction, Environment, GridLayout, RewardConfig, SharedWorld};
//!
//! let world = SharedWorld::new(GridLayout::new(10, 10, Cell::new(8, 8)), RewardConfig::default());
//! let agent = AgentId::from_seed(1);
//! world.add_agent(agent, Cell::new(0, 0));
//!
//! let reward = world.resolve(&Action::move_in(Direction::SouthEast), agent);
//! assert!(reward > 0.0);
//! ```

mod action;
mod environment;
mod error;
mod observation;
mod perception;
mod types;
mod world;

pub use action::{Action, ActionKind, ActionParam, DIRECTION_PARAM};
pub use environment::Environment;
pub use error::EnvError;
pub use observation::{channels, ObsValue, Observation};
pub use perception::{
    merge_observations, DirectionSensor, PerceptionSource, ProximitySensor, StateKeySensor,
    VisionSensor, COMPASS_THRESHOLD,
};
pub use types::{AgentId, Cell, Direction, ObstacleMask, StateKey};
pub use world::{GridLayout, RewardConfig, RewardTally, SharedWorld, WorldState};
