//! Observations: named perception channels produced fresh every tick.

use std::collections::BTreeMap;

use crate::error::EnvError;
use crate::types::{Cell, ObstacleMask, StateKey};

/// Well-known channel names published by the built-in perception sources.
pub mod channels {
    /// Unit vector towards the goal (`Vector`)
    pub const DIRECTION: &str = "direction";
    /// Euclidean distance to the goal (`Scalar`)
    pub const DISTANCE: &str = "distance";
    /// The agent's own cell (`Cell`)
    pub const POSITION: &str = "position";
    /// Blocked neighbours (`Mask`)
    pub const OBSTACLE_MASK: &str = "obstacle_mask";
    /// Whether the goal is within visual range (`Flag`)
    pub const TARGET_SEEN: &str = "target_seen";
    /// Unit vector towards a goal within visual range (`Vector`)
    pub const VISUAL_DIRECTION: &str = "visual_direction";
    /// Precomputed composite learning key (`Key`)
    pub const STATE_KEY: &str = "state_key";
    /// Perception failure description (`Text`)
    pub const ERROR: &str = "error";
}

/// A single value carried by an observation channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ObsValue {
    Vector(f64, f64),
    Scalar(f64),
    Cell(Cell),
    Mask(ObstacleMask),
    Flag(bool),
    Key(StateKey),
    Text(String),
}

/// An immutable-by-convention mapping from channel name to value.
///
/// Channels are kept sorted by name, so two observations with the same
/// channels compare equal regardless of the order they were published in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    channels: BTreeMap<String, ObsValue>,
}

impl Observation {
    /// Creates an empty observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, channel: impl Into<String>, value: ObsValue) -> Self {
        self.insert(channel, value);
        self
    }

    /// Publishes a channel, replacing any previous value.
    pub fn insert(&mut self, channel: impl Into<String>, value: ObsValue) {
        self.channels.insert(channel.into(), value);
    }

    /// Raw access to a channel.
    pub fn get(&self, channel: &str) -> Option<&ObsValue> {
        self.channels.get(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn vector(&self, channel: &str) -> Option<(f64, f64)> {
        match self.channels.get(channel) {
            Some(ObsValue::Vector(dx, dy)) => Some((*dx, *dy)),
            _ => None,
        }
    }

    pub fn scalar(&self, channel: &str) -> Option<f64> {
        match self.channels.get(channel) {
            Some(ObsValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn cell(&self, channel: &str) -> Option<Cell> {
        match self.channels.get(channel) {
            Some(ObsValue::Cell(cell)) => Some(*cell),
            _ => None,
        }
    }

    pub fn mask(&self, channel: &str) -> Option<ObstacleMask> {
        match self.channels.get(channel) {
            Some(ObsValue::Mask(mask)) => Some(*mask),
            _ => None,
        }
    }

    pub fn flag(&self, channel: &str) -> Option<bool> {
        match self.channels.get(channel) {
            Some(ObsValue::Flag(flag)) => Some(*flag),
            _ => None,
        }
    }

    pub fn state_key(&self, channel: &str) -> Option<StateKey> {
        match self.channels.get(channel) {
            Some(ObsValue::Key(key)) => Some(*key),
            _ => None,
        }
    }

    /// Merges `other` into `self`; on a name collision `other` wins.
    ///
    /// This is the merge used between installed perception sources. Silent
    /// overwrites are kept for compatibility with existing sensor sets; see
    /// [`Observation::merge_strict`] for the rejecting variant.
    pub fn merge(&mut self, other: Observation) {
        self.channels.extend(other.channels);
    }

    /// Merges `other` into `self`, refusing to overwrite an existing channel.
    ///
    /// On error `self` is left untouched.
    pub fn merge_strict(&mut self, other: Observation) -> Result<(), EnvError> {
        if let Some(name) = other.channels.keys().find(|k| self.channels.contains_key(*k)) {
            return Err(EnvError::ChannelCollision(name.clone()));
        }
        self.channels.extend(other.channels);
        Ok(())
    }

    /// Iterates over channels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObsValue)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
