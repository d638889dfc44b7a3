//! Perception sources: sensors that turn a world snapshot into observation
//! channels for one agent.

use tracing::trace;

use crate::observation::{channels, ObsValue, Observation};
use crate::types::{AgentId, Direction, StateKey};
use crate::world::WorldState;

/// Threshold used when bucketing the goal direction into a compass heading.
pub const COMPASS_THRESHOLD: f64 = 0.3;

/// A sensor installed on an agent.
///
/// Sensors read a consistent [`WorldState`] snapshot, never the live world,
/// so they cannot observe a half-resolved tick.
pub trait PerceptionSource: Send + Sync {
    /// Produces this sensor's channels for `agent`.
    fn detect(&self, world: &WorldState, agent: AgentId) -> Observation;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Runs every source in installation order and merges their outputs.
///
/// Later sources overwrite channels already published by earlier ones.
pub fn merge_observations(
    sources: &[Box<dyn PerceptionSource>],
    world: &WorldState,
    agent: AgentId,
) -> Observation {
    let mut merged = Observation::new();
    for source in sources {
        let obs = source.detect(world, agent);
        trace!(agent = %agent, sensor = source.name(), channels = obs.len(), "Sensor reading");
        merged.merge(obs);
    }
    merged
}

/// Publishes the unit vector and distance to the goal plus the agent's cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionSensor;

impl PerceptionSource for DirectionSensor {
    fn detect(&self, world: &WorldState, agent: AgentId) -> Observation {
        let Some(position) = world.position(agent) else {
            return Observation::new()
                .with(channels::DIRECTION, ObsValue::Vector(0.0, 0.0))
                .with(channels::ERROR, ObsValue::Text(format!("agent {agent} not in world")));
        };
        let goal = world.goal();
        let (dx, dy) = position.unit_vector_to(&goal);

        Observation::new()
            .with(channels::DIRECTION, ObsValue::Vector(dx, dy))
            .with(channels::DISTANCE, ObsValue::Scalar(position.distance_to(&goal)))
            .with(channels::POSITION, ObsValue::Cell(position))
    }

    fn name(&self) -> &'static str {
        "direction"
    }
}

/// Publishes which of the eight neighbours are blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProximitySensor;

impl PerceptionSource for ProximitySensor {
    fn detect(&self, world: &WorldState, agent: AgentId) -> Observation {
        match world.position(agent) {
            Some(position) => Observation::new().with(
                channels::OBSTACLE_MASK,
                ObsValue::Mask(world.layout().obstacle_mask_around(&position)),
            ),
            None => Observation::new(),
        }
    }

    fn name(&self) -> &'static str {
        "proximity"
    }
}

/// Short-range sight of the goal.
#[derive(Debug, Clone, Copy)]
pub struct VisionSensor {
    radius: f64,
}

impl VisionSensor {
    pub const DEFAULT_RADIUS: f64 = 1.5;

    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Default for VisionSensor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RADIUS)
    }
}

impl PerceptionSource for VisionSensor {
    fn detect(&self, world: &WorldState, agent: AgentId) -> Observation {
        let Some(position) = world.position(agent) else {
            return Observation::new().with(channels::TARGET_SEEN, ObsValue::Flag(false));
        };
        let goal = world.goal();
        let distance = position.distance_to(&goal);
        let mut obs = Observation::new().with(channels::POSITION, ObsValue::Cell(position));

        if distance > 0.0 && distance <= self.radius {
            let (dx, dy) = position.unit_vector_to(&goal);
            obs.insert(channels::TARGET_SEEN, ObsValue::Flag(true));
            obs.insert(channels::VISUAL_DIRECTION, ObsValue::Vector(dx, dy));
            obs.insert(channels::DISTANCE, ObsValue::Scalar(distance));
        } else {
            obs.insert(channels::TARGET_SEEN, ObsValue::Flag(false));
        }
        obs
    }

    fn name(&self) -> &'static str {
        "vision"
    }
}

/// Publishes the composite learning key: compass heading to the goal plus
/// the blocked-neighbour mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateKeySensor;

impl StateKeySensor {
    /// Builds the composite key for an agent at a known position.
    pub fn key_for(world: &WorldState, agent: AgentId) -> Option<StateKey> {
        let position = world.position(agent)?;
        let (dx, dy) = position.unit_vector_to(&world.goal());
        Some(StateKey::Composite {
            heading: Direction::from_vector(dx, dy, COMPASS_THRESHOLD),
            obstacles: world.layout().obstacle_mask_around(&position),
        })
    }
}

impl PerceptionSource for StateKeySensor {
    fn detect(&self, world: &WorldState, agent: AgentId) -> Observation {
        match Self::key_for(world, agent) {
            Some(key) => Observation::new().with(channels::STATE_KEY, ObsValue::Key(key)),
            None => Observation::new(),
        }
    }

    fn name(&self) -> &'static str {
        "state_key"
    }
}
