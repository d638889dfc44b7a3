//! Scenario configuration: JSON loading and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use lighthouse_core::{AgentPolicy, GreedyPolicy, QLearningParams, QLearningPolicy, RandomPolicy};
use lighthouse_env::{
    Cell, Direction, DirectionSensor, GridLayout, PerceptionSource, ProximitySensor, RewardConfig,
    StateKeySensor, VisionSensor,
};

/// Errors raised while loading a scenario. All of them are fatal: the
/// simulation does not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// A complete scenario: world geometry, reward shaping and agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub world: WorldConfig,

    #[serde(default)]
    pub rewards: RewardConfig,

    pub agents: Vec<AgentConfig>,
}

/// World geometry. Cells are `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub width: i32,
    pub height: i32,
    pub goal: (i32, i32),

    #[serde(default)]
    pub obstacles: Vec<(i32, i32)>,
}

/// One agent of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub start: (i32, i32),
    pub policy: PolicyConfig,

    /// Installed in order; later sensors win channel collisions
    #[serde(default)]
    pub sensors: Vec<SensorKind>,

    #[serde(default)]
    pub vision_reflex: bool,

    /// Storage id of the value table (learning agents only)
    #[serde(default)]
    pub table: Option<String>,
}

/// Policy kind plus its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyConfig {
    Random,
    Greedy,
    #[serde(rename = "qlearning")]
    QLearning(QLearningParams),
}

impl PolicyConfig {
    /// Instantiates the policy with a per-agent seed.
    pub fn build(&self, seed: u64) -> AgentPolicy {
        match self {
            PolicyConfig::Random => RandomPolicy::new(Direction::ALL.to_vec(), seed).into(),
            PolicyConfig::Greedy => GreedyPolicy::default().into(),
            PolicyConfig::QLearning(params) => QLearningPolicy::new(*params, seed).into(),
        }
    }

    pub fn is_learning(&self) -> bool {
        matches!(self, PolicyConfig::QLearning(_))
    }
}

/// Built-in perception sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Direction,
    Proximity,
    Vision,
    StateKey,
}

impl SensorKind {
    pub fn build(self) -> Box<dyn PerceptionSource> {
        match self {
            SensorKind::Direction => Box::new(DirectionSensor),
            SensorKind::Proximity => Box::new(ProximitySensor),
            SensorKind::Vision => Box::new(VisionSensor::default()),
            SensorKind::StateKey => Box::new(StateKeySensor),
        }
    }
}

impl AgentConfig {
    /// Storage id of this agent's value table.
    pub fn table_id(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| format!("{}.qtable.json", self.name.to_lowercase()))
    }
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl ScenarioConfig {
    /// Reads and validates a scenario file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses and validates a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks bounds, hyperparameter ranges and agent names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let layout = self.layout();

        if self.world.width <= 0 || self.world.height <= 0 {
            return invalid(format!(
                "world dimensions must be positive, got {}x{}",
                self.world.width, self.world.height
            ));
        }
        if !layout.in_bounds(&layout.goal()) {
            return invalid(format!("goal {} lies outside the world", layout.goal()));
        }
        if self.agents.is_empty() {
            return invalid("scenario has no agents".to_string());
        }
        if self.rewards.goal_radius.is_nan() || self.rewards.goal_radius <= 0.0 {
            return invalid(format!("goal radius must be positive, got {}", self.rewards.goal_radius));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return invalid(format!("duplicate agent name '{}'", agent.name));
            }
            if agent.name.is_empty() {
                return invalid("agent name must not be empty".to_string());
            }
            let start = Cell::from(agent.start);
            if !layout.in_bounds(&start) {
                return invalid(format!("agent '{}' starts outside the world at {}", agent.name, start));
            }
            if layout.is_blocked(&start) {
                return invalid(format!("agent '{}' starts on an obstacle at {}", agent.name, start));
            }
            if let PolicyConfig::QLearning(params) = &agent.policy {
                for (label, value) in [
                    ("alpha", params.alpha),
                    ("gamma", params.gamma),
                    ("epsilon", params.epsilon),
                ] {
                    if !unit_interval(value) {
                        return invalid(format!(
                            "agent '{}': {} must lie in [0, 1], got {}",
                            agent.name, label, value
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// The world geometry as a layout.
    pub fn layout(&self) -> GridLayout {
        GridLayout::new(self.world.width, self.world.height, Cell::from(self.world.goal))
            .with_obstacles(self.world.obstacles.iter().copied().map(Cell::from))
    }
}
