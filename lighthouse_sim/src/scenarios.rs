//! Built-in scenario presets.

use lighthouse_core::QLearningParams;
use lighthouse_env::RewardConfig;

use crate::config::{AgentConfig, PolicyConfig, ScenarioConfig, SensorKind, WorldConfig};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Open field with a lighthouse and two rocks
    Beacon,

    /// Walled maze with a single exit
    Maze,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Beacon, ScenarioId::Maze]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Beacon => "beacon",
            ScenarioId::Maze => "maze",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Beacon => "10x10 field, beacon at (8,8), one position-keyed Q-learner",
            ScenarioId::Maze => "12x12 maze with two walls, composite-key Q-learner plus a greedy walker",
        }
    }

    /// Builds the preset's configuration.
    pub fn config(&self) -> ScenarioConfig {
        match self {
            ScenarioId::Beacon => beacon(),
            ScenarioId::Maze => maze(),
        }
    }
}

fn beacon() -> ScenarioConfig {
    ScenarioConfig {
        name: "beacon".to_string(),
        world: WorldConfig {
            width: 10,
            height: 10,
            goal: (8, 8),
            obstacles: vec![(5, 5), (2, 2)],
        },
        rewards: RewardConfig::default(),
        agents: vec![AgentConfig {
            name: "Keeper".to_string(),
            start: (0, 0),
            policy: PolicyConfig::QLearning(QLearningParams::default()),
            sensors: vec![SensorKind::Direction, SensorKind::Proximity],
            vision_reflex: false,
            table: None,
        }],
    }
}

fn maze() -> ScenarioConfig {
    // Two walls: x = 3 open at the bottom, x = 7 open at the top
    let mut obstacles: Vec<(i32, i32)> = (0..=8).map(|y| (3, y)).collect();
    obstacles.extend((3..=11).map(|y| (7, y)));

    ScenarioConfig {
        name: "maze".to_string(),
        world: WorldConfig {
            width: 12,
            height: 12,
            goal: (10, 10),
            obstacles,
        },
        rewards: RewardConfig {
            goal_bonus: 500.0,
            ..RewardConfig::default()
        },
        agents: vec![
            AgentConfig {
                name: "Theseus".to_string(),
                start: (0, 0),
                policy: PolicyConfig::QLearning(QLearningParams {
                    epsilon: 0.6,
                    ..QLearningParams::default()
                }),
                sensors: vec![
                    SensorKind::Direction,
                    SensorKind::Proximity,
                    SensorKind::StateKey,
                ],
                vision_reflex: false,
                table: None,
            },
            AgentConfig {
                name: "Wanderer".to_string(),
                start: (0, 11),
                policy: PolicyConfig::Greedy,
                sensors: vec![SensorKind::Direction, SensorKind::Proximity],
                vision_reflex: false,
                table: None,
            },
        ],
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beacon" | "lighthouse" | "farol" => Ok(ScenarioId::Beacon),
            "maze" | "labyrinth" => Ok(ScenarioId::Maze),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
