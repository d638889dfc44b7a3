//! JSON exporter for replaying runs.
//!
//! Exports per-tick grid frames plus per-episode results as one JSON document.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use lighthouse_env::WorldState;

use crate::render::AgentSummary;
use crate::runner::{EpisodeResult, FrameSink};

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Zero-based episode index
    pub episode: usize,

    /// Tick within the episode
    pub tick: u64,

    /// Agent positions and running rewards
    pub agents: Vec<AgentFrame>,

    /// Whether the goal has been reached
    pub completed: bool,
}

/// Agent frame data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFrame {
    pub name: String,
    pub x: i32,
    pub y: i32,

    /// Reward collected so far in this episode
    pub reward: f64,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Total ticks over all episodes
    pub total_ticks: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Per-episode results
    pub episodes: Vec<EpisodeResult>,

    /// Whether the final episode reached the goal
    pub completed: bool,

    #[serde(skip)]
    agents: Vec<AgentSummary>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, agents: Vec<AgentSummary>) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            total_ticks: 0,
            frames: Vec::new(),
            episodes: Vec::new(),
            completed: false,
            agents,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.total_ticks += 1;
        self.frames.push(frame);
    }

    /// Records the episode results.
    pub fn finalize(&mut self, episodes: &[EpisodeResult]) {
        self.completed = episodes.last().is_some_and(|e| e.completed);
        self.episodes = episodes.to_vec();
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl FrameSink for SimExport {
    fn on_tick(&mut self, episode: usize, state: &WorldState) {
        let agents = self
            .agents
            .iter()
            .filter_map(|agent| {
                let cell = state.position(agent.id)?;
                Some(AgentFrame {
                    name: agent.name.clone(),
                    x: cell.x,
                    y: cell.y,
                    reward: state.tally(agent.id).total,
                })
            })
            .collect();

        self.add_frame(SimFrame {
            episode,
            tick: state.tick(),
            agents,
            completed: state.is_complete(),
        });
    }
}
