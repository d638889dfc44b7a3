//! Scenario runner - builds a threaded simulation and drives it through episodes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use lighthouse_core::{
    AgentSpec, Coordinator, EngineError, QLearningParams, StoreError, ValueStore, WorkerReport,
};
use lighthouse_env::{AgentId, Cell, Environment, SharedWorld, WorldState};

use crate::config::{ConfigError, ScenarioConfig};
use crate::render::AgentSummary;
use crate::seeds::SeedProvider;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives a snapshot of the world after every completed tick.
pub trait FrameSink {
    fn on_tick(&mut self, episode: usize, state: &WorldState);
}

/// Training loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Number of episodes to run
    pub episodes: usize,

    /// Tick limit per episode
    pub max_steps: u64,

    /// Factor applied to epsilon after every episode
    pub epsilon_decay: f64,

    /// Epsilon never decays below this
    pub epsilon_floor: f64,

    /// Persist value tables every N episodes (0 disables periodic saves)
    pub save_interval: usize,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            max_steps: 200,
            epsilon_decay: 0.996,
            epsilon_floor: 0.1,
            save_interval: 100,
        }
    }
}

/// Reward one agent collected during an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReward {
    pub name: String,
    pub reward: f64,
}

/// Outcome of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    /// Zero-based episode index
    pub episode: usize,

    /// Ticks run
    pub steps: u64,

    /// Whether the goal was reached
    pub completed: bool,

    /// Sum over all agents
    pub total_reward: f64,

    /// Per-agent rewards in roster order
    pub rewards: Vec<AgentReward>,

    /// Exploration rate of the first learning agent during the episode
    pub epsilon: Option<f64>,
}

/// Aggregate over a batch of episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub episodes: usize,
    pub completed: usize,
    pub success_rate: f64,
    pub mean_steps: f64,
    pub mean_reward: f64,
}

impl RunSummary {
    pub fn from_results(results: &[EpisodeResult]) -> Self {
        let episodes = results.len();
        let completed = results.iter().filter(|r| r.completed).count();
        let mean = |sum: f64| if episodes == 0 { 0.0 } else { sum / episodes as f64 };

        Self {
            episodes,
            completed,
            success_rate: mean(completed as f64),
            mean_steps: mean(results.iter().map(|r| r.steps as f64).sum()),
            mean_reward: mean(results.iter().map(|r| r.total_reward).sum()),
        }
    }
}

/// A scenario instantiated as a shared world plus one worker thread per agent.
pub struct Simulation {
    name: String,
    seed: u64,
    world: Arc<SharedWorld>,
    coordinator: Coordinator<SharedWorld>,
    agents: Vec<AgentSummary>,
    tables: Arc<HashMap<AgentId, String>>,
    store: Option<Arc<dyn ValueStore>>,
}

impl Simulation {
    /// Validates `config`, places every agent and spawns the workers.
    pub fn build(config: &ScenarioConfig, seed: u64) -> Result<Self, RunnerError> {
        config.validate()?;

        let seeds = SeedProvider::new(seed);
        let world = SharedWorld::shared(config.layout(), config.rewards.clone());
        let mut specs = Vec::with_capacity(config.agents.len());
        let mut agents = Vec::with_capacity(config.agents.len());
        let mut tables = HashMap::new();

        for (index, agent) in config.agents.iter().enumerate() {
            let slot = index as u64;
            let id = seeds.agent_id(slot);
            world.add_agent(id, Cell::from(agent.start));

            let mut spec = AgentSpec::new(agent.name.clone(), agent.policy.build(seeds.agent_seed(slot)))
                .with_id(id)
                .with_vision_reflex(agent.vision_reflex);
            spec.sensors = agent.sensors.iter().map(|kind| kind.build()).collect();

            if agent.policy.is_learning() {
                tables.insert(id, agent.table_id());
            }
            debug!(agent = %id, name = %agent.name, policy = spec.policy.kind(), "Agent configured");
            agents.push(AgentSummary {
                id,
                name: agent.name.clone(),
            });
            specs.push(spec);
        }

        let coordinator = Coordinator::new(Arc::clone(&world), specs)?;
        info!(
            scenario = %config.name,
            seed = seeds.master_seed(),
            agents = agents.len(),
            "Simulation built"
        );

        Ok(Self {
            name: config.name.clone(),
            seed: seeds.master_seed(),
            world,
            coordinator,
            agents,
            tables: Arc::new(tables),
            store: None,
        })
    }

    /// Attaches a store for loading and saving value tables.
    pub fn with_store(mut self, store: Arc<dyn ValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The master seed actually used (never 0).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world(&self) -> &Arc<SharedWorld> {
        &self.world
    }

    /// Agents in roster order.
    pub fn agents(&self) -> &[AgentSummary] {
        &self.agents
    }

    /// Restores every learning agent's table from the store.
    ///
    /// Returns how many tables were found. Without a store this is a no-op.
    pub fn load_tables(&mut self) -> Result<usize, RunnerError> {
        let Some(store) = self.store.clone() else {
            return Ok(0);
        };
        let tables = Arc::clone(&self.tables);

        let results = self.coordinator.maintain(move |id, policy, _| {
            match (policy.as_q_learning_mut(), tables.get(&id)) {
                (Some(q), Some(table)) => q.load(store.as_ref(), table),
                _ => Ok(false),
            }
        })?;

        let mut loaded = 0;
        for (id, result) in results {
            if result? {
                info!(agent = %id, "Value table restored");
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Persists every learning agent's table. Returns how many were written.
    pub fn save_tables(&mut self) -> Result<usize, RunnerError> {
        let Some(store) = self.store.clone() else {
            return Ok(0);
        };
        let tables = Arc::clone(&self.tables);

        let results = self.coordinator.maintain(move |id, policy, _| {
            match (policy.as_q_learning(), tables.get(&id)) {
                (Some(q), Some(table)) => q.save(store.as_ref(), table).map(|()| true),
                _ => Ok(false),
            }
        })?;

        let mut saved = 0;
        for (_, result) in results {
            if result? {
                saved += 1;
            }
        }
        debug!(tables = saved, "Value tables saved");
        Ok(saved)
    }

    /// Replaces the hyperparameters of every learning agent.
    pub fn set_params(&mut self, params: QLearningParams) -> Result<(), RunnerError> {
        self.coordinator.maintain(move |_, policy, _| {
            if let Some(q) = policy.as_q_learning_mut() {
                q.set_params(params);
            }
        })?;
        Ok(())
    }

    /// Decays epsilon on every learning agent; returns the first agent's new value.
    pub fn decay_epsilon(&mut self, factor: f64, floor: f64) -> Result<Option<f64>, RunnerError> {
        let results = self.coordinator.maintain(move |_, policy, _| {
            policy.as_q_learning_mut().map(|q| q.decay_epsilon(factor, floor))
        })?;
        Ok(results.into_iter().find_map(|(_, epsilon)| epsilon))
    }

    /// Runs one episode from the initial positions.
    ///
    /// Stops when the goal is reached or after `max_steps` ticks. Sinks see
    /// a snapshot taken after each tick, outside the world lock.
    pub fn run_episode(
        &mut self,
        episode: usize,
        max_steps: u64,
        sinks: &mut [&mut dyn FrameSink],
    ) -> Result<EpisodeResult, RunnerError> {
        self.world.reset();
        self.coordinator.maintain(|_, _, record| record.reset())?;

        let mut steps = 0;
        while steps < max_steps && !self.world.is_complete() {
            self.coordinator.step()?;
            steps += 1;

            if !sinks.is_empty() {
                let state = self.world.snapshot();
                for sink in sinks.iter_mut() {
                    sink.on_tick(episode, &state);
                }
            }
        }

        let completed = self.world.is_complete();
        let finals = self.coordinator.maintain(move |_, policy, record| {
            let epsilon = policy.as_q_learning_mut().map(|q| {
                q.end_episode(completed);
                q.epsilon()
            });
            (record.cumulative_reward, epsilon)
        })?;

        let names: HashMap<AgentId, &str> = self
            .agents
            .iter()
            .map(|agent| (agent.id, agent.name.as_str()))
            .collect();
        let rewards: Vec<AgentReward> = finals
            .iter()
            .map(|(id, (reward, _))| AgentReward {
                name: names.get(id).copied().unwrap_or_default().to_string(),
                reward: *reward,
            })
            .collect();

        let result = EpisodeResult {
            episode,
            steps,
            completed,
            total_reward: rewards.iter().map(|r| r.reward).sum(),
            epsilon: finals.iter().find_map(|(_, (_, epsilon))| *epsilon),
            rewards,
        };
        debug!(
            episode,
            steps,
            completed,
            reward = result.total_reward,
            "Episode finished"
        );
        Ok(result)
    }

    /// Stops every worker and hands back their final state.
    pub fn shutdown(mut self) -> Result<Vec<WorkerReport>, RunnerError> {
        Ok(self.coordinator.shutdown()?)
    }
}

/// Drives a simulation through a batch of episodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeRunner {
    config: EpisodeConfig,
}

impl EpisodeRunner {
    pub fn new(config: EpisodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }

    /// Runs every episode, decaying epsilon after each one and saving tables
    /// every `save_interval` episodes.
    pub fn run(
        &self,
        sim: &mut Simulation,
        sinks: &mut [&mut dyn FrameSink],
    ) -> Result<Vec<EpisodeResult>, RunnerError> {
        let config = &self.config;
        let mut results = Vec::with_capacity(config.episodes);

        for episode in 0..config.episodes {
            let result = sim.run_episode(episode, config.max_steps, sinks)?;
            sim.decay_epsilon(config.epsilon_decay, config.epsilon_floor)?;

            let done = episode + 1;
            if config.save_interval > 0 && done % config.save_interval == 0 {
                let saved = sim.save_tables()?;
                debug!(episode = done, tables = saved, "Periodic save");
            }
            let epsilon = result.epsilon;
            results.push(result);

            if done % 100 == 0 || done == config.episodes {
                let summary = RunSummary::from_results(&results[results.len().saturating_sub(100)..]);
                info!(
                    episode = done,
                    success_rate = summary.success_rate,
                    mean_steps = summary.mean_steps,
                    epsilon = ?epsilon,
                    "Training progress"
                );
            }
        }

        Ok(results)
    }
}
