//! Hyperparameter sweeps over a learning scenario.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use lighthouse_core::QLearningParams;

use crate::config::{ConfigError, PolicyConfig, ScenarioConfig};
use crate::runner::{EpisodeConfig, EpisodeRunner, RunnerError, Simulation};

/// Exploration rate used while sweeping alpha or gamma.
pub const STUDY_EPSILON: f64 = 0.6;

/// Default smoothing window and tail length.
pub const STUDY_WINDOW: usize = 50;

/// The hyperparameter being swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyParameter {
    Alpha,
    Gamma,
    Epsilon,
}

impl StudyParameter {
    pub fn name(&self) -> &'static str {
        match self {
            StudyParameter::Alpha => "alpha",
            StudyParameter::Gamma => "gamma",
            StudyParameter::Epsilon => "epsilon",
        }
    }

    /// Returns `base` with this parameter set to `value`.
    pub fn apply(&self, base: QLearningParams, value: f64) -> QLearningParams {
        match self {
            StudyParameter::Alpha => QLearningParams { alpha: value, ..base },
            StudyParameter::Gamma => QLearningParams { gamma: value, ..base },
            StudyParameter::Epsilon => QLearningParams { epsilon: value, ..base },
        }
    }
}

impl fmt::Display for StudyParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StudyParameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alpha" => Ok(StudyParameter::Alpha),
            "gamma" => Ok(StudyParameter::Gamma),
            "epsilon" => Ok(StudyParameter::Epsilon),
            _ => Err(format!("Unknown study parameter: {}", s)),
        }
    }
}

/// Learning curve for one parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyResult {
    pub parameter: StudyParameter,
    pub value: f64,

    /// Ticks per episode
    pub steps: Vec<u64>,

    /// Steps smoothed over the study window
    pub moving_average: Vec<f64>,

    /// Mean steps over the last window of episodes
    pub final_mean: f64,
}

/// Mean of every full window of `data`; empty when `data` is shorter than
/// the window.
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }
    data.windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

fn tail_mean(data: &[f64], window: usize) -> f64 {
    let tail = &data[data.len().saturating_sub(window)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

/// Runs a scenario once per value of one hyperparameter, each time from an
/// empty value table and without epsilon decay.
#[derive(Debug, Clone)]
pub struct ParameterStudy {
    scenario: ScenarioConfig,
    parameter: StudyParameter,
    values: Vec<f64>,
    episodes: usize,
    max_steps: u64,
    seed: u64,
    window: usize,
}

impl ParameterStudy {
    pub fn new(scenario: ScenarioConfig, parameter: StudyParameter, values: Vec<f64>) -> Self {
        let defaults = EpisodeConfig::default();
        Self {
            scenario,
            parameter,
            values,
            episodes: defaults.episodes,
            max_steps: defaults.max_steps,
            seed: 42,
            window: STUDY_WINDOW,
        }
    }

    pub fn with_episodes(mut self, episodes: usize, max_steps: u64) -> Self {
        self.episodes = episodes;
        self.max_steps = max_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Hyperparameters of the scenario's first learning agent.
    fn base_params(&self) -> QLearningParams {
        self.scenario
            .agents
            .iter()
            .find_map(|agent| match agent.policy {
                PolicyConfig::QLearning(params) => Some(params),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn run(&self) -> Result<Vec<StudyResult>, RunnerError> {
        if !self.scenario.agents.iter().any(|a| a.policy.is_learning()) {
            return Err(ConfigError::Invalid(format!(
                "scenario '{}' has no learning agent to study",
                self.scenario.name
            ))
            .into());
        }
        if let Some(bad) = self.values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(ConfigError::Invalid(format!(
                "{} value {} lies outside [0, 1]",
                self.parameter, bad
            ))
            .into());
        }

        let mut base = self.base_params();
        if self.parameter != StudyParameter::Epsilon {
            base.epsilon = STUDY_EPSILON;
        }
        let runner = EpisodeRunner::new(EpisodeConfig {
            episodes: self.episodes,
            max_steps: self.max_steps,
            epsilon_decay: 1.0,
            epsilon_floor: 0.0,
            save_interval: 0,
        });

        let mut results = Vec::with_capacity(self.values.len());
        for &value in &self.values {
            let mut sim = Simulation::build(&self.scenario, self.seed)?;
            sim.set_params(self.parameter.apply(base, value))?;
            let episodes = runner.run(&mut sim, &mut [])?;
            sim.shutdown()?;

            let steps: Vec<u64> = episodes.iter().map(|e| e.steps).collect();
            let as_f64: Vec<f64> = steps.iter().map(|&s| s as f64).collect();
            let final_mean = tail_mean(&as_f64, self.window);
            info!(
                parameter = %self.parameter,
                value,
                final_mean,
                "Study point finished"
            );

            results.push(StudyResult {
                parameter: self.parameter,
                value,
                moving_average: moving_average(&as_f64, self.window),
                final_mean,
                steps,
            });
        }
        Ok(results)
    }
}
