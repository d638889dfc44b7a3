//! Lighthouse simulation harness
//!
//! Builds scenarios on top of the lockstep engine in `lighthouse_core` and
//! drives them through training episodes.
//!
//! # Usage
//!
//! ```no_run
//! use lighthouse_sim::scenarios::ScenarioId;
//! use lighthouse_sim::{EpisodeConfig, EpisodeRunner, Simulation};
//!
//! let mut sim = Simulation::build(&ScenarioId::Beacon.config(), 42)?;
//! let runner = EpisodeRunner::new(EpisodeConfig { episodes: 10, ..Default::default() });
//! let results = runner.run(&mut sim, &mut [])?;
//! println!("last episode took {} steps", results[9].steps);
//! # Ok::<(), lighthouse_sim::RunnerError>(())
//! ```

pub mod config;
mod exporter;
mod render;
mod runner;
pub mod scenarios;
mod seeds;
mod study;

pub use config::{AgentConfig, ConfigError, PolicyConfig, ScenarioConfig, SensorKind, WorldConfig};
pub use exporter::{AgentFrame, SimExport, SimFrame};
pub use render::{AgentSummary, AsciiRenderer, ConsoleView, Renderer};
pub use runner::{
    AgentReward, EpisodeConfig, EpisodeResult, EpisodeRunner, FrameSink, RunSummary, RunnerError,
    Simulation,
};
pub use seeds::SeedProvider;
pub use study::{moving_average, ParameterStudy, StudyParameter, StudyResult};
