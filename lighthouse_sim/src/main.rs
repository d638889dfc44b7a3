//! Lighthouse simulator CLI
//!
//! Train agents on a built-in or JSON scenario, render or export the run, or
//! sweep one learning hyperparameter.

use clap::{Parser, ValueEnum};
use lighthouse_core::{FileStore, SledStore, ValueStore};
use lighthouse_sim::scenarios::ScenarioId;
use lighthouse_sim::{
    AsciiRenderer, ConsoleView, EpisodeConfig, EpisodeRunner, FrameSink, ParameterStudy,
    RunSummary, RunnerError, ScenarioConfig, SimExport, Simulation, StudyParameter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Value-table storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// One JSON file per agent below the --qtable directory
    File,
    /// A sled database at the --qtable path
    Sled,
}

/// Lighthouse multi-agent grid simulator
#[derive(Parser, Debug)]
#[command(name = "lighthouse-sim")]
#[command(about = "Run lockstep multi-agent grid simulations", long_about = None)]
struct Args {
    /// Built-in scenario (beacon, maze) or path to a scenario JSON file
    #[arg(short = 'S', long, default_value = "beacon")]
    scenario: String,

    /// Number of episodes
    #[arg(short, long, default_value_t = EpisodeConfig::default().episodes)]
    episodes: usize,

    /// Tick limit per episode
    #[arg(short, long, default_value_t = EpisodeConfig::default().max_steps)]
    max_steps: u64,

    /// Master seed for determinism (0 = random)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Value-table location: loaded before the run, saved during and after it
    #[arg(long)]
    qtable: Option<PathBuf>,

    /// Storage backend for --qtable
    #[arg(long, value_enum, default_value = "file")]
    store: StoreKind,

    /// Print the grid after every tick
    #[arg(long)]
    render: bool,

    /// Export every tick to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Sweep one hyperparameter (alpha, gamma, epsilon) instead of training
    #[arg(long)]
    study: Option<StudyParameter>,

    /// Values for --study, comma separated
    #[arg(long, value_delimiter = ',', default_value = "0.1,0.5,0.9")]
    values: Vec<f64>,

    /// List built-in scenarios and exit
    #[arg(long)]
    list: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_scenario(name: &str) -> Result<ScenarioConfig, RunnerError> {
    match name.parse::<ScenarioId>() {
        Ok(id) => Ok(id.config()),
        Err(_) => Ok(ScenarioConfig::from_file(name)?),
    }
}

fn open_store(kind: StoreKind, path: &Path) -> Result<Arc<dyn ValueStore>, RunnerError> {
    Ok(match kind {
        StoreKind::File => Arc::new(FileStore::new(path)),
        StoreKind::Sled => Arc::new(SledStore::open(path)?),
    })
}

fn print_json(value: &serde_json::Value) -> Result<(), RunnerError> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{}", text);
    Ok(())
}

fn train(args: &Args, scenario: &ScenarioConfig) -> Result<(), RunnerError> {
    let mut sim = Simulation::build(scenario, args.seed)?;
    if let Some(path) = &args.qtable {
        sim = sim.with_store(open_store(args.store, path)?);
        let loaded = sim.load_tables()?;
        info!("Restored {} value table(s) from {}", loaded, path.display());
    }

    let mut view = args
        .render
        .then(|| ConsoleView::new(AsciiRenderer, sim.agents().to_vec()));
    let mut export = args
        .export
        .as_ref()
        .map(|_| SimExport::new(sim.name(), sim.seed(), sim.agents().to_vec()));

    let runner = EpisodeRunner::new(EpisodeConfig {
        episodes: args.episodes,
        max_steps: args.max_steps,
        ..EpisodeConfig::default()
    });

    let mut sinks: Vec<&mut dyn FrameSink> = Vec::new();
    if let Some(view) = view.as_mut() {
        sinks.push(view);
    }
    if let Some(export) = export.as_mut() {
        sinks.push(export);
    }
    let results = runner.run(&mut sim, &mut sinks)?;

    let saved = sim.save_tables()?;
    if saved > 0 {
        info!("Saved {} value table(s)", saved);
    }

    if let (Some(export), Some(path)) = (export.as_mut(), args.export.as_ref()) {
        export.finalize(&results);
        export.write_to_file(path)?;
        info!("Exported {} frames to {}", export.frames.len(), path.display());
    }

    let summary = RunSummary::from_results(&results);
    if args.json {
        print_json(&serde_json::json!({
            "scenario": sim.name(),
            "seed": sim.seed(),
            "summary": summary,
            "last_episode": results.last(),
        }))?;
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "{} (seed={}): {}/{} episodes reached the goal, mean {:.1} steps, mean reward {:.1}",
            sim.name(),
            sim.seed(),
            summary.completed,
            summary.episodes,
            summary.mean_steps,
            summary.mean_reward
        );
    }

    sim.shutdown()?;
    Ok(())
}

fn study(args: &Args, scenario: ScenarioConfig, parameter: StudyParameter) -> Result<(), RunnerError> {
    let results = ParameterStudy::new(scenario, parameter, args.values.clone())
        .with_episodes(args.episodes, args.max_steps)
        .with_seed(args.seed)
        .run()?;

    if args.json {
        print_json(&serde_json::json!({ "parameter": parameter, "results": results }))?;
    } else {
        for result in &results {
            info!(
                "{} = {:.2}: mean steps over the last episodes {:.1}",
                parameter, result.value, result.final_mean
            );
        }
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), RunnerError> {
    let scenario = load_scenario(&args.scenario)?;
    if !args.json {
        info!("Lighthouse simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("Scenario: {} ({} agents)", scenario.name, scenario.agents.len());
    }

    match args.study {
        Some(parameter) => study(args, scenario, parameter),
        None => train(args, &scenario),
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    // Logs go to stderr so --json output stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if args.list {
        for scenario in ScenarioId::all() {
            println!("{:<8} {}", scenario.name(), scenario.description());
        }
        return;
    }

    if let Err(e) = run(&args) {
        error!("✗ {}", e);
        // Exit with proper code for CI
        std::process::exit(1);
    }
}
