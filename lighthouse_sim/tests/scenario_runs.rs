use lighthouse_core::{MemoryStore, SledStore, ValueStore, ValueTable};
use lighthouse_env::{Cell, Environment};
use lighthouse_sim::scenarios::ScenarioId;
use lighthouse_sim::{
    AgentConfig, EpisodeConfig, EpisodeRunner, PolicyConfig, ScenarioConfig, SensorKind,
    SimExport, Simulation, WorldConfig,
};
use std::sync::Arc;

fn agent(name: &str, start: (i32, i32), policy: PolicyConfig, sensors: Vec<SensorKind>) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        start,
        policy,
        sensors,
        vision_reflex: false,
        table: None,
    }
}

fn greedy_beacon() -> ScenarioConfig {
    let mut config = ScenarioId::Beacon.config();
    config.agents[0].policy = PolicyConfig::Greedy;
    config
}

#[test]
fn greedy_agent_walks_around_rock_to_beacon() {
    let mut sim = Simulation::build(&greedy_beacon(), 42).unwrap();

    let result = sim.run_episode(0, 20, &mut []).unwrap();

    assert!(result.completed);
    // One sidestep around the rock at (2, 2)
    assert_eq!(result.steps, 9);
    assert!(result.total_reward > 0.0);
    let keeper = sim.agents()[0].id;
    assert_eq!(sim.world().snapshot().position(keeper), Some(Cell::new(8, 8)));
}

#[test]
fn every_worker_acts_once_per_tick() {
    // The goal sits behind a wall of rocks, so no episode ends early
    let config = ScenarioConfig {
        name: "fenced".to_string(),
        world: WorldConfig {
            width: 8,
            height: 8,
            goal: (7, 7),
            obstacles: vec![(6, 6), (6, 7), (7, 6)],
        },
        rewards: Default::default(),
        agents: (0..6)
            .map(|i| {
                agent(
                    &format!("R{}", i),
                    (i, 0),
                    PolicyConfig::Random,
                    vec![SensorKind::Direction],
                )
            })
            .collect(),
    };
    let mut sim = Simulation::build(&config, 7).unwrap();

    let result = sim.run_episode(0, 25, &mut []).unwrap();
    let snapshot = sim.world().snapshot();
    let ids: Vec<_> = sim.agents().iter().map(|a| a.id).collect();
    let reports = sim.shutdown().unwrap();

    assert!(!result.completed);
    assert_eq!(result.steps, 25);
    assert_eq!(snapshot.tick(), 25);
    for id in ids {
        assert_eq!(snapshot.tally(id).actions, 25);
    }
    assert_eq!(reports.len(), 6);
    for report in reports {
        assert_eq!(report.record.steps, 25);
    }
}

#[test]
fn vision_reflex_overrides_random_policy() {
    let mut scout = agent("Scout", (0, 0), PolicyConfig::Random, vec![SensorKind::Vision]);
    scout.vision_reflex = true;
    let config = ScenarioConfig {
        name: "glimpse".to_string(),
        world: WorldConfig {
            width: 5,
            height: 5,
            goal: (1, 1),
            obstacles: Vec::new(),
        },
        rewards: Default::default(),
        agents: vec![scout],
    };
    let mut sim = Simulation::build(&config, 3).unwrap();

    let result = sim.run_episode(0, 10, &mut []).unwrap();

    assert!(result.completed);
    assert_eq!(result.steps, 1);
}

#[test]
fn beacon_training_persists_table_in_memory() {
    let store = Arc::new(MemoryStore::new());
    let mut sim = Simulation::build(&ScenarioId::Beacon.config(), 11)
        .unwrap()
        .with_store(store.clone());
    let runner = EpisodeRunner::new(EpisodeConfig {
        episodes: 30,
        max_steps: 200,
        save_interval: 10,
        ..EpisodeConfig::default()
    });

    let results = runner.run(&mut sim, &mut []).unwrap();
    sim.shutdown().unwrap();

    assert_eq!(results.len(), 30);
    assert!(results.iter().all(|r| r.steps <= 200));
    assert!(results.iter().any(|r| r.completed));
    // Epsilon only ever decays
    assert!(results.windows(2).all(|w| w[1].epsilon <= w[0].epsilon));

    let bytes = store.load("keeper.qtable.json").unwrap().expect("table saved");
    let table = ValueTable::from_bytes(&bytes).unwrap();
    assert!(!table.is_empty());
}

fn learned_table(sim: Simulation) -> ValueTable {
    sim.shutdown().unwrap()[0]
        .policy
        .as_q_learning()
        .unwrap()
        .table()
        .clone()
}

#[test]
fn trained_beacon_table_reloads_exactly() {
    let store: Arc<dyn ValueStore> = Arc::new(MemoryStore::new());
    let config = ScenarioId::Beacon.config();
    let runner = EpisodeRunner::new(EpisodeConfig {
        episodes: 50,
        max_steps: 200,
        save_interval: 0,
        ..EpisodeConfig::default()
    });

    let mut trained = Simulation::build(&config, 42).unwrap().with_store(Arc::clone(&store));
    runner.run(&mut trained, &mut []).unwrap();
    assert_eq!(trained.save_tables().unwrap(), 1);
    let learned = learned_table(trained);

    let mut fresh = Simulation::build(&config, 43).unwrap().with_store(store);
    assert_eq!(fresh.load_tables().unwrap(), 1);
    let restored = learned_table(fresh);

    assert!(!learned.is_empty());
    for (state, values) in learned.iter() {
        let reloaded = restored.get(state).unwrap();
        assert!(
            values.iter().zip(reloaded).all(|(a, b)| a.to_bits() == b.to_bits()),
            "row {:?} drifted: {:?} vs {:?}",
            state,
            values,
            reloaded
        );
    }
    assert_eq!(restored, learned);
}

#[test]
fn maze_training_resumes_from_sled() {
    let store: Arc<dyn ValueStore> = Arc::new(SledStore::temporary().unwrap());
    let config = ScenarioId::Maze.config();
    let runner = EpisodeRunner::new(EpisodeConfig {
        episodes: 3,
        max_steps: 60,
        save_interval: 0,
        ..EpisodeConfig::default()
    });

    let mut first = Simulation::build(&config, 5).unwrap().with_store(Arc::clone(&store));
    runner.run(&mut first, &mut []).unwrap();
    // Only the learner has a table
    assert_eq!(first.save_tables().unwrap(), 1);
    let learned = learned_table(first);

    let mut second = Simulation::build(&config, 6).unwrap().with_store(store);
    assert_eq!(second.load_tables().unwrap(), 1);
    let restored = learned_table(second);

    assert_eq!(restored, learned);
}

#[test]
fn scenario_file_drives_export() {
    let dir = std::env::temp_dir().join(format!("lighthouse-sim-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let scenario_path = dir.join("corridor.json");
    std::fs::write(
        &scenario_path,
        r#"{
            "name": "corridor",
            "world": { "width": 6, "height": 1, "goal": [5, 0] },
            "agents": [
                { "name": "Dash", "start": [0, 0], "policy": { "kind": "greedy" },
                  "sensors": ["direction", "proximity"] }
            ]
        }"#,
    )
    .unwrap();

    let config = ScenarioConfig::from_file(&scenario_path).unwrap();
    let mut sim = Simulation::build(&config, 1).unwrap();
    let mut export = SimExport::new(sim.name(), sim.seed(), sim.agents().to_vec());
    let runner = EpisodeRunner::new(EpisodeConfig {
        episodes: 2,
        max_steps: 20,
        ..EpisodeConfig::default()
    });

    let results = runner.run(&mut sim, &mut [&mut export]).unwrap();
    export.finalize(&results);
    let export_path = dir.join("run.json");
    export.write_to_file(&export_path).unwrap();

    assert!(export.completed);
    assert_eq!(export.total_ticks, 10);
    assert!(sim.world().is_complete());
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(written["frames"].as_array().unwrap().len(), 10);
    assert_eq!(written["frames"][4]["agents"][0]["x"], 5);

    std::fs::remove_dir_all(&dir).unwrap();
}
