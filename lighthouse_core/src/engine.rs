//! The lockstep stepping engine.
//!
//! A [`Coordinator`] owns one [`AgentWorker`] per agent and drives them tick
//! by tick: release every worker, wait for every worker, then advance the
//! environment once. No worker can start tick N+1 before the update of tick
//! N has run, because nothing raises its begin signal until then.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lighthouse_env::{AgentId, Environment};

use crate::agent_runtime::{AgentRecord, AgentSpec, AgentWorker, Command, WorkerReport};
use crate::error::EngineError;
use crate::policy::AgentPolicy;

/// Drives a fixed set of agents over a shared environment.
pub struct Coordinator<E: Environment> {
    env: Arc<E>,
    workers: Vec<AgentWorker>,
    tick: u64,
    stopped: bool,
}

impl<E: Environment> Coordinator<E> {
    /// Spawns one worker per spec. Agents must already be placed in `env`.
    pub fn new(env: Arc<E>, specs: Vec<AgentSpec>) -> Result<Self, EngineError> {
        let mut coordinator = Self {
            env,
            workers: Vec::with_capacity(specs.len()),
            tick: 0,
            stopped: false,
        };
        for spec in specs {
            // On failure the partially built coordinator is dropped, which
            // stops the workers spawned so far
            let worker = AgentWorker::spawn(spec, Arc::clone(&coordinator.env))?;
            coordinator.workers.push(worker);
        }
        info!(agents = coordinator.workers.len(), "Coordinator ready");
        Ok(coordinator)
    }

    pub fn environment(&self) -> &Arc<E> {
        &self.env
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Agent ids in spawn order.
    pub fn agents(&self) -> Vec<AgentId> {
        self.workers.iter().map(AgentWorker::id).collect()
    }

    /// Agent ids and names in spawn order.
    pub fn roster(&self) -> Vec<(AgentId, String)> {
        self.workers
            .iter()
            .map(|w| (w.id(), w.name().to_string()))
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Runs one tick: every agent observes, decides and acts exactly once,
    /// then the environment's time-dependent update runs.
    ///
    /// Returns the number of completed ticks.
    pub fn step(&mut self) -> Result<u64, EngineError> {
        self.dispatch(|| Command::Step)?;
        self.env.update();
        self.tick += 1;
        debug!(tick = self.tick, "Tick complete");
        Ok(self.tick)
    }

    /// Steps until the environment reports completion or `max_ticks` ticks
    /// have run. Returns the number of ticks run by this call.
    pub fn run_until_complete(&mut self, max_ticks: u64) -> Result<u64, EngineError> {
        let mut ran = 0;
        while ran < max_ticks && !self.env.is_complete() {
            self.step()?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Runs `task` on every worker's own thread, between ticks, with
    /// exclusive access to that worker's policy and record.
    ///
    /// Results come back in spawn order. The environment is not updated and
    /// the tick counter does not move.
    pub fn maintain<T, F>(&mut self, task: F) -> Result<Vec<(AgentId, T)>, EngineError>
    where
        T: Send + 'static,
        F: Fn(AgentId, &mut AgentPolicy, &mut AgentRecord) -> T + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let (tx, rx) = mpsc::channel();

        self.dispatch(|| {
            let task = Arc::clone(&task);
            let tx = tx.clone();
            Command::Maintain(Box::new(move |id, policy, record| {
                // Receiver lives until dispatch returns
                let _ = tx.send((id, task(id, policy, record)));
            }))
        })?;

        let order: HashMap<AgentId, usize> = self
            .workers
            .iter()
            .enumerate()
            .map(|(index, worker)| (worker.id(), index))
            .collect();
        let mut results: Vec<(AgentId, T)> = rx.try_iter().collect();
        results.sort_by_key(|(id, _)| order.get(id).copied().unwrap_or(usize::MAX));
        Ok(results)
    }

    /// Raises every begin signal, then waits on every finished signal.
    fn dispatch(&self, mut command: impl FnMut() -> Command) -> Result<(), EngineError> {
        if self.stopped {
            return Err(EngineError::Stopped);
        }

        for worker in &self.workers {
            worker.signals().begin(command());
        }

        let mut dead = None;
        for worker in &self.workers {
            if !worker.signals().wait_finished() && dead.is_none() {
                dead = Some(worker.id());
            }
        }

        match dead {
            Some(agent) => {
                warn!(agent = %agent, "Worker died during tick");
                Err(EngineError::WorkerPanicked(agent))
            }
            None => Ok(()),
        }
    }

    /// Stops and joins every worker, returning their final policies and
    /// records in spawn order.
    ///
    /// Idempotent: later calls return an empty list. If any worker panicked
    /// the first such failure is returned after all threads are joined.
    pub fn shutdown(&mut self) -> Result<Vec<WorkerReport>, EngineError> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.stopped = true;

        for worker in &self.workers {
            worker.request_stop();
        }

        let mut reports = Vec::with_capacity(self.workers.len());
        let mut failure = None;
        for worker in &mut self.workers {
            match worker.join() {
                Some(Ok(report)) => reports.push(report),
                Some(Err(err)) => {
                    failure.get_or_insert(err);
                }
                None => {}
            }
        }

        info!(ticks = self.tick, agents = reports.len(), "Coordinator shut down");
        match failure {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}

impl<E: Environment> Drop for Coordinator<E> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "Worker failure during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{GreedyPolicy, RandomPolicy};
    use crate::q_learning::{QLearningParams, QLearningPolicy};
    use lighthouse_env::{
        Action, Cell, Direction, GridLayout, Observation, RewardConfig, SharedWorld, WorldState,
    };
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    fn open_world(size: i32) -> Arc<SharedWorld> {
        SharedWorld::shared(
            GridLayout::new(size, size, Cell::new(size - 1, size - 1)),
            RewardConfig::default(),
        )
    }

    fn random_agents(env: &SharedWorld, count: u64) -> Vec<AgentSpec> {
        (0..count)
            .map(|i| {
                let spec = AgentSpec::new(format!("r{i}"), RandomPolicy::new(Direction::ALL.to_vec(), i))
                    .with_id(AgentId::from_seed(i));
                env.add_agent(spec.id, Cell::new(0, i as i32));
                spec
            })
            .collect()
    }

    #[test]
    fn test_every_worker_steps_exactly_m_times() {
        let env = SharedWorld::shared(GridLayout::new(40, 40, Cell::new(100, 100)), RewardConfig::default());
        let specs = random_agents(&env, 6);
        let mut coordinator = Coordinator::new(Arc::clone(&env), specs).unwrap();

        for _ in 0..25 {
            coordinator.step().unwrap();
        }
        let reports = coordinator.shutdown().unwrap();

        assert_eq!(reports.len(), 6);
        for report in &reports {
            assert_eq!(report.record.steps, 25);
        }
        assert_eq!(env.snapshot().tick(), 25);
        assert_eq!(coordinator.tick(), 25);
    }

    #[test]
    fn test_maintain_runs_on_each_worker_in_order() {
        let env = open_world(10);
        let specs = random_agents(&env, 3);
        let mut coordinator = Coordinator::new(Arc::clone(&env), specs).unwrap();
        coordinator.step().unwrap();

        let steps = coordinator
            .maintain(|_, _, record| record.steps)
            .unwrap();

        assert_eq!(
            steps,
            vec![
                (AgentId::from_seed(0), 1),
                (AgentId::from_seed(1), 1),
                (AgentId::from_seed(2), 1)
            ]
        );
        assert_eq!(coordinator.tick(), 1);
    }

    #[test]
    fn test_maintain_can_decay_exploration() {
        let env = open_world(6);
        let spec = AgentSpec::new("learner", QLearningPolicy::new(QLearningParams::default(), 5))
            .with_id(AgentId::from_seed(9));
        env.add_agent(spec.id, Cell::new(0, 0));
        let mut coordinator = Coordinator::new(env, vec![spec]).unwrap();

        let eps = coordinator
            .maintain(|_, policy, _| policy.as_q_learning_mut().map(|q| q.decay_epsilon(0.5, 0.01)))
            .unwrap();

        assert_eq!(eps, vec![(AgentId::from_seed(9), Some(0.15))]);
    }

    #[test]
    fn test_step_after_shutdown_is_an_error() {
        let env = open_world(5);
        let specs = random_agents(&env, 2);
        let mut coordinator = Coordinator::new(env, specs).unwrap();

        assert_eq!(coordinator.shutdown().unwrap().len(), 2);
        assert!(coordinator.shutdown().unwrap().is_empty());
        assert!(matches!(coordinator.step(), Err(EngineError::Stopped)));
        assert!(matches!(
            coordinator.maintain(|_, _, _| ()),
            Err(EngineError::Stopped)
        ));
    }

    #[test]
    fn test_greedy_agent_completes_open_world() {
        let env = open_world(6);
        let spec = AgentSpec::new("g", GreedyPolicy::default()).with_id(AgentId::from_seed(4));
        env.add_agent(spec.id, Cell::new(0, 0));
        let mut coordinator = Coordinator::new(Arc::clone(&env), vec![spec]).unwrap();

        let ran = coordinator.run_until_complete(20).unwrap();

        assert_eq!(ran, 5);
        assert!(env.is_complete());
    }

    /// Records whether an update ever overlapped with a resolution.
    struct Probe {
        inner: SharedWorld,
        resolving: AtomicU64,
        overlap: AtomicBool,
        updates: Mutex<Vec<u64>>,
    }

    impl Environment for Probe {
        fn snapshot(&self) -> WorldState {
            self.inner.snapshot()
        }

        fn observe(&self, agent: AgentId) -> Observation {
            self.inner.observe(agent)
        }

        fn resolve(&self, action: &Action, agent: AgentId) -> f64 {
            self.resolving.fetch_add(1, Ordering::SeqCst);
            let reward = self.inner.resolve(action, agent);
            self.resolving.fetch_sub(1, Ordering::SeqCst);
            reward
        }

        fn update(&self) {
            if self.resolving.load(Ordering::SeqCst) != 0 {
                self.overlap.store(true, Ordering::SeqCst);
            }
            let tally: u64 = self
                .inner
                .snapshot()
                .positions()
                .keys()
                .map(|id| self.inner.snapshot().tally(*id).actions)
                .sum();
            self.updates.lock().unwrap().push(tally);
            self.inner.update();
        }

        fn is_complete(&self) -> bool {
            self.inner.is_complete()
        }
    }

    #[test]
    fn test_update_never_overlaps_resolution() {
        let inner = SharedWorld::new(GridLayout::new(30, 30, Cell::new(100, 100)), RewardConfig::default());
        let specs = random_agents(&inner, 4);
        let probe = Arc::new(Probe {
            inner,
            resolving: AtomicU64::new(0),
            overlap: AtomicBool::new(false),
            updates: Mutex::new(Vec::new()),
        });
        let mut coordinator = Coordinator::new(Arc::clone(&probe), specs).unwrap();

        for _ in 0..10 {
            coordinator.step().unwrap();
        }
        coordinator.shutdown().unwrap();

        assert!(!probe.overlap.load(Ordering::SeqCst));
        // Each update sees exactly four more resolutions than the previous one
        let updates = probe.updates.lock().unwrap().clone();
        assert_eq!(updates, (1..=10).map(|t| t * 4).collect::<Vec<u64>>());
    }
}
