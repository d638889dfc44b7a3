//! Agent Runtime - one thread per agent, gated by begin/finished signals.
//!
//! Each agent owns its policy, its sensors and its [`AgentRecord`]. None of
//! them is ever shared: the only thing a worker touches that other threads
//! can see is the environment, through `resolve`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  begin(Step | Maintain | Stop)   ┌───────────────────────────┐
//! │              │ ───────────────────────────────▶ │        AgentWorker        │
//! │ Coordinator  │                                  │  perceive ─▶ decide ─▶ act │
//! │              │ ◀─────────────────────────────── │      (policy, record)     │
//! └──────────────┘            finished              └─────────────┬─────────────┘
//!                                                                 │ resolve()
//!                                                                 ▼
//!                                                      ┌─────────────────────┐
//!                                                      │ Environment (mutex) │
//!                                                      └─────────────────────┘
//! ```
//!
//! The begin signal is a single command slot. The worker takes the command
//! out of the slot before acting on it, which clears the signal, so one
//! raise always produces exactly one cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, trace};

use lighthouse_env::{
    channels, merge_observations, Action, AgentId, Environment, Observation, PerceptionSource,
    StateKey,
};

use crate::error::EngineError;
use crate::policy::{AgentPolicy, Policy};
use crate::q_learning::state_key_of;

/// Per-agent bookkeeping, owned by the worker thread.
#[derive(Debug, Clone, Default)]
pub struct AgentRecord {
    /// Sum of all rewards received
    pub cumulative_reward: f64,

    /// Completed observe-decide-act cycles
    pub steps: u64,

    pub last_observation: Option<Observation>,
    pub last_state_key: Option<StateKey>,
    pub last_action: Option<Action>,
    pub last_reward: Option<f64>,

    /// Set between choosing an action and receiving its reward
    pub reward_pending: bool,
}

impl AgentRecord {
    /// Clears everything, e.g. at the start of an episode.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Closure run on a worker's own thread between ticks.
pub(crate) type Maintenance = Box<dyn FnOnce(AgentId, &mut AgentPolicy, &mut AgentRecord) + Send>;

/// What a raised begin signal asks the worker to do.
pub(crate) enum Command {
    Step,
    Maintain(Maintenance),
    Stop,
}

/// Everything needed to start an agent.
pub struct AgentSpec {
    pub id: AgentId,
    pub name: String,
    pub policy: AgentPolicy,
    pub sensors: Vec<Box<dyn PerceptionSource>>,

    /// Move straight at the goal when a vision sensor reports it in sight
    pub vision_reflex: bool,
}

impl AgentSpec {
    /// An agent with no sensors (it uses the environment's default observation).
    pub fn new(name: impl Into<String>, policy: impl Into<AgentPolicy>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            policy: policy.into(),
            sensors: Vec::new(),
            vision_reflex: false,
        }
    }

    pub fn with_id(mut self, id: AgentId) -> Self {
        self.id = id;
        self
    }

    /// Installs a sensor; later sensors win channel collisions.
    pub fn with_sensor(mut self, sensor: impl PerceptionSource + 'static) -> Self {
        self.sensors.push(Box::new(sensor));
        self
    }

    pub fn with_vision_reflex(mut self, enabled: bool) -> Self {
        self.vision_reflex = enabled;
        self
    }
}

/// A worker's final state, handed back on shutdown.
#[derive(Debug)]
pub struct WorkerReport {
    pub id: AgentId,
    pub name: String,
    pub policy: AgentPolicy,
    pub record: AgentRecord,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The begin/finished signal pair shared by a worker and the coordinator.
pub(crate) struct Signals {
    begin: Mutex<Option<Command>>,
    begin_cv: Condvar,
    finished: Mutex<bool>,
    finished_cv: Condvar,
    stop: AtomicBool,
    alive: AtomicBool,
}

impl Signals {
    fn new() -> Self {
        Self {
            begin: Mutex::new(None),
            begin_cv: Condvar::new(),
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
            stop: AtomicBool::new(false),
            alive: AtomicBool::new(true),
        }
    }

    /// Clears the finished signal, then raises begin with `command`.
    pub(crate) fn begin(&self, command: Command) {
        *lock(&self.finished) = false;
        *lock(&self.begin) = Some(command);
        self.begin_cv.notify_one();
    }

    /// Blocks until the worker finished its cycle or died.
    ///
    /// Returns `false` if the worker is gone.
    pub(crate) fn wait_finished(&self) -> bool {
        let guard = lock(&self.finished);
        let done = self
            .finished_cv
            .wait_while(guard, |finished| !*finished && self.alive.load(Ordering::Acquire))
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }

    /// Sets the stop flag and raises begin so a parked worker wakes up.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        *lock(&self.begin) = Some(Command::Stop);
        self.begin_cv.notify_one();
    }

    /// Worker side: waits for a command and takes it, clearing the signal.
    fn await_command(&self) -> Command {
        let guard = lock(&self.begin);
        let mut slot = self
            .begin_cv
            .wait_while(guard, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        let command = slot.take();
        if self.stop.load(Ordering::Acquire) {
            return Command::Stop;
        }
        command.unwrap_or(Command::Stop)
    }

    /// Worker side: raises the finished signal.
    fn finish(&self) {
        *lock(&self.finished) = true;
        self.finished_cv.notify_all();
    }
}

/// Marks the worker dead when its thread exits, including by panic, so the
/// coordinator never waits on a finished signal that cannot come.
struct AliveGuard(Arc<Signals>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.alive.store(false, Ordering::Release);
        let _finished = lock(&self.0.finished);
        self.0.finished_cv.notify_all();
    }
}

/// Handle to a running agent thread.
pub struct AgentWorker {
    id: AgentId,
    name: String,
    signals: Arc<Signals>,
    handle: Option<JoinHandle<(AgentPolicy, AgentRecord)>>,
}

impl AgentWorker {
    /// Starts the agent's thread. It parks until its first begin signal.
    pub fn spawn<E: Environment>(spec: AgentSpec, env: Arc<E>) -> Result<Self, EngineError> {
        let signals = Arc::new(Signals::new());
        let id = spec.id;
        let name = spec.name.clone();

        let state = WorkerLoop {
            id,
            env,
            policy: spec.policy,
            record: AgentRecord::default(),
            sensors: spec.sensors,
            vision_reflex: spec.vision_reflex,
            signals: Arc::clone(&signals),
        };

        let handle = std::thread::Builder::new()
            .name(format!("agent-{}", spec.name))
            .spawn(move || state.run())
            .map_err(|source| EngineError::Spawn { agent: id, source })?;

        debug!(agent = %id, name = %name, "Worker started");
        Ok(Self {
            id,
            name,
            signals,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        self.signals.alive.load(Ordering::Acquire)
    }

    pub(crate) fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Requests a stop without waiting for it.
    pub(crate) fn request_stop(&self) {
        self.signals.request_stop();
    }

    /// Waits for the thread to exit and collects its final state.
    ///
    /// Only the first call returns a report.
    pub(crate) fn join(&mut self) -> Option<Result<WorkerReport, EngineError>> {
        let handle = self.handle.take()?;
        Some(match handle.join() {
            Ok((policy, record)) => Ok(WorkerReport {
                id: self.id,
                name: self.name.clone(),
                policy,
                record,
            }),
            Err(_) => Err(EngineError::WorkerPanicked(self.id)),
        })
    }
}

/// State that lives on the worker thread.
struct WorkerLoop<E: Environment> {
    id: AgentId,
    env: Arc<E>,
    policy: AgentPolicy,
    record: AgentRecord,
    sensors: Vec<Box<dyn PerceptionSource>>,
    vision_reflex: bool,
    signals: Arc<Signals>,
}

impl<E: Environment> WorkerLoop<E> {
    fn run(mut self) -> (AgentPolicy, AgentRecord) {
        let _alive = AliveGuard(Arc::clone(&self.signals));

        loop {
            match self.signals.await_command() {
                Command::Stop => break,
                Command::Step => self.cycle(),
                Command::Maintain(task) => task(self.id, &mut self.policy, &mut self.record),
            }
            self.signals.finish();
        }

        debug!(agent = %self.id, steps = self.record.steps, "Worker stopped");
        (self.policy, self.record)
    }

    /// One observe-decide-act cycle.
    fn cycle(&mut self) {
        let observation = self.perceive();
        let action = self.decide(&observation);

        self.record.last_state_key = state_key_of(&observation);
        self.record.last_action = Some(action.clone());
        self.record.reward_pending = true;

        let reward = self.env.resolve(&action, self.id);
        self.policy.update(reward);

        self.record.cumulative_reward += reward;
        self.record.steps += 1;
        self.record.last_reward = Some(reward);
        self.record.reward_pending = false;
        self.record.last_observation = Some(observation);

        trace!(agent = %self.id, action = %action, reward, "Cycle complete");
    }

    fn perceive(&self) -> Observation {
        if self.sensors.is_empty() {
            return self.env.observe(self.id);
        }
        let snapshot = self.env.snapshot();
        merge_observations(&self.sensors, &snapshot, self.id)
    }

    fn decide(&mut self, observation: &Observation) -> Action {
        if self.vision_reflex && observation.flag(channels::TARGET_SEEN) == Some(true) {
            if let Some((dx, dy)) = observation.vector(channels::VISUAL_DIRECTION) {
                trace!(agent = %self.id, "Goal in sight, overriding policy");
                return Action::move_along(dx, dy);
            }
        }
        self.policy.select_action(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::GreedyPolicy;
    use lighthouse_env::{Cell, Direction, GridLayout, RewardConfig, SharedWorld, VisionSensor};

    fn world() -> Arc<SharedWorld> {
        SharedWorld::shared(GridLayout::new(5, 5, Cell::new(4, 4)), RewardConfig::default())
    }

    #[test]
    fn test_one_begin_runs_one_cycle() {
        let env = world();
        let spec = AgentSpec::new("solo", GreedyPolicy::default()).with_id(AgentId::from_seed(1));
        env.add_agent(spec.id, Cell::new(0, 0));
        let mut worker = AgentWorker::spawn(spec, Arc::clone(&env)).unwrap();

        worker.signals().begin(Command::Step);
        assert!(worker.signals().wait_finished());
        worker.request_stop();
        let report = worker.join().unwrap().unwrap();

        assert_eq!(report.record.steps, 1);
        assert_eq!(report.record.last_action, Some(Action::move_in(Direction::SouthEast)));
        assert_eq!(env.snapshot().position(report.id), Some(Cell::new(1, 1)));
        assert!(!report.record.reward_pending);
    }

    #[test]
    fn test_stop_unblocks_parked_worker() {
        let env = world();
        let mut worker = AgentWorker::spawn(AgentSpec::new("idle", GreedyPolicy::default()), env).unwrap();

        worker.request_stop();
        let report = worker.join().unwrap().unwrap();

        assert_eq!(report.record.steps, 0);
        assert!(!worker.is_alive());
        assert!(worker.join().is_none());
    }

    #[test]
    fn test_dead_worker_does_not_block_wait() {
        let env = world();
        let mut worker = AgentWorker::spawn(AgentSpec::new("doomed", GreedyPolicy::default()), env).unwrap();

        worker
            .signals()
            .begin(Command::Maintain(Box::new(|_, _, _| panic!("maintenance failure"))));

        assert!(!worker.signals().wait_finished());
        assert!(matches!(worker.join(), Some(Err(EngineError::WorkerPanicked(_)))));
    }

    #[test]
    fn test_vision_reflex_overrides_policy() {
        let env = world();
        // Greedy with no direction channel would stop; the reflex moves instead
        let spec = AgentSpec::new("seer", GreedyPolicy::default())
            .with_id(AgentId::from_seed(2))
            .with_sensor(VisionSensor::default())
            .with_vision_reflex(true);
        env.add_agent(spec.id, Cell::new(3, 3));
        let mut worker = AgentWorker::spawn(spec, Arc::clone(&env)).unwrap();

        worker.signals().begin(Command::Step);
        worker.signals().wait_finished();
        worker.request_stop();
        let report = worker.join().unwrap().unwrap();

        assert_eq!(env.snapshot().position(report.id), Some(Cell::new(4, 4)));
        assert!(env.is_complete());
        assert!(report.record.cumulative_reward > 100.0);
    }
}
