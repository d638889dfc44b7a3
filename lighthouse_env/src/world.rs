//! The shared grid world: state, reward shaping and action resolution.
//!
//! [`SharedWorld`] is the only structure mutated by more than one thread. It
//! keeps the whole [`WorldState`] behind a single coarse-grained mutex, so at
//! most one action is being resolved at any instant and the completion flag
//! is always written together with the position that caused it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::action::{Action, ActionKind, ActionParam};
use crate::environment::Environment;
use crate::error::EnvError;
use crate::observation::{channels, ObsValue, Observation};
use crate::types::{AgentId, Cell, Direction, ObstacleMask};

/// Reward shaping parameters.
///
/// Both the terminal bonus and the shaping factor differ between scenarios
/// (a lighthouse run uses a bonus of 100, a maze run 500), so they are never
/// hard-coded into resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward for trying to step outside the world (position unchanged)
    pub boundary_penalty: f64,

    /// Reward for trying to step onto an obstacle (position unchanged)
    pub obstacle_penalty: f64,

    /// Multiplier applied to the reduction in distance to the goal
    pub shaping_factor: f64,

    /// Bonus added when the agent ends a move within `goal_radius`
    pub goal_bonus: f64,

    /// Distance below which the goal counts as reached
    pub goal_radius: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            boundary_penalty: -100.0,
            obstacle_penalty: -50.0,
            shaping_factor: 10.0,
            goal_bonus: 100.0,
            goal_radius: 1.0,
        }
    }
}

/// Static geometry of a world: bounds, goal cell and obstacles.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    width: i32,
    height: i32,
    goal: Cell,
    obstacles: BTreeSet<Cell>,
}

impl GridLayout {
    /// Creates an obstacle-free layout.
    pub fn new(width: i32, height: i32, goal: Cell) -> Self {
        Self {
            width,
            height,
            goal,
            obstacles: BTreeSet::new(),
        }
    }

    /// Adds obstacles to the layout.
    pub fn with_obstacles(mut self, obstacles: impl IntoIterator<Item = Cell>) -> Self {
        self.obstacles.extend(obstacles);
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn obstacles(&self) -> &BTreeSet<Cell> {
        &self.obstacles
    }

    /// Whether `cell` lies inside `[0, width) x [0, height)`.
    pub fn in_bounds(&self, cell: &Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    /// Whether an agent is refused entry to `cell` because of an obstacle.
    ///
    /// The goal cell is always enterable, even when it is also listed as an
    /// obstacle.
    pub fn is_blocked(&self, cell: &Cell) -> bool {
        *cell != self.goal && self.obstacles.contains(cell)
    }

    /// Blocked-neighbour mask around `cell`; leaving the world counts as blocked.
    pub fn obstacle_mask_around(&self, cell: &Cell) -> ObstacleMask {
        let mut mask = ObstacleMask::EMPTY;
        for direction in Direction::ALL {
            let neighbour = cell.step(direction);
            if !self.in_bounds(&neighbour) || self.is_blocked(&neighbour) {
                mask.set(direction);
            }
        }
        mask
    }
}

/// Running reward bookkeeping for one agent, kept by the world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RewardTally {
    /// Sum of every reward handed out to the agent
    pub total: f64,

    /// Number of resolved actions
    pub actions: u64,
}

/// Mutable world state: positions, completion flag, tick counter and the
/// per-agent reward ledger.
///
/// Cloning is cheap: the static layout is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct WorldState {
    layout: Arc<GridLayout>,
    positions: BTreeMap<AgentId, Cell>,
    spawns: BTreeMap<AgentId, Cell>,
    completed: bool,
    tick: u64,
    ledger: BTreeMap<AgentId, RewardTally>,
}

impl WorldState {
    /// Creates an empty world over the given layout.
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout: Arc::new(layout),
            positions: BTreeMap::new(),
            spawns: BTreeMap::new(),
            completed: false,
            tick: 0,
            ledger: BTreeMap::new(),
        }
    }

    /// Places an agent; the cell also becomes its spawn point for resets.
    pub fn place(&mut self, agent: AgentId, cell: Cell) {
        self.positions.insert(agent, cell);
        self.spawns.insert(agent, cell);
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn goal(&self) -> Cell {
        self.layout.goal
    }

    pub fn position(&self, agent: AgentId) -> Option<Cell> {
        self.positions.get(&agent).copied()
    }

    pub fn positions(&self) -> &BTreeMap<AgentId, Cell> {
        &self.positions
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Number of time-dependent updates since creation or the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tally(&self, agent: AgentId) -> RewardTally {
        self.ledger.get(&agent).copied().unwrap_or_default()
    }

    fn credit(&mut self, agent: AgentId, reward: f64) {
        let tally = self.ledger.entry(agent).or_default();
        tally.total += reward;
        tally.actions += 1;
    }

    fn reset(&mut self) {
        self.positions = self.spawns.clone();
        self.completed = false;
        self.tick = 0;
        self.ledger.clear();
    }
}

/// Translates a move's direction parameter into a single grid step.
fn step_offset(param: Option<&ActionParam>) -> Result<(i32, i32), EnvError> {
    match param {
        Some(ActionParam::Name(name)) => Ok(name.parse::<Direction>()?.offset()),
        Some(ActionParam::Vector(dx, dy)) => {
            if !dx.is_finite() || !dy.is_finite() {
                return Err(EnvError::InvalidVector { dx: *dx, dy: *dy });
            }
            // Clamped, so an oversized vector still moves a single cell
            let sx = dx.round().clamp(-1.0, 1.0) as i32;
            let sy = dy.round().clamp(-1.0, 1.0) as i32;
            Ok((sx, sy))
        }
        None => Err(EnvError::MissingDirection),
    }
}

/// A grid world shared by every agent thread.
pub struct SharedWorld {
    state: Mutex<WorldState>,
    rewards: RewardConfig,
}

impl SharedWorld {
    /// Creates a world with no agents.
    pub fn new(layout: GridLayout, rewards: RewardConfig) -> Self {
        Self {
            state: Mutex::new(WorldState::new(layout)),
            rewards,
        }
    }

    /// Creates an Arc-wrapped world for sharing across agent threads.
    pub fn shared(layout: GridLayout, rewards: RewardConfig) -> Arc<Self> {
        Arc::new(Self::new(layout, rewards))
    }

    /// Places an agent at its starting cell.
    pub fn add_agent(&self, agent: AgentId, start: Cell) {
        let mut state = self.lock();
        if !state.layout.in_bounds(&start) {
            warn!(agent = %agent, start = %start, "Agent placed outside the world");
        }
        state.place(agent, start);
    }

    /// Puts every agent back on its spawn cell and clears completion, the
    /// tick counter and the reward ledger.
    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn rewards(&self) -> &RewardConfig {
        &self.rewards
    }

    /// The world's static geometry.
    pub fn layout(&self) -> Arc<GridLayout> {
        Arc::clone(&self.lock().layout)
    }

    /// Acquires the world lock. A panic in another holder never leaves the
    /// state half-written (every mutation is a single insert or flag store),
    /// so a poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, state: &mut WorldState, action: &Action, agent: AgentId) -> Result<f64, EnvError> {
        match action.kind() {
            ActionKind::Move => {}
            ActionKind::Stop => return Ok(0.0),
            ActionKind::Other(tag) => return Err(EnvError::unknown_kind(tag)),
        }

        let (dx, dy) = step_offset(action.direction())?;
        let current = state.position(agent).ok_or(EnvError::UnknownAgent(agent))?;
        if (dx, dy) == (0, 0) {
            // A vector too short to round to a step moves nowhere
            return Ok(0.0);
        }
        let candidate = current.offset(dx, dy);
        let layout = Arc::clone(&state.layout);

        if !layout.in_bounds(&candidate) {
            debug!(agent = %agent, candidate = %candidate, "Move blocked by world boundary");
            return Ok(self.rewards.boundary_penalty);
        }
        if layout.is_blocked(&candidate) {
            debug!(agent = %agent, candidate = %candidate, "Move blocked by obstacle");
            return Ok(self.rewards.obstacle_penalty);
        }

        let goal = layout.goal();
        let before = current.distance_to(&goal);
        let after = candidate.distance_to(&goal);
        state.positions.insert(agent, candidate);

        let mut reward = (before - after) * self.rewards.shaping_factor;
        if after < self.rewards.goal_radius {
            reward += self.rewards.goal_bonus;
            state.completed = true;
            info!(agent = %agent, cell = %candidate, tick = state.tick, "Agent reached the goal");
        }

        Ok(reward)
    }
}

impl Environment for SharedWorld {
    fn snapshot(&self) -> WorldState {
        self.lock().clone()
    }

    fn observe(&self, agent: AgentId) -> Observation {
        let state = self.lock();
        let Some(position) = state.position(agent) else {
            warn!(agent = %agent, "Observation requested for unknown agent");
            return Observation::new();
        };
        let goal = state.goal();
        let (dx, dy) = position.unit_vector_to(&goal);

        Observation::new()
            .with(channels::DIRECTION, ObsValue::Vector(dx, dy))
            .with(channels::DISTANCE, ObsValue::Scalar(position.distance_to(&goal)))
            .with(channels::POSITION, ObsValue::Cell(position))
    }

    fn resolve(&self, action: &Action, agent: AgentId) -> f64 {
        let mut state = self.lock();

        let reward = match self.apply(&mut state, action, agent) {
            Ok(reward) => reward,
            Err(err) => {
                warn!(agent = %agent, action = %action, error = %err, "Action resolved as no-op");
                0.0
            }
        };

        if state.positions.contains_key(&agent) {
            state.credit(agent, reward);
        }
        reward
    }

    fn update(&self) {
        let mut state = self.lock();
        state.tick += 1;
    }

    fn is_complete(&self) -> bool {
        self.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn beacon_world() -> (SharedWorld, AgentId) {
        let layout = GridLayout::new(10, 10, Cell::new(8, 8))
            .with_obstacles([Cell::new(5, 5), Cell::new(2, 2)]);
        let world = SharedWorld::new(layout, RewardConfig::default());
        let agent = AgentId::from_seed(1);
        world.add_agent(agent, Cell::new(0, 0));
        (world, agent)
    }

    #[test]
    fn test_boundary_move_is_penalized_without_moving() {
        let (world, agent) = beacon_world();

        let reward = world.resolve(&Action::move_in(Direction::North), agent);

        assert_relative_eq!(reward, -100.0);
        assert_eq!(world.snapshot().position(agent), Some(Cell::new(0, 0)));
    }

    #[test]
    fn test_obstacle_move_is_penalized_without_moving() {
        let (world, agent) = beacon_world();
        world.add_agent(agent, Cell::new(1, 1));

        let reward = world.resolve(&Action::move_in(Direction::SouthEast), agent);

        assert_relative_eq!(reward, -50.0);
        assert_eq!(world.snapshot().position(agent), Some(Cell::new(1, 1)));
    }

    #[test]
    fn test_goal_overrides_obstacle_membership() {
        let layout = GridLayout::new(5, 5, Cell::new(2, 2)).with_obstacles([Cell::new(2, 2)]);
        let world = SharedWorld::new(layout, RewardConfig::default());
        let agent = AgentId::from_seed(3);
        world.add_agent(agent, Cell::new(1, 2));

        let reward = world.resolve(&Action::move_in(Direction::East), agent);

        assert_eq!(world.snapshot().position(agent), Some(Cell::new(2, 2)));
        assert!(world.is_complete());
        assert_relative_eq!(reward, 10.0 + 100.0);
    }

    #[test]
    fn test_shaping_reward_tracks_distance_reduction() {
        let (world, agent) = beacon_world();

        let reward = world.resolve(&Action::move_in(Direction::East), agent);

        let before = Cell::new(0, 0).distance_to(&Cell::new(8, 8));
        let after = Cell::new(1, 0).distance_to(&Cell::new(8, 8));
        assert_relative_eq!(reward, (before - after) * 10.0, epsilon = 1e-9);
        assert!(!world.is_complete());
    }

    #[test]
    fn test_custom_goal_bonus_is_used() {
        let layout = GridLayout::new(3, 1, Cell::new(2, 0));
        let rewards = RewardConfig {
            goal_bonus: 500.0,
            ..RewardConfig::default()
        };
        let world = SharedWorld::new(layout, rewards);
        let agent = AgentId::from_seed(4);
        world.add_agent(agent, Cell::new(1, 0));

        let reward = world.resolve(&Action::move_in(Direction::East), agent);

        assert_relative_eq!(reward, 510.0);
    }

    #[test]
    fn test_malformed_actions_are_zero_effect() {
        let (world, agent) = beacon_world();
        world.add_agent(agent, Cell::new(4, 4));

        let unknown_name = world.resolve(&Action::move_named("upwards"), agent);
        let unknown_kind = world.resolve(&Action::new(ActionKind::Other("think".into())), agent);
        let stop = world.resolve(&Action::stop(), agent);
        let missing = world.resolve(&Action::new(ActionKind::Move), agent);

        assert_eq!([unknown_name, unknown_kind, stop, missing], [0.0; 4]);
        assert_eq!(world.snapshot().position(agent), Some(Cell::new(4, 4)));
    }

    #[test]
    fn test_vector_direction_is_rounded_to_a_step() {
        let (world, agent) = beacon_world();

        world.resolve(&Action::move_along(0.71, 0.71), agent);
        assert_eq!(world.snapshot().position(agent), Some(Cell::new(1, 1)));

        world.resolve(&Action::move_along(3.0, 0.2), agent);
        assert_eq!(world.snapshot().position(agent), Some(Cell::new(2, 1)));
    }

    #[test]
    fn test_vector_rounding_to_zero_is_a_no_op() {
        let (world, agent) = beacon_world();
        world.add_agent(agent, Cell::new(8, 8));

        let reward = world.resolve(&Action::move_along(0.2, -0.4), agent);

        assert_eq!(reward, 0.0);
        let snapshot = world.snapshot();
        assert_eq!(snapshot.position(agent), Some(Cell::new(8, 8)));
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_unknown_agent_is_zero_effect() {
        let (world, _) = beacon_world();
        let stranger = AgentId::from_seed(99);

        assert_eq!(world.resolve(&Action::move_in(Direction::East), stranger), 0.0);
        assert!(world.snapshot().position(stranger).is_none());
        assert!(world.observe(stranger).is_empty());
    }

    #[test]
    fn test_ledger_records_every_outcome() {
        let (world, agent) = beacon_world();

        let a = world.resolve(&Action::move_in(Direction::North), agent);
        let b = world.resolve(&Action::move_in(Direction::East), agent);

        let tally = world.snapshot().tally(agent);
        assert_eq!(tally.actions, 2);
        assert_relative_eq!(tally.total, a + b);
    }

    #[test]
    fn test_reset_restores_spawn_state() {
        let (world, agent) = beacon_world();
        world.resolve(&Action::move_in(Direction::East), agent);
        world.update();

        world.reset();

        let state = world.snapshot();
        assert_eq!(state.position(agent), Some(Cell::new(0, 0)));
        assert_eq!(state.tick(), 0);
        assert_eq!(state.tally(agent), RewardTally::default());
        assert!(!state.is_complete());
    }

    #[test]
    fn test_default_observation() {
        let (world, agent) = beacon_world();

        let obs = world.observe(agent);

        let (dx, dy) = obs.vector(channels::DIRECTION).unwrap();
        assert_relative_eq!(dx, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_relative_eq!(dy, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_eq!(obs.cell(channels::POSITION), Some(Cell::new(0, 0)));
    }

    #[test]
    fn test_obstacle_mask_counts_walls_and_obstacles() {
        let layout = GridLayout::new(10, 10, Cell::new(8, 8)).with_obstacles([Cell::new(1, 1)]);

        let mask = layout.obstacle_mask_around(&Cell::new(0, 0));

        assert!(mask.contains(Direction::North));
        assert!(mask.contains(Direction::West));
        assert!(mask.contains(Direction::SouthEast));
        assert!(!mask.contains(Direction::East));
        assert!(!mask.contains(Direction::South));
    }

    #[test]
    fn test_concurrent_resolution_keeps_ledger_consistent() {
        let layout = GridLayout::new(50, 50, Cell::new(49, 49));
        let world = Arc::new(SharedWorld::new(layout, RewardConfig::default()));
        let agents: Vec<AgentId> = (0..8).map(AgentId::from_seed).collect();
        for (i, agent) in agents.iter().enumerate() {
            world.add_agent(*agent, Cell::new(0, i as i32));
        }

        let handles: Vec<_> = agents
            .iter()
            .map(|&agent| {
                let world = Arc::clone(&world);
                std::thread::spawn(move || {
                    (0..20)
                        .map(|_| world.resolve(&Action::move_in(Direction::East), agent))
                        .sum::<f64>()
                })
            })
            .collect();
        let sums: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let state = world.snapshot();
        for (i, agent) in agents.iter().enumerate() {
            assert_eq!(state.position(*agent), Some(Cell::new(20, i as i32)));
            assert_eq!(state.tally(*agent).actions, 20);
            assert_relative_eq!(state.tally(*agent).total, sums[i], epsilon = 1e-9);
        }
    }

    proptest! {
        #[test]
        fn prop_boundary_retries_never_move(retries in 1usize..20, dir in 0usize..8) {
            let (world, agent) = beacon_world();
            let direction = Direction::ALL[dir];
            // Park the agent in the corner the direction points out of
            let (dx, dy) = direction.offset();
            let corner = Cell::new(if dx > 0 { 9 } else { 0 }, if dy > 0 { 9 } else { 0 });
            world.add_agent(agent, corner);

            for _ in 0..retries {
                let reward = world.resolve(&Action::move_in(direction), agent);
                prop_assert_eq!(reward, -100.0);
            }
            prop_assert_eq!(world.snapshot().position(agent), Some(corner));
        }
    }
}
