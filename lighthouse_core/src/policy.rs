//! Decision policies.
//!
//! A policy is owned by exactly one agent worker and is only ever touched
//! from that worker's thread, so policies need `Send` but never `Sync`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lighthouse_env::{channels, Action, Direction, Observation, COMPASS_THRESHOLD};

use crate::q_learning::QLearningPolicy;

/// Decision/update capability shared by every policy variant.
pub trait Policy: Send {
    /// Chooses the action for this tick.
    fn select_action(&mut self, observation: &Observation) -> Action;

    /// Receives the reward for the action chosen last.
    fn update(&mut self, reward: f64);
}

/// Picks uniformly from a fixed action set, ignoring observations.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    actions: Vec<Direction>,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(actions: Vec<Direction>, seed: u64) -> Self {
        Self {
            actions,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn actions(&self) -> &[Direction] {
        &self.actions
    }
}

impl Policy for RandomPolicy {
    fn select_action(&mut self, _observation: &Observation) -> Action {
        if self.actions.is_empty() {
            return Action::stop();
        }
        let index = self.rng.gen_range(0..self.actions.len());
        Action::move_in(self.actions[index])
    }

    fn update(&mut self, _reward: f64) {}
}

/// Heads straight for the goal along the observed direction vector.
///
/// When an `obstacle_mask` channel is present and the preferred direction is
/// blocked, the unblocked direction best aligned with the goal is taken
/// instead (ties go to the earlier direction in canonical order).
#[derive(Debug, Clone, Copy)]
pub struct GreedyPolicy {
    threshold: f64,
}

impl GreedyPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn detour(dx: f64, dy: f64, blocked: impl Fn(Direction) -> bool) -> Option<Direction> {
        let mut best: Option<(Direction, f64)> = None;
        for direction in Direction::ALL {
            if blocked(direction) {
                continue;
            }
            let (ox, oy) = direction.offset();
            let (ox, oy) = (f64::from(ox), f64::from(oy));
            let alignment = (dx * ox + dy * oy) / ox.hypot(oy);
            if best.map_or(true, |(_, top)| alignment > top) {
                best = Some((direction, alignment));
            }
        }
        best.map(|(direction, _)| direction)
    }
}

impl Default for GreedyPolicy {
    fn default() -> Self {
        Self::new(COMPASS_THRESHOLD)
    }
}

impl Policy for GreedyPolicy {
    fn select_action(&mut self, observation: &Observation) -> Action {
        let Some((dx, dy)) = observation.vector(channels::DIRECTION) else {
            return Action::stop();
        };
        let Some(preferred) = Direction::from_vector(dx, dy, self.threshold) else {
            return Action::stop();
        };

        match observation.mask(channels::OBSTACLE_MASK) {
            Some(mask) if mask.contains(preferred) => {
                match Self::detour(dx, dy, |d| mask.contains(d)) {
                    Some(direction) => Action::move_in(direction),
                    None => Action::stop(),
                }
            }
            _ => Action::move_in(preferred),
        }
    }

    fn update(&mut self, _reward: f64) {}
}

/// The closed set of policies an agent can run.
#[derive(Debug, Clone)]
pub enum AgentPolicy {
    Random(RandomPolicy),
    Greedy(GreedyPolicy),
    QLearning(QLearningPolicy),
}

impl AgentPolicy {
    /// Lowercase variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentPolicy::Random(_) => "random",
            AgentPolicy::Greedy(_) => "greedy",
            AgentPolicy::QLearning(_) => "qlearning",
        }
    }

    pub fn as_q_learning(&self) -> Option<&QLearningPolicy> {
        match self {
            AgentPolicy::QLearning(policy) => Some(policy),
            _ => None,
        }
    }

    pub fn as_q_learning_mut(&mut self) -> Option<&mut QLearningPolicy> {
        match self {
            AgentPolicy::QLearning(policy) => Some(policy),
            _ => None,
        }
    }
}

impl Policy for AgentPolicy {
    fn select_action(&mut self, observation: &Observation) -> Action {
        match self {
            AgentPolicy::Random(policy) => policy.select_action(observation),
            AgentPolicy::Greedy(policy) => policy.select_action(observation),
            AgentPolicy::QLearning(policy) => policy.select_action(observation),
        }
    }

    fn update(&mut self, reward: f64) {
        match self {
            AgentPolicy::Random(policy) => policy.update(reward),
            AgentPolicy::Greedy(policy) => policy.update(reward),
            AgentPolicy::QLearning(policy) => policy.update(reward),
        }
    }
}

impl From<RandomPolicy> for AgentPolicy {
    fn from(policy: RandomPolicy) -> Self {
        AgentPolicy::Random(policy)
    }
}

impl From<GreedyPolicy> for AgentPolicy {
    fn from(policy: GreedyPolicy) -> Self {
        AgentPolicy::Greedy(policy)
    }
}

impl From<QLearningPolicy> for AgentPolicy {
    fn from(policy: QLearningPolicy) -> Self {
        AgentPolicy::QLearning(policy)
    }
}
