//! Tabular Q-learning with a deferred update.
//!
//! The value of the action chosen at tick N can only be updated once the
//! state reached at tick N+1 is known. The policy therefore keeps the last
//! decision as an explicit [`Pending`] record and applies its update at the
//! start of the next [`select_action`](crate::Policy::select_action) call.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use lighthouse_env::{channels, Action, Direction, Observation, StateKey};

use crate::error::StoreError;
use crate::policy::Policy;
use crate::store::ValueStore;
use crate::value_table::ValueTable;

/// Learning hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningParams {
    /// Learning rate (alpha)
    pub alpha: f64,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// Exploration rate (epsilon)
    pub epsilon: f64,
}

impl Default for QLearningParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.3,
        }
    }
}

/// Derives the learning key for an observation.
///
/// A published composite key wins; otherwise the raw position is used.
pub fn state_key_of(observation: &Observation) -> Option<StateKey> {
    observation
        .state_key(channels::STATE_KEY)
        .or_else(|| observation.cell(channels::POSITION).map(StateKey::Position))
}

/// A decision whose value update is waiting for the next state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pending {
    pub state: StateKey,
    pub action: usize,
}

/// Epsilon-greedy tabular Q-learning policy.
#[derive(Debug, Clone)]
pub struct QLearningPolicy {
    params: QLearningParams,
    table: ValueTable,
    pending: Option<Pending>,
    /// Reward collected since the pending decision was made
    reward: f64,
    rng: ChaCha8Rng,
}

impl QLearningPolicy {
    /// Creates a policy over all eight directions with an empty table.
    pub fn new(params: QLearningParams, seed: u64) -> Self {
        Self::with_actions(params, Direction::ALL.to_vec(), seed)
    }

    /// Creates a policy over a custom action order.
    pub fn with_actions(params: QLearningParams, actions: Vec<Direction>, seed: u64) -> Self {
        Self {
            params,
            table: ValueTable::new(actions),
            pending: None,
            reward: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn params(&self) -> &QLearningParams {
        &self.params
    }

    pub fn set_params(&mut self, params: QLearningParams) {
        self.params = params;
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    pub fn epsilon(&self) -> f64 {
        self.params.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.params.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// Multiplies epsilon by `factor`, never going below `floor`.
    pub fn decay_epsilon(&mut self, factor: f64, floor: f64) -> f64 {
        self.params.epsilon = (self.params.epsilon * factor).max(floor);
        self.params.epsilon
    }

    /// Closes an episode.
    ///
    /// When the goal was reached the pending decision led to a terminal
    /// state and its target is the collected reward alone. A truncated
    /// episode has no next state, so the pending decision is dropped.
    pub fn end_episode(&mut self, reached_goal: bool) {
        let pending = self.pending.take();
        let reward = std::mem::take(&mut self.reward);
        if let (true, Some(Pending { state, action })) = (reached_goal, pending) {
            let q = &mut self.table.row_mut(state)[action];
            *q += self.params.alpha * (reward - *q);
            trace!(state = %state, action, value = *q, "Terminal update");
        }
    }

    /// Applies the deferred update for the pending decision using `next` as
    /// the state it led to.
    fn apply_pending(&mut self, next: StateKey) {
        let Some(Pending { state, action }) = self.pending.take() else {
            return;
        };
        let reward = std::mem::take(&mut self.reward);
        let next_max = self.table.max_value(next);
        let target = reward + self.params.gamma * next_max;

        let q = &mut self.table.row_mut(state)[action];
        *q += self.params.alpha * (target - *q);
        trace!(state = %state, action, next = %next, value = *q, "Deferred update");
    }

    /// Serializes the value table into `store` under `id`.
    pub fn save(&self, store: &dyn ValueStore, id: &str) -> Result<(), StoreError> {
        let bytes = self.table.to_bytes()?;
        store.save(id, &bytes)?;
        debug!(id, states = self.table.len(), "Value table saved");
        Ok(())
    }

    /// Restores the value table from `store`; a missing entry keeps an empty
    /// table. Returns whether a table was found.
    pub fn load(&mut self, store: &dyn ValueStore, id: &str) -> Result<bool, StoreError> {
        let Some(bytes) = store.load(id)? else {
            debug!(id, "No stored value table, starting empty");
            self.table = ValueTable::new(self.table.actions().to_vec());
            return Ok(false);
        };

        let table = ValueTable::from_bytes(&bytes)?;
        if table.actions() != self.table.actions() {
            return Err(StoreError::Incompatible(format!(
                "stored actions {:?} differ from configured {:?}",
                table.actions(),
                self.table.actions()
            )));
        }
        self.table = table;
        self.pending = None;
        debug!(id, states = self.table.len(), "Value table loaded");
        Ok(true)
    }
}

impl Policy for QLearningPolicy {
    fn select_action(&mut self, observation: &Observation) -> Action {
        let Some(state) = state_key_of(observation) else {
            warn!("Observation carries neither a state key nor a position");
            return Action::stop();
        };

        self.apply_pending(state);

        let width = self.table.actions().len();
        let explore = self.rng.gen::<f64>() < self.params.epsilon;
        let chosen = if explore && width > 0 {
            // Visit the row even when exploring so the state is recorded
            self.table.row_mut(state);
            Some(self.rng.gen_range(0..width))
        } else {
            self.table.best_action(state)
        };

        let Some(action) = chosen else {
            return Action::stop();
        };
        self.pending = Some(Pending { state, action });
        Action::move_in(self.table.actions()[action])
    }

    fn update(&mut self, reward: f64) {
        self.reward += reward;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use approx::assert_relative_eq;
    use lighthouse_env::{Cell, ObsValue, ObstacleMask};
    use proptest::prelude::*;

    fn at(x: i32, y: i32) -> Observation {
        Observation::new().with(channels::POSITION, ObsValue::Cell(Cell::new(x, y)))
    }

    fn greedy_params() -> QLearningParams {
        QLearningParams {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.0,
        }
    }

    #[test]
    fn test_first_selection_populates_unseen_state() {
        let mut policy = QLearningPolicy::new(greedy_params(), 7);

        let action = policy.select_action(&at(0, 0));

        assert!(action.is_move());
        let row = policy.table().get(&StateKey::Position(Cell::new(0, 0))).unwrap();
        assert_eq!(row, &[0.0; 8][..]);
        // Ties resolve to the first action in order
        assert_eq!(action, Action::move_in(Direction::North));
        assert_eq!(policy.table().len(), 1);
    }

    #[test]
    fn test_update_is_deferred_until_next_selection() {
        let mut policy = QLearningPolicy::new(greedy_params(), 7);
        let s0 = StateKey::Position(Cell::new(0, 0));

        policy.select_action(&at(0, 0));
        policy.update(10.0);
        assert_eq!(policy.table().get(&s0).unwrap()[0], 0.0);

        policy.select_action(&at(0, 1));

        assert_relative_eq!(policy.table().get(&s0).unwrap()[0], 1.0);
    }

    #[test]
    fn test_composite_key_preferred_over_position() {
        let key = StateKey::Composite {
            heading: Some(Direction::East),
            obstacles: ObstacleMask(0b11),
        };
        let obs = at(4, 4).with(channels::STATE_KEY, ObsValue::Key(key));

        assert_eq!(state_key_of(&obs), Some(key));
        assert_eq!(state_key_of(&at(4, 4)), Some(StateKey::Position(Cell::new(4, 4))));
        assert_eq!(state_key_of(&Observation::new()), None);
    }

    #[test]
    fn test_missing_state_keeps_pending() {
        let mut policy = QLearningPolicy::new(greedy_params(), 1);
        policy.select_action(&at(2, 2));

        let action = policy.select_action(&Observation::new());

        assert_eq!(action, Action::stop());
        assert!(policy.pending().is_some());
    }

    #[test]
    fn test_terminal_update_ignores_bootstrap() {
        let mut policy = QLearningPolicy::new(greedy_params(), 3);
        policy.select_action(&at(7, 7));
        policy.update(100.0);

        policy.end_episode(true);

        let row = policy.table().get(&StateKey::Position(Cell::new(7, 7))).unwrap();
        assert_relative_eq!(row[0], 10.0);
        assert!(policy.pending().is_none());
    }

    #[test]
    fn test_truncated_episode_drops_pending() {
        let mut policy = QLearningPolicy::new(greedy_params(), 3);
        policy.select_action(&at(7, 7));
        policy.update(-50.0);

        policy.end_episode(false);
        policy.select_action(&at(0, 0));

        let row = policy.table().get(&StateKey::Position(Cell::new(7, 7))).unwrap();
        assert_eq!(row[0], 0.0);
    }

    #[test]
    fn test_exploitation_follows_learned_values() {
        let mut policy = QLearningPolicy::with_actions(
            greedy_params(),
            vec![Direction::West, Direction::East],
            0,
        );
        // West from (0,0) is punished once
        policy.select_action(&at(0, 0));
        policy.update(-5.0);
        policy.select_action(&at(0, 0));

        let action = policy.select_action(&at(0, 0));

        assert_eq!(action, Action::move_in(Direction::East));
    }

    #[test]
    fn test_epsilon_decay_respects_floor() {
        let mut policy = QLearningPolicy::new(QLearningParams::default(), 0);

        policy.decay_epsilon(0.5, 0.2);
        assert_relative_eq!(policy.epsilon(), 0.2);
        policy.decay_epsilon(0.5, 0.2);
        assert_relative_eq!(policy.epsilon(), 0.2);
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = MemoryStore::new();
        let mut trained = QLearningPolicy::new(greedy_params(), 11);
        for step in 0..5 {
            trained.select_action(&at(step, 0));
            trained.update(f64::from(step) - 2.0);
        }
        trained.save(&store, "agent.json").unwrap();

        let mut restored = QLearningPolicy::new(greedy_params(), 11);
        assert!(restored.load(&store, "agent.json").unwrap());

        assert_eq!(restored.table(), trained.table());
    }

    #[test]
    fn test_load_missing_starts_empty() {
        let store = MemoryStore::new();
        let mut policy = QLearningPolicy::new(greedy_params(), 0);
        policy.select_action(&at(1, 1));

        assert!(!policy.load(&store, "absent").unwrap());
        assert!(policy.table().is_empty());
    }

    #[test]
    fn test_load_rejects_other_action_set() {
        let store = MemoryStore::new();
        let mut four = QLearningPolicy::with_actions(
            greedy_params(),
            Direction::ALL[..4].to_vec(),
            0,
        );
        four.select_action(&at(0, 0));
        four.save(&store, "q").unwrap();

        let mut eight = QLearningPolicy::new(greedy_params(), 0);

        assert!(matches!(eight.load(&store, "q"), Err(StoreError::Incompatible(_))));
    }

    proptest! {
        #[test]
        fn prop_update_moves_toward_target_only(
            start in -50.0f64..50.0,
            reward in -100.0f64..100.0,
            next_values in proptest::collection::vec(-50.0f64..50.0, 2),
            action in 0usize..2,
        ) {
            let actions = vec![Direction::North, Direction::South];
            let mut policy = QLearningPolicy::with_actions(greedy_params(), actions, 0);
            let s = StateKey::Position(Cell::new(0, 0));
            let s_next = StateKey::Position(Cell::new(0, 1));
            policy.table.row_mut(s).copy_from_slice(&[start, start]);
            policy.table.row_mut(s_next).copy_from_slice(&next_values);
            let before = policy.table.clone();

            policy.pending = Some(Pending { state: s, action });
            policy.update(reward);
            policy.apply_pending(s_next);

            let next_max = next_values.iter().copied().fold(f64::MIN, f64::max);
            let target = reward + 0.9 * next_max;
            let updated = policy.table.get(&s).unwrap()[action];
            prop_assert!((updated - (start + 0.1 * (target - start))).abs() < 1e-9);
            prop_assert!((target - updated).abs() <= (target - start).abs());

            // Every other entry is untouched
            for (state, row) in before.iter() {
                for (i, value) in row.iter().enumerate() {
                    if *state != s || i != action {
                        prop_assert_eq!(policy.table.get(state).unwrap()[i], *value);
                    }
                }
            }
        }
    }
}
