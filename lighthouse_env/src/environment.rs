//! Core environment trait for Lighthouse agents.

use crate::action::Action;
use crate::observation::Observation;
use crate::types::AgentId;
use crate::world::WorldState;

/// The central interface for environment interaction.
///
/// This trait abstracts the shared world so that the stepping engine can
/// drive any grid world (or a test double) with the same worker code.
///
/// # Implementations
///
/// - **Grid world**: [`SharedWorld`](crate::SharedWorld) - one mutex around
///   [`WorldState`], reward shaping towards a goal cell
///
/// # Concurrency
///
/// Every method may be called from several agent threads at once. An
/// implementation must serialize [`resolve`](Environment::resolve) calls
/// against each other and against [`update`](Environment::update).
pub trait Environment: Send + Sync + 'static {
    /// Returns a consistent copy of the world state.
    ///
    /// Perception sources read from this copy, so perceiving never holds the
    /// world lock while sensors run.
    fn snapshot(&self) -> WorldState;

    /// Produces the default observation for an agent with no sensors.
    fn observe(&self, agent: AgentId) -> Observation;

    /// Applies one action for `agent` and returns the scalar reward.
    ///
    /// Holds the world lock for the whole call. Failures that are domain
    /// outcomes (walls, obstacles) come back as rewards; malformed actions
    /// resolve to `0.0` without touching the world.
    fn resolve(&self, action: &Action, agent: AgentId) -> f64;

    /// Advances the time-dependent part of the world by one tick.
    ///
    /// Called by the coordinator exactly once per tick, after every agent
    /// has finished resolving its action.
    fn update(&self);

    /// Whether some agent has reached the goal.
    fn is_complete(&self) -> bool;
}
