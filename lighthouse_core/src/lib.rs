//! Lighthouse Core - Lockstep Multi-Agent Stepping and Tabular Learning
//!
//! This library provides the two pieces that carry all the concurrency and
//! learning logic of a Lighthouse simulation:
//! 1. **Stepping engine**: one thread per agent, released and awaited each tick
//!    by a [`Coordinator`] through begin/finished signals
//! 2. **Policies**: random, greedy and epsilon-greedy Q-learning with a
//!    deferred value update and pluggable table persistence

pub mod agent_runtime;
pub mod engine;
pub mod error;
pub mod policy;
pub mod q_learning;
pub mod store;
pub mod value_table;

// Re-export key types for convenience
pub use agent_runtime::{AgentRecord, AgentSpec, AgentWorker, WorkerReport};
pub use engine::Coordinator;
pub use error::{EngineError, StoreError};
pub use policy::{AgentPolicy, GreedyPolicy, Policy, RandomPolicy};
pub use q_learning::{state_key_of, Pending, QLearningParams, QLearningPolicy};
pub use store::{FileStore, MemoryStore, SledStore, ValueStore};
pub use value_table::ValueTable;
