//! RL Algorithms
//!
//! Trainer implementations.

pub mod q_learning;

pub use q_learning::{GreedyPolicy, QLearningConfig, QLearningTrainer, POLICY_FORMAT};
