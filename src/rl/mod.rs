//! Reinforcement Learning Module
//!
//! Per-device send-interval tuning as a small RL problem:
//! - `core`: actions, rewards and environment state
//! - `environment`: the device environment driven by measurements
//! - `memory`: bounded experience replay
//! - `training`: the pluggable trainer capability and checkpoints
//! - `algorithms`: the default tabular Q-learning trainer

pub mod algorithms;
pub mod core;
pub mod environment;
pub mod memory;
pub mod training;

pub use algorithms::{QLearningConfig, QLearningTrainer};
pub use core::{Action, EnvPhase, EnvironmentState, Observation, Reward, RewardPolicy};
pub use environment::{DeviceEnvironment, StepResult};
pub use memory::{ReplayBuffer, Transition};
pub use training::{Checkpointer, DeviceCheckpoint, Trainer, TrainingStats};
