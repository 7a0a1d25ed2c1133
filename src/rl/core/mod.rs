//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{Action, NUM_ACTIONS};
pub use reward::{
    map_action_to_interval, Reward, RewardPolicy, DEFAULT_COMFORT_MARGIN, DEFAULT_GROWTH_MARGIN,
};
pub use state::{EnvPhase, EnvironmentState, Observation, UNSET_MEASUREMENT};
