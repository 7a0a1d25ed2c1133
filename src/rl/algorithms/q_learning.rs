//! Tabular Q-Learning
//!
//! Default trainer: the delta is bucketed by `delta_resolution` and each
//! bucket keeps one Q-value per action. Exploration is epsilon-greedy with
//! multiplicative decay per training batch.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{HadesError, Result};
use crate::rl::core::{Action, Observation, NUM_ACTIONS};
use crate::rl::memory::Transition;
use crate::rl::training::Trainer;

/// Largest delta bucket; anything above shares the last bucket
const MAX_BUCKET: i64 = 10_000;

/// Exported policy format tag
pub const POLICY_FORMAT: &str = "hades-greedy-policy";

/// Hyper-parameters for the Q-learning trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    /// Multiplied with the per-step discount from the environment
    pub discount_factor: f64,
    /// Exploration rate
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    /// Width of one delta bucket
    pub delta_resolution: f64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            epsilon: 1.0,
            epsilon_decay: 0.995,
            min_epsilon: 0.01,
            delta_resolution: 0.1,
        }
    }
}

impl QLearningConfig {
    /// Returns every violation found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            errors.push(format!(
                "q_learning.learning_rate must be within (0, 1]: {}",
                self.learning_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            errors.push(format!(
                "q_learning.discount_factor must be within [0, 1]: {}",
                self.discount_factor
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon) || !(0.0..=1.0).contains(&self.min_epsilon) {
            errors.push("q_learning.epsilon and q_learning.min_epsilon must be within [0, 1]".to_string());
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            errors.push(format!(
                "q_learning.epsilon_decay must be within (0, 1]: {}",
                self.epsilon_decay
            ));
        }
        if !(self.delta_resolution.is_finite() && self.delta_resolution > 0.0) {
            errors.push(format!(
                "q_learning.delta_resolution must be positive: {}",
                self.delta_resolution
            ));
        }

        errors
    }
}

/// Serialised learner state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QTableState {
    config: QLearningConfig,
    q_table: BTreeMap<i64, [f64; NUM_ACTIONS]>,
    updates: u64,
}

/// Exported greedy policy: delta bucket to action index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreedyPolicy {
    pub format: String,
    pub delta_resolution: f64,
    /// Action for buckets never visited
    pub default_action: u8,
    pub policy: BTreeMap<i64, u8>,
}

impl GreedyPolicy {
    /// Look up the action for a delta
    pub fn action_for(&self, delta: f64) -> Action {
        let bucket = bucket_of(delta, self.delta_resolution);
        let index = self.policy.get(&bucket).copied().unwrap_or(self.default_action);
        Action::from_index(index as usize).unwrap_or_default()
    }
}

fn bucket_of(delta: f64, resolution: f64) -> i64 {
    if !delta.is_finite() {
        return MAX_BUCKET;
    }
    ((delta.abs() / resolution).floor() as i64).min(MAX_BUCKET)
}

fn argmax(values: &[f64; NUM_ACTIONS]) -> usize {
    // first maximum wins so an untouched row prefers NoOp
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Tabular Q-learning trainer
pub struct QLearningTrainer {
    config: QLearningConfig,
    q_table: BTreeMap<i64, [f64; NUM_ACTIONS]>,
    updates: u64,
    rng: StdRng,
}

impl QLearningTrainer {
    /// Create a new trainer with an entropy-seeded exploration RNG
    pub fn new(config: QLearningConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create with a fixed seed
    pub fn with_seed(config: QLearningConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: QLearningConfig, rng: StdRng) -> Self {
        Self {
            config,
            q_table: BTreeMap::new(),
            updates: 0,
            rng,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Q-values for an observation; zeros for unseen buckets
    pub fn q_values(&self, observation: &Observation) -> [f64; NUM_ACTIONS] {
        let bucket = self.bucket(observation.delta);
        self.q_table.get(&bucket).copied().unwrap_or([0.0; NUM_ACTIONS])
    }

    pub fn greedy_action(&self, observation: &Observation) -> Action {
        Action::from_index(argmax(&self.q_values(observation))).unwrap_or_default()
    }

    pub fn greedy_policy(&self) -> GreedyPolicy {
        GreedyPolicy {
            format: POLICY_FORMAT.to_string(),
            delta_resolution: self.config.delta_resolution,
            default_action: Action::NoOp.to_index() as u8,
            policy: self
                .q_table
                .iter()
                .map(|(bucket, values)| (*bucket, argmax(values) as u8))
                .collect(),
        }
    }

    fn bucket(&self, delta: f64) -> i64 {
        bucket_of(delta, self.config.delta_resolution)
    }

    /// One TD update, returns the TD error before the update
    fn update(&mut self, transition: &Transition) -> f64 {
        let next_max = self
            .q_values(&transition.next_state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let gamma = self.config.discount_factor * transition.discount as f64;
        let target = transition.reward_value() as f64 + gamma * next_max;

        let bucket = self.bucket(transition.state.delta);
        let action = transition.action.to_index();
        let row = self.q_table.entry(bucket).or_insert([0.0; NUM_ACTIONS]);

        let td_error = target - row[action];
        row[action] += self.config.learning_rate * td_error;
        td_error
    }

    fn decay_epsilon(&mut self) {
        self.config.epsilon = (self.config.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);
    }
}

impl Trainer for QLearningTrainer {
    fn choose_action(&mut self, observation: &Observation) -> Action {
        if self.rng.gen::<f64>() < self.config.epsilon {
            let index = self.rng.gen_range(0..NUM_ACTIONS);
            Action::from_index(index).unwrap_or_default()
        } else {
            self.greedy_action(observation)
        }
    }

    fn train_on_batch(&mut self, batch: &[Vec<Transition>]) -> Result<f32> {
        let mut squared = 0.0;
        let mut count = 0usize;

        for window in batch {
            for transition in window {
                let td_error = self.update(transition);
                squared += td_error * td_error;
                count += 1;
            }
        }

        if count == 0 {
            return Err(HadesError::Trainer("empty training batch".to_string()));
        }

        self.updates += 1;
        self.decay_epsilon();

        let loss = (squared / count as f64) as f32;
        debug!(
            loss,
            epsilon = self.config.epsilon,
            buckets = self.q_table.len(),
            "Q-learning update"
        );
        Ok(loss)
    }

    fn snapshot(&self) -> serde_json::Value {
        let state = QTableState {
            config: self.config.clone(),
            q_table: self.q_table.clone(),
            updates: self.updates,
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<()> {
        let state: QTableState = serde_json::from_value(state.clone())
            .map_err(|e| HadesError::Trainer(format!("invalid Q-table snapshot: {}", e)))?;

        self.config = state.config;
        self.q_table = state.q_table;
        self.updates = state.updates;
        Ok(())
    }

    fn export_model(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.greedy_policy()).map_err(|e| HadesError::Export(e.to_string()))
    }
}
