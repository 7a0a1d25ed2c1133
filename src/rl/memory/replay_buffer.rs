//! Replay Buffer
//!
//! Bounded per-device experience store, sampled as windows of consecutive
//! transitions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{HadesError, Result};
use crate::rl::core::{Action, Observation, Reward};

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation before the action
    pub state: Observation,
    pub action: Action,
    pub reward: Reward,
    /// Observation after the step
    pub next_state: Observation,
    /// Discount returned by the step
    pub discount: f32,
}

impl Transition {
    /// Create a new transition
    pub fn new(
        state: Observation,
        action: Action,
        reward: Reward,
        next_state: Observation,
        discount: f32,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            discount,
        }
    }

    /// Scalar reward
    pub fn reward_value(&self) -> f32 {
        self.reward.value()
    }
}

/// Replay buffer for experience storage
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Storage for transitions
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // grows on demand, large default capacities are mostly unused
            buffer: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Rebuild from persisted transitions, keeping the newest `capacity`
    pub fn from_transitions(capacity: usize, transitions: Vec<Transition>) -> Self {
        let mut buffer = Self::new(capacity);
        for transition in transitions {
            buffer.push(transition);
        }
        buffer
    }

    /// Add a transition, evicting the oldest when full
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Sample `batch_size` windows of `window_length` consecutive transitions
    ///
    /// Each window starts at a uniformly random offset. Windows may overlap.
    pub fn sample_batch(
        &self,
        batch_size: usize,
        window_length: usize,
    ) -> Result<Vec<Vec<Transition>>> {
        let window_length = window_length.max(1);
        if self.buffer.len() < window_length {
            return Err(HadesError::EmptyBuffer {
                available: self.buffer.len(),
                required: window_length,
            });
        }

        let mut rng = rand::thread_rng();
        let last_start = self.buffer.len() - window_length;

        let batch = (0..batch_size)
            .map(|_| {
                let start = rng.gen_range(0..=last_start);
                self.buffer
                    .range(start..start + window_length)
                    .cloned()
                    .collect()
            })
            .collect();

        Ok(batch)
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Get all transitions, oldest first
    pub fn get_all(&self) -> Vec<Transition> {
        self.buffer.iter().cloned().collect()
    }

    /// Most recently added transition
    pub fn latest(&self) -> Option<&Transition> {
        self.buffer.back()
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(delta: f64) -> Transition {
        Transition::new(
            Observation::new(delta),
            Action::NoOp,
            Reward::DoNothing,
            Observation::new(delta + 1.0),
            0.5,
        )
    }

    #[test]
    fn test_eviction_at_capacity() {
        let capacity = 5;
        let mut buffer = ReplayBuffer::new(capacity);

        for i in 0..=capacity {
            buffer.push(transition(i as f64));
        }

        assert_eq!(buffer.len(), capacity);
        // the first transition is gone, the second is now oldest
        assert_eq!(buffer.iter().next().unwrap().state.delta, 1.0);
        assert_eq!(buffer.latest().unwrap().state.delta, capacity as f64);
    }

    #[test]
    fn test_sample_batch_shape_and_contiguity() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..10 {
            buffer.push(transition(i as f64));
        }

        let batch = buffer.sample_batch(4, 3).unwrap();
        assert_eq!(batch.len(), 4);
        for window in &batch {
            assert_eq!(window.len(), 3);
            assert_eq!(window[1].state.delta, window[0].state.delta + 1.0);
            assert_eq!(window[2].state.delta, window[1].state.delta + 1.0);
        }
    }

    #[test]
    fn test_sample_batch_insufficient() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(0.0));

        match buffer.sample_batch(2, 2) {
            Err(HadesError::EmptyBuffer {
                available,
                required,
            }) => {
                assert_eq!(available, 1);
                assert_eq!(required, 2);
            }
            other => panic!("expected EmptyBuffer, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_window_fits() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(0.0));
        buffer.push(transition(1.0));

        let batch = buffer.sample_batch(2, 2).unwrap();
        assert!(batch.iter().all(|w| w[0].state.delta == 0.0));
    }

    #[test]
    fn test_from_transitions_keeps_newest() {
        let transitions: Vec<_> = (0..8).map(|i| transition(i as f64)).collect();
        let buffer = ReplayBuffer::from_transitions(3, transitions);

        let deltas: Vec<f64> = buffer.iter().map(|t| t.state.delta).collect();
        assert_eq!(deltas, vec![5.0, 6.0, 7.0]);
    }
}
