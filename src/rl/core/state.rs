//! State Representation
//!
//! Per-device environment state and the observation handed to policies.

use serde::{Deserialize, Serialize};

/// On-disk marker for a measurement that has not been seen yet
pub const UNSET_MEASUREMENT: f64 = -999.0;

/// Lifecycle phase of a device environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvPhase {
    /// Never stepped
    Fresh,
    /// Stepping normally
    Active,
    /// Terminal; only reachable through an explicit end-of-episode request
    Ended,
}

/// What the policy sees: the absolute delta between consecutive readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub delta: f64,
}

impl Observation {
    pub fn new(delta: f64) -> Self {
        Self { delta }
    }

    /// Flat feature vector, `[delta]`
    pub fn to_vec(&self) -> Vec<f32> {
        vec![self.delta as f32]
    }
}

/// Mutable state of one device environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Last measurement folded into the delta; `None` until the first step
    pub previous_measurement: Option<f64>,
    /// Most recent measurement
    pub current_measurement: Option<f64>,
    /// `|previous - current|`
    pub delta: f64,
    /// Minutes between reports, never below 1
    pub send_interval: u32,
    /// Steps taken so far
    pub iteration: u64,
    pub episode_ended: bool,
}

impl EnvironmentState {
    pub fn new(initial_send_interval: u32) -> Self {
        Self {
            previous_measurement: None,
            current_measurement: None,
            delta: 0.0,
            send_interval: initial_send_interval.max(1),
            iteration: 0,
            episode_ended: false,
        }
    }

    pub fn phase(&self) -> EnvPhase {
        if self.episode_ended {
            EnvPhase::Ended
        } else if self.iteration == 0 {
            EnvPhase::Fresh
        } else {
            EnvPhase::Active
        }
    }

    pub fn observation(&self) -> Observation {
        Observation::new(self.delta)
    }
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self::new(1)
    }
}
