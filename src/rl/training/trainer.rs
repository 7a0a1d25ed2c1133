//! Trainer Capability
//!
//! The learning algorithm behind a device controller is pluggable. The
//! control loop only needs an action for an observation, an update from a
//! batch of experience windows, and opaque snapshot/export hooks.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rl::core::{Action, Observation};
use crate::rl::memory::Transition;

/// Policy plus learner for one device
///
/// Calls are synchronous and may be slow; the controller runs training and
/// export on the blocking pool under a timeout.
#[cfg_attr(test, mockall::automock)]
pub trait Trainer: Send + 'static {
    /// Pick an action for the current observation
    fn choose_action(&mut self, observation: &Observation) -> Action;

    /// Update from sampled windows of consecutive transitions
    ///
    /// # Returns
    /// * The training loss for this batch
    fn train_on_batch(&mut self, batch: &[Vec<Transition>]) -> Result<f32>;

    /// Serialisable learner state for checkpoints
    fn snapshot(&self) -> serde_json::Value;

    /// Load learner state produced by [`Trainer::snapshot`]
    fn restore(&mut self, state: &serde_json::Value) -> Result<()>;

    /// Produce the deployable model artifact
    fn export_model(&self) -> Result<Vec<u8>>;
}

/// Per-device training statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Environment steps recorded to the buffer
    pub global_step: u64,
    /// Successful training cycles
    pub training_cycles: u64,
    /// Cycles skipped for lack of experience
    pub skipped_cycles: u64,
    /// Trainer/export failures in a row, reset on success
    pub consecutive_failures: u32,
    pub last_loss: Option<f32>,
    pub exports: u64,
    /// Checkpoint files read back from disk
    pub checkpoint_loads: u64,
}

impl TrainingStats {
    pub fn record_success(&mut self, loss: f32) {
        self.training_cycles += 1;
        self.consecutive_failures = 0;
        self.last_loss = Some(loss);
    }

    /// Returns the new consecutive failure count
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }
}
