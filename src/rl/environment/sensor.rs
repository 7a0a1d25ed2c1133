//! Sensor Environment
//!
//! Gym-like step/reset interface over one device's temperature stream.
//! The action moves the send interval; the reward scores that move against
//! the delta between consecutive readings.

use tracing::{debug, warn};

use crate::config::EnvironmentConfig;
use crate::persistence::{SnapshotStore, StateSnapshot};
use crate::rl::core::{Action, EnvPhase, EnvironmentState, Observation, Reward, RewardPolicy};
use crate::validation::DeviceId;

/// Result of a single environment step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// Observation after the step, `[delta]`
    pub observation: Observation,
    pub reward: Reward,
    pub discount: f32,
    /// Send interval after the step
    pub send_interval: u32,
}

/// Per-device environment
pub struct DeviceEnvironment {
    device_id: DeviceId,
    policy: RewardPolicy,
    discount: f32,
    snapshot_every: u64,
    store: SnapshotStore,
    state: EnvironmentState,
    /// Last snapshot this process wrote or read; anything else on disk came
    /// from an external writer
    last_synced: Option<StateSnapshot>,
}

impl DeviceEnvironment {
    /// Create a new environment in the `Fresh` phase
    pub fn new(device_id: DeviceId, config: &EnvironmentConfig, store: SnapshotStore) -> Self {
        Self {
            device_id,
            policy: RewardPolicy::from_config(config),
            discount: config.discount as f32,
            snapshot_every: config.snapshot_every.max(1),
            store,
            state: EnvironmentState::new(config.initial_send_interval),
            last_synced: None,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    pub fn phase(&self) -> EnvPhase {
        self.state.phase()
    }

    pub fn discount(&self) -> f32 {
        self.discount
    }

    pub fn send_interval(&self) -> u32 {
        self.state.send_interval
    }

    /// Current observation without stepping
    pub fn observation(&self) -> Observation {
        self.state.observation()
    }

    /// Reset the delta and clear the episode flag
    ///
    /// Measurements and the send interval carry over.
    pub fn reset(&mut self) -> Observation {
        self.state.delta = 0.0;
        self.state.episode_ended = false;
        self.state.observation()
    }

    /// Mark the episode as ended; the next step resets instead of advancing
    pub fn end_episode(&mut self) {
        self.state.episode_ended = true;
    }

    /// Score an action against the current observation without advancing
    ///
    /// Nothing is mutated or written; the observation carries over.
    pub fn preview(&self, action: Action) -> StepResult {
        let observation = self.state.observation();
        let (reward, send_interval) =
            self.policy
                .score(observation.delta, action, self.state.send_interval);

        StepResult {
            observation,
            reward,
            discount: self.discount,
            send_interval,
        }
    }

    /// Advance one step with a new measurement
    pub fn step(&mut self, action: Action, measurement: f64) -> StepResult {
        self.state.iteration += 1;

        self.sync_from_disk();
        self.state.current_measurement = Some(measurement);

        if self.state.episode_ended {
            let observation = self.reset();
            debug!(device = %self.device_id, "Episode ended, environment reset");
            return StepResult {
                observation,
                reward: Reward::DoNothing,
                discount: self.discount,
                send_interval: self.state.send_interval,
            };
        }

        let previous = *self.state.previous_measurement.get_or_insert(measurement);
        let delta = (previous - measurement).abs();
        self.state.delta = delta;
        self.state.previous_measurement = Some(measurement);

        let old_interval = self.state.send_interval;
        let (reward, interval) = self.policy.score(delta, action, old_interval);
        self.state.send_interval = interval;

        debug!(
            device = %self.device_id,
            iteration = self.state.iteration,
            delta,
            %action,
            %reward,
            old_interval,
            send_interval = self.state.send_interval,
            "Environment step"
        );

        if self.state.iteration % self.snapshot_every == 0 {
            self.persist();
        }

        StepResult {
            observation: self.state.observation(),
            reward,
            discount: self.discount,
            send_interval: self.state.send_interval,
        }
    }

    /// Write the current state snapshot regardless of cadence
    pub fn persist(&mut self) {
        let snapshot = StateSnapshot::from_state(&self.state);
        match self.store.save(&snapshot) {
            Ok(()) => self.last_synced = Some(snapshot),
            Err(e) => warn!(device = %self.device_id, error = %e, "Failed to persist state snapshot"),
        }
    }

    /// Overlay the on-disk snapshot if someone else changed it
    fn sync_from_disk(&mut self) {
        match self.store.load() {
            Ok(Some(snapshot)) => {
                if self.last_synced.as_ref() != Some(&snapshot) {
                    debug!(device = %self.device_id, "Applying external state snapshot");
                    snapshot.apply_to(&mut self.state);
                    self.last_synced = Some(snapshot);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(device = %self.device_id, error = %e, "Ignoring unreadable state snapshot");
            }
        }
    }
}
