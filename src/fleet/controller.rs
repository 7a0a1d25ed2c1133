//! Device Controller
//!
//! Binds one environment, one replay buffer, one trainer and the checkpoint
//! and model files of a single device, and runs the control loop for each
//! new measurement.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::paths::DevicePaths;
use crate::config::{AppConfig, TrainingConfig};
use crate::error::{HadesError, Result};
use crate::persistence::{ModelStore, SnapshotStore};
use crate::rl::core::{Action, Observation, Reward};
use crate::rl::environment::DeviceEnvironment;
use crate::rl::memory::{ReplayBuffer, Transition};
use crate::rl::training::{
    CheckpointFingerprint, Checkpointer, DeviceCheckpoint, Trainer, TrainingStats,
    CHECKPOINT_VERSION,
};
use crate::services::FleetMetrics;
use crate::validation::DeviceId;

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Send interval after the step, in minutes
    pub send_interval: u32,
    pub reward: Reward,
    pub delta: f64,
}

type SharedTrainer = Arc<Mutex<Box<dyn Trainer>>>;

/// Control loop state for one device
pub struct DeviceController {
    device_id: DeviceId,
    environment: DeviceEnvironment,
    buffer: ReplayBuffer,
    trainer: SharedTrainer,
    checkpointer: Checkpointer,
    /// Checkpoint file as we last wrote or read it
    checkpoint_seen: Option<CheckpointFingerprint>,
    models: ModelStore,
    training: TrainingConfig,
    stats: TrainingStats,
    metrics: Arc<FleetMetrics>,
    observations: u64,
    restored: bool,
    bootstrapped: bool,
    first_cycle: bool,
}

impl DeviceController {
    /// Create a new controller; no IO happens until the first observation
    pub fn new(
        device_id: DeviceId,
        config: &AppConfig,
        trainer: Box<dyn Trainer>,
        metrics: Arc<FleetMetrics>,
    ) -> Self {
        let paths = DevicePaths::for_device(&config.storage, &device_id);
        let environment = DeviceEnvironment::new(
            device_id.clone(),
            &config.environment,
            SnapshotStore::new(&paths.state),
        );

        Self {
            device_id,
            environment,
            buffer: ReplayBuffer::new(config.training.buffer_capacity),
            trainer: Arc::new(Mutex::new(trainer)),
            checkpointer: Checkpointer::new(&paths.checkpoint),
            checkpoint_seen: None,
            models: ModelStore::new(&config.storage.model_dir),
            training: config.training.clone(),
            stats: TrainingStats::default(),
            metrics,
            observations: 0,
            restored: false,
            bootstrapped: false,
            first_cycle: true,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn environment(&self) -> &DeviceEnvironment {
        &self.environment
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Advance the control loop with a new measurement
    ///
    /// Trainer, checkpoint and export failures are logged and never returned;
    /// the decision for the step is always produced.
    #[instrument(skip(self), fields(device = %self.device_id))]
    pub async fn observe(&mut self, measurement: f64) -> Decision {
        if !self.restored {
            self.restore_on_first_use().await;
        }

        if self.training.bootstrap_step && !self.bootstrapped {
            self.bootstrap();
        }

        let state = self.environment.observation();
        let action = self.choose_action(&state);
        let step = self.environment.step(action, measurement);

        self.buffer.push(Transition::new(
            state,
            action,
            step.reward,
            step.observation,
            step.discount,
        ));
        self.stats.global_step += 1;
        self.observations += 1;

        if self.observations % self.training.train_every.max(1) == 0 {
            self.training_cycle().await;
        }

        Decision {
            action,
            send_interval: step.send_interval,
            reward: step.reward,
            delta: step.observation.delta,
        }
    }

    /// Record one transition from the reset observation so the first
    /// training cycle has a full window to sample
    ///
    /// The reward comes from the reward policy; the environment is not
    /// advanced, so the first real measurement still seeds the delta.
    fn bootstrap(&mut self) {
        let observation = self.environment.reset();
        let action = self.choose_action(&observation);
        let scored = self.environment.preview(action);

        self.buffer.push(Transition::new(
            observation,
            action,
            scored.reward,
            scored.observation,
            scored.discount,
        ));
        self.stats.global_step += 1;
        self.bootstrapped = true;
        debug!(device = %self.device_id, %action, reward = %scored.reward, "Recorded bootstrap transition");
    }

    fn choose_action(&self, observation: &Observation) -> Action {
        match self.try_lock_trainer() {
            Some(mut trainer) => trainer.choose_action(observation),
            None => {
                warn!(device = %self.device_id, "Trainer busy with a timed out call, holding interval");
                Action::NoOp
            }
        }
    }

    /// Lock the trainer without blocking the async worker
    ///
    /// Returns `None` while a timed-out blocking call still holds it.
    fn try_lock_trainer(&self) -> Option<MutexGuard<'_, Box<dyn Trainer>>> {
        match self.trainer.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    async fn training_cycle(&mut self) {
        let batch = match self
            .buffer
            .sample_batch(self.training.batch_size, self.training.window_length)
        {
            Ok(batch) => batch,
            Err(HadesError::EmptyBuffer { available, required }) => {
                self.stats.skipped_cycles += 1;
                self.metrics.inc_skipped_cycles();
                debug!(device = %self.device_id, available, required, "Not enough experience, skipping training");
                return;
            }
            Err(e) => {
                warn!(device = %self.device_id, error = %e, "Sampling failed, skipping training");
                return;
            }
        };

        if !self.first_cycle {
            self.restore_newer_checkpoint().await;
        }

        let timeout_ms = self.training.trainer_timeout_ms;
        let loss = self
            .run_trainer("train", timeout_ms, move |trainer| trainer.train_on_batch(&batch))
            .await;

        match loss {
            Ok(loss) => {
                self.stats.record_success(loss);
                self.metrics.inc_training_cycles();
                debug!(
                    device = %self.device_id,
                    loss,
                    cycle = self.stats.training_cycles,
                    "Training cycle complete"
                );
            }
            Err(e) => {
                self.metrics.inc_trainer_failures();
                self.record_failure("train", &e);
                return;
            }
        }

        self.first_cycle = false;

        if self.stats.training_cycles % self.training.checkpoint_every.max(1) == 0 {
            self.save_checkpoint().await;
        }

        if self.stats.training_cycles % self.training.export_every.max(1) == 0 {
            self.export_model().await;
        }
    }

    /// Run a trainer call on the blocking pool under a timeout
    async fn run_trainer<T, F>(&self, operation: &'static str, timeout_ms: u64, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Trainer) -> Result<T> + Send + 'static,
    {
        let trainer = Arc::clone(&self.trainer);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = trainer.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut **guard)
        });

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(HadesError::Trainer(format!(
                "{} task failed: {}",
                operation, join_error
            ))),
            Err(_) => Err(HadesError::Timeout {
                operation: operation.to_string(),
                after_ms: timeout_ms,
            }),
        }
    }

    /// Export the policy and write the artifact, both off the async worker
    async fn export_model(&mut self) {
        let timeout_ms = self.training.export_timeout_ms;
        let models = self.models.clone();
        let device = self.device_id.clone();
        let exported = self
            .run_trainer("export", timeout_ms, move |trainer| {
                let bytes = trainer.export_model()?;
                models.write(&device, &bytes)
            })
            .await;

        match exported {
            Ok(_) => {
                self.stats.exports += 1;
                self.metrics.inc_models_exported();
            }
            Err(e) => {
                self.metrics.inc_export_failures();
                self.record_failure("export", &e);
            }
        }
    }

    fn record_failure(&mut self, operation: &str, e: &HadesError) {
        let consecutive = self.stats.record_failure();
        if consecutive >= self.training.failure_alert_threshold {
            error!(
                device = %self.device_id,
                operation,
                consecutive,
                error = %e,
                "Repeated trainer failures"
            );
        } else {
            warn!(device = %self.device_id, operation, consecutive, error = %e, "Trainer call failed, retrying on next observation");
        }
    }

    async fn restore_on_first_use(&mut self) {
        self.restored = true;
        match self.load_checkpoint().await {
            Ok(Some(checkpoint)) => {
                // a restored device already has experience to train on
                self.bootstrapped = self.apply_checkpoint(checkpoint);
            }
            Ok(None) => debug!(device = %self.device_id, "No checkpoint, starting fresh"),
            Err(e) => {
                self.checkpoint_seen = self.checkpointer.fingerprint();
                warn!(device = %self.device_id, error = %e, "Ignoring unreadable checkpoint");
            }
        }
    }

    /// Pick up a checkpoint written by someone who got further than us
    ///
    /// The file is only read back when it changed since we last wrote or
    /// read it.
    async fn restore_newer_checkpoint(&mut self) {
        let current = self.checkpointer.fingerprint();
        if current.is_none() || current == self.checkpoint_seen {
            return;
        }

        match self.load_checkpoint().await {
            Ok(Some(checkpoint)) if checkpoint.global_step > self.stats.global_step => {
                self.apply_checkpoint(checkpoint);
            }
            Ok(_) => {}
            Err(e) => {
                self.checkpoint_seen = current;
                warn!(device = %self.device_id, error = %e, "Ignoring unreadable checkpoint");
            }
        }
    }

    /// Read and decode the checkpoint on the blocking pool
    async fn load_checkpoint(&mut self) -> Result<Option<DeviceCheckpoint>> {
        let checkpointer = self.checkpointer.clone();
        let (checkpoint, fingerprint) = tokio::task::spawn_blocking(move || {
            let fingerprint = checkpointer.fingerprint();
            checkpointer
                .restore_if_exists()
                .map(|checkpoint| (checkpoint, fingerprint))
        })
        .await
        .map_err(|e| HadesError::persistence(self.checkpointer.path(), e))??;

        if checkpoint.is_some() {
            self.stats.checkpoint_loads += 1;
        }
        self.checkpoint_seen = fingerprint;
        Ok(checkpoint)
    }

    /// Returns whether the checkpoint was applied
    fn apply_checkpoint(&mut self, checkpoint: DeviceCheckpoint) -> bool {
        let restored = match self.try_lock_trainer() {
            Some(mut trainer) => trainer.restore(&checkpoint.trainer),
            None => Err(HadesError::Trainer("trainer busy".to_string())),
        };

        if let Err(e) = restored {
            warn!(device = %self.device_id, error = %e, "Failed to restore trainer state");
            return false;
        }

        self.buffer = ReplayBuffer::from_transitions(self.buffer.capacity(), checkpoint.transitions);
        self.stats.global_step = checkpoint.global_step;
        self.stats.training_cycles = checkpoint.training_cycles;

        info!(
            device = %self.device_id,
            global_step = checkpoint.global_step,
            transitions = self.buffer.len(),
            "Restored checkpoint"
        );
        true
    }

    /// Snapshot on the async worker, serialise and write on the blocking pool
    async fn save_checkpoint(&mut self) {
        let Some(trainer_state) = self.try_lock_trainer().map(|t| t.snapshot()) else {
            warn!(device = %self.device_id, "Trainer busy, checkpoint skipped");
            return;
        };

        let checkpoint = DeviceCheckpoint {
            device_id: self.device_id.clone(),
            global_step: self.stats.global_step,
            training_cycles: self.stats.training_cycles,
            trainer: trainer_state,
            transitions: self.buffer.get_all(),
            saved_at: Utc::now(),
            version: CHECKPOINT_VERSION,
        };

        let checkpointer = self.checkpointer.clone();
        let saved = tokio::task::spawn_blocking(move || {
            checkpointer
                .save(&checkpoint)
                .map(|()| checkpointer.fingerprint())
        })
        .await;

        match saved {
            Ok(Ok(fingerprint)) => {
                self.checkpoint_seen = fingerprint;
                self.metrics.inc_checkpoints_saved();
            }
            Ok(Err(e)) => warn!(device = %self.device_id, error = %e, "Failed to save checkpoint"),
            Err(e) => warn!(device = %self.device_id, error = %e, "Checkpoint task failed"),
        }
    }
}
