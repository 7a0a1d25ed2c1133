//! Fleet Orchestrator
//!
//! Registry of device controllers. Observations for one device run one at a
//! time in arrival order; different devices run in parallel.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::controller::{Decision, DeviceController};
use crate::config::AppConfig;
use crate::error::Result;
use crate::persistence::ModelStore;
use crate::rl::algorithms::QLearningTrainer;
use crate::rl::training::Trainer;
use crate::services::{FleetMetrics, MetricsSnapshot};
use crate::validation::{validate_measurement, DeviceId};

/// Builds the trainer for a newly registered device
///
/// Runs outside the registry lock. Under a registration race it may run more
/// than once for the same device; only one result is kept.
pub type TrainerFactory = Arc<dyn Fn(&DeviceId) -> Box<dyn Trainer> + Send + Sync>;

pub type SharedController = Arc<Mutex<DeviceController>>;

pub struct FleetOrchestrator {
    config: Arc<AppConfig>,
    devices: DashMap<DeviceId, SharedController>,
    trainer_factory: TrainerFactory,
    models: ModelStore,
    metrics: Arc<FleetMetrics>,
}

impl FleetOrchestrator {
    /// Create an orchestrator that trains every device with tabular Q-learning
    pub fn new(config: AppConfig) -> Self {
        let q_config = config.q_learning.clone();
        let factory: TrainerFactory = Arc::new(move |_: &DeviceId| -> Box<dyn Trainer> {
            Box::new(QLearningTrainer::new(q_config.clone()))
        });
        Self::with_trainer_factory(config, factory)
    }

    pub fn with_trainer_factory(config: AppConfig, trainer_factory: TrainerFactory) -> Self {
        let models = ModelStore::new(&config.storage.model_dir);
        Self {
            config: Arc::new(config),
            devices: DashMap::new(),
            trainer_factory,
            models,
            metrics: Arc::new(FleetMetrics::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn device_exists(&self, device: &DeviceId) -> bool {
        self.devices.contains_key(device)
    }

    /// Register a device
    ///
    /// # Returns
    /// * `true` if the device was added, `false` if it was already known
    pub fn register_device(&self, device: &DeviceId) -> bool {
        self.get_or_register(device).1
    }

    /// Validate, register if new, and run one control-loop step
    ///
    /// Only validation failures are returned; the device's state is left
    /// untouched when they occur.
    #[instrument(skip(self))]
    pub async fn route_observation(&self, device: &str, measurement: f64) -> Result<Decision> {
        let device = DeviceId::parse(device)
            .and_then(|id| validate_measurement(measurement).map(|_| id))
            .map_err(|e| {
                self.metrics.inc_rejected();
                warn!(error = %e, "Rejected observation");
                e
            })?;

        let (controller, _) = self.get_or_register(&device);
        self.metrics.inc_observations();

        let mut controller = controller.lock().await;
        Ok(controller.observe(measurement).await)
    }

    /// Exported model bytes for a device, if any
    pub fn model_for(&self, device: &DeviceId) -> Result<Option<Vec<u8>>> {
        self.models.read(device)
    }

    /// Registered devices, sorted
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self.devices.iter().map(|e| e.key().clone()).collect();
        devices.sort();
        devices
    }

    pub fn controller(&self, device: &DeviceId) -> Option<SharedController> {
        self.devices.get(device).map(|e| Arc::clone(e.value()))
    }

    pub fn metrics(&self) -> Arc<FleetMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Atomic insert-if-absent
    ///
    /// The controller is built before the shard is locked; the write guard
    /// only covers the insert itself.
    fn get_or_register(&self, device: &DeviceId) -> (SharedController, bool) {
        if let Some(existing) = self.devices.get(device) {
            return (Arc::clone(existing.value()), false);
        }

        let trainer = (self.trainer_factory)(device);
        let candidate = Arc::new(Mutex::new(DeviceController::new(
            device.clone(),
            &self.config,
            trainer,
            Arc::clone(&self.metrics),
        )));

        match self.devices.entry(device.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&candidate));
                self.metrics.inc_devices_registered();
                info!(device = %device, "Registered device");
                (candidate, true)
            }
        }
    }
}
