use futures::future::join_all;
use hades::config::{AppConfig, StorageConfig};
use hades::fleet::{FleetOrchestrator, TrainerFactory};
use hades::persistence::SnapshotStore;
use hades::rl::core::Observation;
use hades::rl::memory::Transition;
use hades::{Action, DeviceId, Reward, Trainer};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// Always shrinks the interval; trains instantly
struct AlwaysDecrease;

impl Trainer for AlwaysDecrease {
    fn choose_action(&mut self, _observation: &Observation) -> Action {
        Action::DecreaseInterval
    }

    fn train_on_batch(&mut self, batch: &[Vec<Transition>]) -> hades::Result<f32> {
        Ok(batch.len() as f32)
    }

    fn snapshot(&self) -> Value {
        json!({})
    }

    fn restore(&mut self, _state: &Value) -> hades::Result<()> {
        Ok(())
    }

    fn export_model(&self) -> hades::Result<Vec<u8>> {
        Ok(b"decrease".to_vec())
    }
}

fn config_in(root: &Path) -> AppConfig {
    AppConfig {
        storage: StorageConfig::under(root),
        ..AppConfig::default()
    }
}

fn always_decrease() -> TrainerFactory {
    Arc::new(|_: &DeviceId| -> Box<dyn Trainer> { Box::new(AlwaysDecrease) })
}

#[tokio::test]
async fn test_first_observation_for_new_device() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = FleetOrchestrator::new(config_in(dir.path()));
    let device = DeviceId::parse("AA:BB:CC:DD:EE:FF").unwrap();

    assert!(!dir.path().join("states").join(device.as_str()).exists());

    let decision = fleet
        .route_observation("AA:BB:CC:DD:EE:FF", 20.0)
        .await
        .unwrap();
    assert_eq!(decision.delta, 0.0);

    let controller = fleet.controller(&device).unwrap();
    let controller = controller.lock().await;
    assert!(!controller.buffer().is_empty());
    assert_eq!(controller.buffer().latest().unwrap().action, decision.action);
    assert_eq!(controller.observations(), 1);
}

#[tokio::test]
async fn test_out_of_bounds_reading_shrinks_persisted_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.environment.boundary = 2.0;
    config.environment.snapshot_every = 1;

    let state_path = config.storage.state_dir.join("AA:BB:CC:DD:EE:FF");
    std::fs::create_dir_all(&config.storage.state_dir).unwrap();
    std::fs::write(
        &state_path,
        r#"{"stats": {"prev_temperature": 20.0, "send_interval": 5}}"#,
    )
    .unwrap();

    let fleet = FleetOrchestrator::with_trainer_factory(config, always_decrease());
    let decision = fleet
        .route_observation("aa:bb:cc:dd:ee:ff", 25.0)
        .await
        .unwrap();

    assert_eq!(decision.delta, 5.0);
    assert_eq!(decision.action, Action::DecreaseInterval);
    assert_eq!(decision.reward, Reward::CorrectAction);
    assert_eq!(decision.send_interval, 4);

    let persisted = SnapshotStore::new(&state_path).load().unwrap().unwrap();
    assert_eq!(persisted.stats.send_interval, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_devices_keep_their_own_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.training.bootstrap_step = false;

    let fleet = Arc::new(FleetOrchestrator::with_trainer_factory(
        config,
        always_decrease(),
    ));

    let devices: Vec<(String, usize)> = (0..8)
        .map(|i| (format!("02:00:00:00:00:{:02x}", i), 3 + i))
        .collect();

    let mut tasks = Vec::new();
    for (mac, count) in &devices {
        for n in 0..*count {
            let fleet = Arc::clone(&fleet);
            let mac = mac.clone();
            tasks.push(tokio::spawn(async move {
                fleet.route_observation(&mac, 20.0 + n as f64).await
            }));
        }
    }

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(fleet.devices().len(), devices.len());
    for (mac, count) in &devices {
        let id = DeviceId::parse(mac).unwrap();
        let controller = fleet.controller(&id).unwrap();
        let controller = controller.lock().await;

        assert_eq!(controller.buffer().len(), *count, "device {}", mac);
        assert_eq!(controller.observations(), *count as u64);
    }

    let total: usize = devices.iter().map(|(_, c)| c).sum();
    assert_eq!(fleet.stats().observations, total as u64);
    assert_eq!(fleet.stats().devices_registered, devices.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_observations_register_once() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Arc::new(FleetOrchestrator::with_trainer_factory(
        config_in(dir.path()),
        always_decrease(),
    ));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let fleet = Arc::clone(&fleet);
            tokio::spawn(async move { fleet.route_observation("aabbccddeeff", 20.0 + i as f64).await })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(fleet.devices().len(), 1);
    assert_eq!(fleet.stats().devices_registered, 1);
    assert_eq!(fleet.stats().observations, 16);
}

#[tokio::test]
async fn test_exported_model_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = FleetOrchestrator::with_trainer_factory(config_in(dir.path()), always_decrease());
    let device = DeviceId::parse("AA:BB:CC:DD:EE:FF").unwrap();

    assert!(fleet.model_for(&device).unwrap().is_none());
    fleet.route_observation(device.as_str(), 20.0).await.unwrap();

    assert_eq!(fleet.model_for(&device).unwrap().unwrap(), b"decrease".to_vec());
}
