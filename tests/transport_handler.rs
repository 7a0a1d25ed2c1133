use async_trait::async_trait;
use hades::cli::run_lines;
use hades::config::{AppConfig, StorageConfig, TransportConfig};
use hades::fleet::{FleetOrchestrator, TrainerFactory};
use hades::rl::core::Observation;
use hades::rl::memory::Transition;
use hades::transport::{IntervalReply, MessageHandler, OutboundMessage, Publisher, StdoutPublisher};
use hades::{Action, DeviceId, Trainer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Default)]
struct CollectingPublisher {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl Publisher for CollectingPublisher {
    async fn publish(&self, message: OutboundMessage) -> hades::Result<()> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// Holds the interval; every training call takes a while
struct SlowTrainer;

impl Trainer for SlowTrainer {
    fn choose_action(&mut self, _observation: &Observation) -> Action {
        Action::NoOp
    }

    fn train_on_batch(&mut self, _batch: &[Vec<Transition>]) -> hades::Result<f32> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(0.0)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    fn restore(&mut self, _state: &serde_json::Value) -> hades::Result<()> {
        Ok(())
    }

    fn export_model(&self) -> hades::Result<Vec<u8>> {
        Ok(b"slow".to_vec())
    }
}

fn setup(root: &std::path::Path) -> (Arc<FleetOrchestrator>, Arc<CollectingPublisher>, MessageHandler) {
    let config = AppConfig {
        storage: StorageConfig::under(root),
        ..AppConfig::default()
    };
    wire(FleetOrchestrator::new(config))
}

fn setup_slow(root: &std::path::Path) -> (Arc<FleetOrchestrator>, Arc<CollectingPublisher>, MessageHandler) {
    let config = AppConfig {
        storage: StorageConfig::under(root),
        ..AppConfig::default()
    };
    let factory: TrainerFactory = Arc::new(|_: &DeviceId| -> Box<dyn Trainer> { Box::new(SlowTrainer) });
    wire(FleetOrchestrator::with_trainer_factory(config, factory))
}

fn wire(fleet: FleetOrchestrator) -> (Arc<FleetOrchestrator>, Arc<CollectingPublisher>, MessageHandler) {
    let fleet = Arc::new(fleet);
    let publisher = Arc::new(CollectingPublisher::default());
    let handler = MessageHandler::new(
        Arc::clone(&fleet),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        TransportConfig::default(),
    );
    (fleet, publisher, handler)
}

#[tokio::test]
async fn test_statistics_reply_carries_interval() {
    let dir = tempfile::tempdir().unwrap();
    let (_fleet, publisher, handler) = setup(dir.path());

    handler
        .dispatch("hades/lab/aabbccddeeff/statistics", br#"{"temperature": 21.0}"#)
        .await;

    let sent = publisher.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "node/lab/aabbccddeeff/hades/interval");

    let reply: IntervalReply = serde_json::from_slice(&sent[0].payload).unwrap();
    assert!(reply.send_interval >= 1);
    assert_eq!(reply.delta, 0.0);
    assert!(reply.action <= 2);
}

#[tokio::test]
async fn test_model_request_after_training() {
    let dir = tempfile::tempdir().unwrap();
    let (fleet, publisher, handler) = setup(dir.path());

    handler
        .dispatch("hades/lab/aa:bb:cc:dd:ee:ff/statistics", b"20.5")
        .await;
    handler
        .dispatch("hades/lab/aa:bb:cc:dd:ee:ff/model/request", b"")
        .await;

    let sent = publisher.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].topic, "node/lab/aa:bb:cc:dd:ee:ff/hades/model/receive");

    let device = hades::DeviceId::parse("aa:bb:cc:dd:ee:ff").unwrap();
    assert_eq!(sent[1].payload, fleet.model_for(&device).unwrap().unwrap());
}

#[tokio::test]
async fn test_model_request_without_model_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (_fleet, publisher, handler) = setup(dir.path());

    let reply = handler
        .handle("hades/lab/aabbccddeeff/model/request", b"")
        .await
        .unwrap();
    assert!(reply.is_none());
    assert!(publisher.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_invalid_messages_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (fleet, publisher, handler) = setup(dir.path());

    handler
        .dispatch("hades/lab/not-a-mac/statistics", b"20")
        .await;
    handler
        .dispatch("hades/lab/aabbccddeeff/statistics", b"hot")
        .await;
    handler.dispatch("hades/lab/aabbccddeeff/unknown", b"20").await;

    assert!(publisher.sent.lock().await.is_empty());
    assert!(fleet.devices().is_empty());
    assert_eq!(fleet.stats().rejected, 1);
}

#[tokio::test]
async fn test_run_lines_until_input_ends() {
    let dir = tempfile::tempdir().unwrap();
    let (fleet, publisher, handler) = setup(dir.path());

    let input: &[u8] = b"# replayed capture\n\
        hades/lab/aabbccddeeff/statistics {\"temperature\": 20}\n\
        \n\
        hades/lab/aabbccddeeff/statistics {\"temperature\": 26}\n\
        hades/lab/aabbccddeeff/model/request\n";

    let handled = run_lines(Arc::new(handler), input, std::future::pending::<()>())
        .await
        .unwrap();

    assert_eq!(handled, 3);
    assert_eq!(fleet.stats().observations, 2);
    assert_eq!(publisher.sent.lock().await.len(), 3);
}

#[tokio::test]
async fn test_run_lines_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let (_fleet, _publisher, handler) = setup(dir.path());

    // a reader that never yields a line
    let (_writer, reader) = tokio::io::duplex(64);
    let reader = tokio::io::BufReader::new(reader);

    let handled = run_lines(Arc::new(handler), reader, async {}).await.unwrap();
    assert_eq!(handled, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_lines_handles_devices_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let (_fleet, publisher, handler) = setup_slow(dir.path());

    let input: &[u8] = b"hades/lab/020000000001/statistics 20\n\
        hades/lab/020000000002/statistics 20\n\
        hades/lab/020000000003/statistics 20\n";

    let started = Instant::now();
    let handled = run_lines(Arc::new(handler), input, std::future::pending::<()>())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(handled, 3);
    assert_eq!(publisher.sent.lock().await.len(), 3);
    // three 300ms training calls, overlapped
    assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_lines_keeps_device_order() {
    let dir = tempfile::tempdir().unwrap();
    let (fleet, publisher, handler) = setup(dir.path());

    let mut input = String::new();
    for n in 0..10 {
        input.push_str(&format!("hades/lab/aabbccddeeff/statistics {}\n", 20 + n));
        input.push_str(&format!("hades/lab/020000000001/statistics {}\n", 40 - n));
    }

    let handled = run_lines(Arc::new(handler), input.as_bytes(), std::future::pending::<()>())
        .await
        .unwrap();
    assert_eq!(handled, 20);

    let device = DeviceId::parse("aabbccddeeff").unwrap();
    let controller = fleet.controller(&device).unwrap();
    let controller = controller.lock().await;
    assert_eq!(controller.observations(), 10);
    assert_eq!(controller.environment().state().current_measurement, Some(29.0));

    // replies in arrival order: zero delta first, then steps of one degree
    let sent = publisher.sent.lock().await;
    let deltas: Vec<f64> = sent
        .iter()
        .filter(|m| m.topic.starts_with("node/lab/aabbccddeeff/"))
        .map(|m| serde_json::from_slice::<IntervalReply>(&m.payload).unwrap().delta)
        .collect();
    assert_eq!(deltas.len(), 10);
    assert_eq!(deltas[0], 0.0);
    assert!(deltas[1..].iter().all(|d| *d == 1.0));
}

#[test]
fn test_stdout_publisher_writes() {
    let message = OutboundMessage::new("node/lab/aabbccddeeff/hades/interval", b"{}".to_vec());
    tokio_test::block_on(StdoutPublisher::new().publish(message)).unwrap();
}
