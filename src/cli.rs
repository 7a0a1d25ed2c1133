use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fleet::FleetOrchestrator;
use crate::transport::{IntervalReply, MessageHandler};
use crate::validation::DeviceId;

#[derive(Parser)]
#[command(name = "hades")]
#[command(version)]
#[command(about = "Adaptive send-interval tuning for sensor fleets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file layered over config/default.toml
    #[arg(short, long, global = true, env = "HADES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root for states/, checkpoints/ and models/ (overrides [storage])
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read `<topic> <payload>` lines from stdin, print replies to stdout
    Run,
    /// Feed a single measurement for a device and print the decision
    Observe {
        /// Device MAC address
        #[arg(short, long)]
        device: String,
        /// Measured temperature
        #[arg(short, long, allow_hyphen_values = true)]
        measurement: f64,
    },
    /// Show whether an exported model exists for a device
    Model {
        /// Device MAC address
        #[arg(short, long)]
        device: String,
    },
}

/// Split an input line into topic and payload at the first space
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.split_once(' ').unwrap_or((line, "")))
}

/// Messages queued per device before the reader waits
const LANE_CAPACITY: usize = 256;

type Lane = mpsc::Sender<(String, Vec<u8>)>;

/// Feed lines to the handler until input ends or `shutdown` resolves
///
/// Every device gets its own worker: one device's messages are handled in
/// arrival order, different devices run in parallel. Queued messages are
/// drained before returning.
///
/// # Returns
/// * Number of lines dispatched
pub async fn run_lines<R, S>(handler: Arc<MessageHandler>, input: R, shutdown: S) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut lanes: HashMap<String, Lane> = HashMap::new();
    let mut workers = JoinSet::new();
    let mut handled = 0u64;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };
                let Some((topic, payload)) = split_line(&line) else {
                    continue;
                };

                let lane = lanes
                    .entry(handler.lane(topic))
                    .or_insert_with_key(|key| spawn_lane(&mut workers, Arc::clone(&handler), key));
                let message = (topic.to_string(), payload.trim().as_bytes().to_vec());
                if lane.send(message).await.is_err() {
                    warn!(topic, "Device worker stopped, message dropped");
                    continue;
                }
                handled += 1;
            }
        }
    }

    // closing the lanes lets each worker finish its queue and exit
    drop(lanes);
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Device worker failed");
        }
    }

    Ok(handled)
}

fn spawn_lane(workers: &mut JoinSet<()>, handler: Arc<MessageHandler>, key: &str) -> Lane {
    let (tx, mut rx) = mpsc::channel::<(String, Vec<u8>)>(LANE_CAPACITY);
    debug!(lane = key, "Starting device worker");

    workers.spawn(async move {
        while let Some((topic, payload)) = rx.recv().await {
            handler.dispatch(&topic, &payload).await;
        }
    });
    tx
}

pub async fn observe_once(fleet: &FleetOrchestrator, device: &str, measurement: f64) -> Result<()> {
    let decision = fleet.route_observation(device, measurement).await?;
    let reply = IntervalReply::from(&decision);

    println!(
        "action={} send_interval={} reward={} delta={:.3}",
        decision.action, reply.send_interval, decision.reward, reply.delta
    );
    Ok(())
}

pub fn show_model(fleet: &FleetOrchestrator, device: &str) -> Result<()> {
    let id = DeviceId::parse(device)?;
    match fleet.model_for(&id)? {
        Some(bytes) => println!("{}: model present ({} bytes)", id, bytes.len()),
        None => println!("{}: no model", id),
    }
    Ok(())
}
