//! Device Checkpointing
//!
//! Save and restore the trainer state, replay buffer contents and step
//! counters of one device controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::error::{HadesError, Result};
use crate::persistence::files::{read_optional, write_atomic};
use crate::rl::memory::Transition;
use crate::validation::DeviceId;

/// Current on-disk checkpoint layout
pub const CHECKPOINT_VERSION: u32 = 1;

/// Everything needed to resume a device's learning loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCheckpoint {
    pub device_id: DeviceId,
    pub global_step: u64,
    pub training_cycles: u64,
    /// Opaque trainer snapshot
    pub trainer: serde_json::Value,
    /// Replay buffer, oldest first
    pub transitions: Vec<Transition>,
    pub saved_at: DateTime<Utc>,
    pub version: u32,
}

/// Identity of the file on disk at one point in time
///
/// Equal fingerprints mean nobody rewrote the checkpoint in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointFingerprint {
    modified: SystemTime,
    len: u64,
}

/// Checkpoint file handle for one device
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a checkpoint exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Stat the checkpoint file; `None` when it does not exist
    pub fn fingerprint(&self) -> Option<CheckpointFingerprint> {
        let metadata = std::fs::metadata(&self.path).ok()?;
        Some(CheckpointFingerprint {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }

    /// Save a checkpoint, replacing any previous one
    pub fn save(&self, checkpoint: &DeviceCheckpoint) -> Result<()> {
        let bytes = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.path, &bytes)?;

        debug!(
            device = %checkpoint.device_id,
            global_step = checkpoint.global_step,
            path = %self.path.display(),
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Load the checkpoint if one has been written
    pub fn restore_if_exists(&self) -> Result<Option<DeviceCheckpoint>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let checkpoint: DeviceCheckpoint = serde_json::from_slice(&bytes)
            .map_err(|e| HadesError::persistence(&self.path, format!("corrupt checkpoint: {}", e)))?;

        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(HadesError::persistence(
                &self.path,
                format!(
                    "checkpoint version {} is newer than supported {}",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
            ));
        }

        info!(
            device = %checkpoint.device_id,
            global_step = checkpoint.global_step,
            transitions = checkpoint.transitions.len(),
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }
}
