use std::path::PathBuf;

use crate::config::StorageConfig;
use crate::persistence::MODEL_EXTENSION;
use crate::validation::DeviceId;

/// Deterministic per-device file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    pub state: PathBuf,
    pub checkpoint: PathBuf,
    pub model: PathBuf,
}

impl DevicePaths {
    pub fn for_device(storage: &StorageConfig, device: &DeviceId) -> Self {
        let id = device.as_str();
        Self {
            state: storage.state_dir.join(id),
            checkpoint: storage.checkpoint_dir.join(format!("{}.json", id)),
            model: storage.model_dir.join(format!("{}.{}", id, MODEL_EXTENSION)),
        }
    }
}
