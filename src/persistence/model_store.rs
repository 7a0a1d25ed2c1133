//! Exported model artifacts, one opaque file per device

use std::path::{Path, PathBuf};
use tracing::info;

use super::files::{read_optional, write_atomic};
use crate::error::Result;
use crate::validation::DeviceId;

/// Model artifact extension
pub const MODEL_EXTENSION: &str = "model";

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, device: &DeviceId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", device.as_str(), MODEL_EXTENSION))
    }

    pub fn exists(&self, device: &DeviceId) -> bool {
        self.path_for(device).exists()
    }

    pub fn write(&self, device: &DeviceId, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(device);
        write_atomic(&path, bytes)?;
        info!(device = %device, bytes = bytes.len(), path = %path.display(), "Exported model");
        Ok(path)
    }

    pub fn read(&self, device: &DeviceId) -> Result<Option<Vec<u8>>> {
        read_optional(&self.path_for(device))
    }
}
