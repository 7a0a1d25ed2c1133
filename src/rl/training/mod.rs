//! Training Infrastructure
//!
//! The trainer capability, per-device statistics and checkpointing.

pub mod checkpointing;
pub mod trainer;

pub use checkpointing::{CheckpointFingerprint, Checkpointer, DeviceCheckpoint, CHECKPOINT_VERSION};
#[cfg(test)]
pub use trainer::MockTrainer;
pub use trainer::{Trainer, TrainingStats};
