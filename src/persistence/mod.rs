//! Persistence module
//!
//! File-backed storage for per-device state snapshots and exported models.
//! Everything is written atomically through [`files::write_atomic`].

pub mod files;
pub mod model_store;
pub mod snapshot;

pub use model_store::{ModelStore, MODEL_EXTENSION};
pub use snapshot::{SnapshotStats, SnapshotStore, StateSnapshot};
