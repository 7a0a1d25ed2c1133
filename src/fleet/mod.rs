//! Fleet management
//!
//! One [`DeviceController`] per sensor device, held in the
//! [`FleetOrchestrator`] registry.

pub mod controller;
pub mod orchestrator;
pub mod paths;

pub use controller::{Decision, DeviceController};
pub use orchestrator::{FleetOrchestrator, SharedController, TrainerFactory};
pub use paths::DevicePaths;
