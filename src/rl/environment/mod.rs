//! Device Environments
//!
//! One environment per sensor device, stepping the send-interval state
//! machine on each new measurement.

mod sensor;

pub use sensor::{DeviceEnvironment, StepResult};
