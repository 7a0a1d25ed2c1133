pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod persistence;
pub mod rl;
pub mod services;
pub mod transport;
pub mod validation;

pub use config::AppConfig;
pub use error::{HadesError, Result};
pub use fleet::{Decision, DeviceController, FleetOrchestrator};
pub use rl::{Action, Reward, Trainer};
pub use services::FleetMetrics;
pub use transport::{MessageHandler, OutboundMessage, Publisher};
pub use validation::DeviceId;
