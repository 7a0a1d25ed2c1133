use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rl::algorithms::QLearningConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: EnvironmentConfig,
    pub training: TrainingConfig,
    pub q_learning: QLearningConfig,
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Reward shaping and state persistence for each device environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Delta threshold separating acceptable from out-of-bounds volatility
    pub boundary: f64,
    /// Discount factor returned with every step
    pub discount: f64,
    /// Send interval (minutes) for a device seen for the first time
    pub initial_send_interval: u32,
    /// Persist the state snapshot every N steps
    pub snapshot_every: u64,
    /// Band below the boundary in which the interval is left alone
    pub comfort_margin: f64,
    /// Margin below the boundary required before the interval may grow
    pub growth_margin: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            boundary: 3.0,
            discount: 0.5,
            initial_send_interval: 1,
            snapshot_every: 2,
            comfort_margin: 0.7,
            growth_margin: 0.5,
        }
    }
}

/// Experience collection and training cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Replay buffer capacity per device
    pub buffer_capacity: usize,
    /// Number of windows sampled per training cycle
    pub batch_size: usize,
    /// Consecutive transitions per window
    pub window_length: usize,
    /// Run a training cycle every N observations
    pub train_every: u64,
    /// Export the policy every N training cycles
    pub export_every: u64,
    /// Save the checkpoint every N training cycles
    pub checkpoint_every: u64,
    /// Record one transition from the reset state on the first observation
    pub bootstrap_step: bool,
    /// Upper bound for one trainer call
    pub trainer_timeout_ms: u64,
    /// Upper bound for one export call
    pub export_timeout_ms: u64,
    /// Consecutive failures before escalating to error level
    pub failure_alert_threshold: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100_000,
            batch_size: 2,
            window_length: 2,
            train_every: 1,
            export_every: 1,
            checkpoint_every: 1,
            bootstrap_step: true,
            trainer_timeout_ms: 5_000,
            export_timeout_ms: 5_000,
            failure_alert_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Per-device environment snapshots
    pub state_dir: PathBuf,
    /// Per-device trainer/buffer checkpoints
    pub checkpoint_dir: PathBuf,
    /// Per-device exported model artifacts
    pub model_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("states"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl StorageConfig {
    /// Storage rooted under a single directory (used by tests and `--data-dir`)
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            state_dir: root.join("states"),
            checkpoint_dir: root.join("checkpoints"),
            model_dir: root.join("models"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// First segment of inbound topics (e.g. `hades/<net>/<mac>/statistics`)
    pub topic_prefix: String,
    /// First segment of outbound topics (e.g. `node/<net>/<mac>/hades/...`)
    pub reply_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "hades".to_string(),
            reply_prefix: "node".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily rotated log files (console only when unset)
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,hades=debug".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config", None)
    }

    /// Load configuration from a specific directory, optionally layering an
    /// explicit file on top
    pub fn load_from<P: AsRef<Path>>(
        config_dir: P,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HADES_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            );

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables (HADES_TRAINING__BATCH_SIZE, etc.)
        builder = builder.add_source(
            Environment::with_prefix("HADES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let env = &self.environment;
        let training = &self.training;

        if !(env.boundary.is_finite() && env.boundary > 0.0) {
            errors.push(format!("environment.boundary must be positive: {}", env.boundary));
        }

        if !(0.0..=1.0).contains(&env.discount) {
            errors.push(format!("environment.discount must be within [0, 1]: {}", env.discount));
        }

        if env.initial_send_interval < 1 {
            errors.push("environment.initial_send_interval must be at least 1".to_string());
        }

        if env.snapshot_every == 0 {
            errors.push("environment.snapshot_every must be at least 1".to_string());
        }

        if env.comfort_margin < 0.0 || env.growth_margin < 0.0 {
            errors.push("environment margins cannot be negative".to_string());
        }

        if training.buffer_capacity == 0 {
            errors.push("training.buffer_capacity must be positive".to_string());
        }

        if training.batch_size == 0 || training.window_length == 0 {
            errors.push("training.batch_size and training.window_length must be positive".to_string());
        }

        if training.window_length > training.buffer_capacity {
            errors.push(format!(
                "training.window_length ({}) exceeds training.buffer_capacity ({})",
                training.window_length, training.buffer_capacity
            ));
        }

        if training.train_every == 0 || training.export_every == 0 || training.checkpoint_every == 0 {
            errors.push(
                "training.train_every, export_every and checkpoint_every must be at least 1"
                    .to_string(),
            );
        }

        if training.trainer_timeout_ms == 0 || training.export_timeout_ms == 0 {
            errors.push("training timeouts must be positive".to_string());
        }

        errors.extend(self.q_learning.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
