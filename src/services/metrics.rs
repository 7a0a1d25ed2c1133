use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fleet-wide counters for observability
#[derive(Debug)]
pub struct FleetMetrics {
    /// Observations routed to a controller
    pub observations: AtomicU64,
    /// Observations rejected by validation
    pub rejected: AtomicU64,
    /// Devices registered
    pub devices_registered: AtomicU64,
    /// Successful training cycles
    pub training_cycles: AtomicU64,
    /// Cycles skipped for lack of experience
    pub skipped_cycles: AtomicU64,
    /// Trainer errors and timeouts
    pub trainer_failures: AtomicU64,
    /// Export errors and timeouts
    pub export_failures: AtomicU64,
    pub checkpoints_saved: AtomicU64,
    pub models_exported: AtomicU64,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub observations: u64,
    pub rejected: u64,
    pub devices_registered: u64,
    pub training_cycles: u64,
    pub skipped_cycles: u64,
    pub trainer_failures: u64,
    pub export_failures: u64,
    pub checkpoints_saved: u64,
    pub models_exported: u64,
}

impl FleetMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            observations: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            devices_registered: AtomicU64::new(0),
            training_cycles: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            trainer_failures: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
            checkpoints_saved: AtomicU64::new(0),
            models_exported: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn inc_observations(&self) {
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_devices_registered(&self) {
        self.devices_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_training_cycles(&self) {
        self.training_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_cycles(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trainer_failures(&self) {
        self.trainer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_export_failures(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_checkpoints_saved(&self) {
        self.checkpoints_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_models_exported(&self) {
        self.models_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            observations: self.observations.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            devices_registered: self.devices_registered.load(Ordering::Relaxed),
            training_cycles: self.training_cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            trainer_failures: self.trainer_failures.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
            checkpoints_saved: self.checkpoints_saved.load(Ordering::Relaxed),
            models_exported: self.models_exported.load(Ordering::Relaxed),
        }
    }

    /// Get current metrics as a formatted string
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        let uptime = Utc::now().signed_duration_since(self.started_at);

        format!(
            r#"
=== HADES FLEET STATUS ===
Uptime: {}s | Devices: {}
Observations: {} | Rejected: {}
Training: {} cycles | {} skipped | {} failed
Checkpoints: {} | Models: {} | Export failures: {}
==========================
"#,
            uptime.num_seconds(),
            s.devices_registered,
            s.observations,
            s.rejected,
            s.training_cycles,
            s.skipped_cycles,
            s.trainer_failures,
            s.checkpoints_saved,
            s.models_exported,
            s.export_failures,
        )
    }
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}
