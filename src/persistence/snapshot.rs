//! Environment State Snapshots
//!
//! The per-device JSON file shared with out-of-process writers:
//!
//! ```json
//! {"stats": {"prev_temperature": 20.0, "prev_delta": 0.0,
//!            "curr_temperature": 20.0, "send_interval": 5}}
//! ```
//!
//! Every numeric field is accepted as an integer, a float, or a numeric
//! string. An unset temperature is written as `-999`.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::files::{read_optional, write_atomic};
use crate::error::{HadesError, Result};
use crate::rl::core::{EnvironmentState, UNSET_MEASUREMENT};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Number(f64),
    Text(String),
}

fn number_like<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberLike::deserialize(deserializer)? {
        NumberLike::Number(n) => Ok(n),
        NumberLike::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn interval_like<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = number_like(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("send_interval must be finite"));
    }
    Ok(value.round().clamp(1.0, u32::MAX as f64) as u32)
}

fn unset() -> f64 {
    UNSET_MEASUREMENT
}

fn min_interval() -> u32 {
    1
}

/// The `stats` object of a snapshot file
///
/// Missing fields fall back to "unset" so partially written files from other
/// writers still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStats {
    #[serde(default = "unset", deserialize_with = "number_like")]
    pub prev_temperature: f64,
    #[serde(default, deserialize_with = "number_like")]
    pub prev_delta: f64,
    #[serde(default = "unset", deserialize_with = "number_like")]
    pub curr_temperature: f64,
    #[serde(default = "min_interval", deserialize_with = "interval_like")]
    pub send_interval: u32,
}

/// Persisted per-device environment snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub stats: SnapshotStats,
}

impl StateSnapshot {
    /// Capture the persistable part of an environment state
    pub fn from_state(state: &EnvironmentState) -> Self {
        Self {
            stats: SnapshotStats {
                prev_temperature: state.previous_measurement.unwrap_or(UNSET_MEASUREMENT),
                prev_delta: state.delta,
                curr_temperature: state.current_measurement.unwrap_or(UNSET_MEASUREMENT),
                send_interval: state.send_interval.max(1),
            },
        }
    }

    /// Overlay the snapshot onto in-memory state
    ///
    /// Iteration counters and the episode flag are process-local and left
    /// untouched.
    pub fn apply_to(&self, state: &mut EnvironmentState) {
        let measured = |v: f64| (v != UNSET_MEASUREMENT && v.is_finite()).then_some(v);

        state.previous_measurement = measured(self.stats.prev_temperature);
        state.current_measurement = measured(self.stats.curr_temperature);
        state.delta = if self.stats.prev_delta.is_finite() {
            self.stats.prev_delta.abs()
        } else {
            0.0
        };
        state.send_interval = self.stats.send_interval.max(1);
    }
}

/// File-backed snapshot location for one device
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the snapshot
    ///
    /// # Returns
    /// * `Ok(None)` if no snapshot has been written yet
    /// * `Err(Persistence)` if the file exists but cannot be parsed
    pub fn load(&self) -> Result<Option<StateSnapshot>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HadesError::persistence(&self.path, format!("corrupt snapshot: {}", e)))
    }

    pub fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), "Saved state snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_float_int_and_string_fields() {
        let raw = r#"{"stats": {"prev_temperature": 20, "prev_delta": "0.5",
                     "curr_temperature": 21.5, "send_interval": 5.0}}"#;
        let snapshot: StateSnapshot = serde_json::from_str(raw).unwrap();

        assert_eq!(snapshot.stats.prev_temperature, 20.0);
        assert_eq!(snapshot.stats.prev_delta, 0.5);
        assert_eq!(snapshot.stats.curr_temperature, 21.5);
        assert_eq!(snapshot.stats.send_interval, 5);
    }

    #[test]
    fn test_partial_stats_use_defaults() {
        let raw = r#"{"stats": {"prev_temperature": 20.0, "send_interval": 5}}"#;
        let snapshot: StateSnapshot = serde_json::from_str(raw).unwrap();

        assert_eq!(snapshot.stats.prev_delta, 0.0);
        assert_eq!(snapshot.stats.curr_temperature, UNSET_MEASUREMENT);
        assert_eq!(snapshot.stats.send_interval, 5);
    }

    #[test]
    fn test_send_interval_is_clamped() {
        let raw = r#"{"stats": {"prev_temperature": 1, "prev_delta": 0,
                     "curr_temperature": 1, "send_interval": 0}}"#;
        let snapshot: StateSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.stats.send_interval, 1);
    }

    #[test]
    fn test_unset_sentinel_maps_to_none() {
        let state = EnvironmentState::new(3);
        let snapshot = StateSnapshot::from_state(&state);
        assert_eq!(snapshot.stats.prev_temperature, UNSET_MEASUREMENT);

        let mut restored = EnvironmentState::new(9);
        restored.previous_measurement = Some(4.0);
        snapshot.apply_to(&mut restored);
        assert_eq!(restored.previous_measurement, None);
        assert_eq!(restored.send_interval, 3);
    }

    #[test]
    fn test_store_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("AA:BB:CC:DD:EE:FF"));
        assert!(store.load().unwrap().is_none());

        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(HadesError::Persistence { .. })
        ));
    }

    #[test]
    fn test_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("dev"));

        let mut state = EnvironmentState::new(4);
        state.previous_measurement = Some(22.0);
        state.current_measurement = Some(22.0);
        state.delta = 1.5;

        store.save(&StateSnapshot::from_state(&state)).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, StateSnapshot::from_state(&state));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["stats"]["send_interval"], 4);
    }
}
