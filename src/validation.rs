/// Input validation for data arriving from the transport layer
///
/// Device identities double as file names for snapshots, checkpoints and
/// models, so nothing is allowed past this module unless it is a well-formed
/// hardware address.
use crate::error::{HadesError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Colon separated, dash separated, or bare hex; one separator style only.
static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9a-f]{2}(?::[0-9a-f]{2}){5}|[0-9a-f]{2}(?:-[0-9a-f]{2}){5}|[0-9a-f]{12})$",
    )
    .expect("MAC pattern is a valid regex")
});

/// Validate a hardware (MAC) address
///
/// # Arguments
/// * `mac` - Address as received, any letter case
///
/// # Returns
/// * `true` if the address is well formed
pub fn verify_mac(mac: &str) -> bool {
    MAC_PATTERN.is_match(&mac.to_ascii_lowercase())
}

/// Validate a measurement reading (must be a finite number)
pub fn validate_measurement(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(HadesError::Validation(format!(
            "Measurement must be finite: {}",
            value
        )));
    }
    Ok(())
}

/// Stable identity of a sensor device
///
/// Always stored in canonical form: upper case, colon separated
/// (`AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate and canonicalise a device address
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if !verify_mac(trimmed) {
            return Err(HadesError::Validation(format!(
                "MAC address ({}) is invalid",
                raw
            )));
        }

        let hex: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let canonical = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":");

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = HadesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl std::str::FromStr for DeviceId {
    type Err = HadesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
