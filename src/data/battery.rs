//! Battery level data.
//!
//! The sensor exposes the standard battery service; the level
//! characteristic is a single percentage byte.

use crate::error::{Error, Result};

/// Battery charge below this is considered low.
pub const LOW_BATTERY_THRESHOLD: u8 = 15;

/// Battery charge as a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    /// Create a battery level, clamping to 100%.
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    /// Parse the battery level characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] on an empty payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw = data.first().ok_or_else(|| Error::InvalidData {
            context: "empty battery level payload".to_string(),
        })?;
        Ok(Self::new(*raw))
    }

    /// The charge percentage (0-100).
    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Check if the battery is low.
    pub fn is_low(&self) -> bool {
        self.0 < LOW_BATTERY_THRESHOLD
    }
}

impl std::fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
