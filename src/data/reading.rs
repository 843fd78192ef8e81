//! Sensor payload parsing.
//!
//! The MJ_HT_V1 notifies its environment characteristic with short ASCII
//! strings such as `T=23.5 H=45.0 ` — a temperature field introduced by
//! `T=`, a humidity field introduced by `H=`, and one trailing junk byte
//! (a space, a NUL, or a unit fragment depending on firmware).

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// One parsed temperature/humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    /// Temperature in degrees Celsius.
    pub temperature_celsius: f64,
    /// Relative humidity in percent.
    pub humidity_percent: f64,
}

impl SensorReading {
    /// Create a reading from already-parsed values.
    pub fn new(temperature_celsius: f64, humidity_percent: f64) -> Self {
        Self {
            temperature_celsius,
            humidity_percent,
        }
    }

    /// Parse a raw characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] for non-UTF-8 input or when the
    /// expected markers are absent.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| Error::MalformedPayload {
            context: "payload is not valid UTF-8".to_string(),
        })?;
        Self::parse_payload(text)
    }

    /// Parse the ASCII payload format.
    ///
    /// Temperature is the substring after `T=` up to the next space.
    /// Humidity is the substring after `H=` with the single trailing
    /// device byte dropped, then truncated at the first non-numeric
    /// character — both `H=45.0 ` and `H=45 H%` shapes parse.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] when either marker is missing,
    /// the temperature field is unterminated, or a field is not a decimal
    /// number. Marker lookups are guarded; malformed input never panics.
    pub fn parse_payload(raw: &str) -> Result<Self> {
        let t_start = raw
            .find("T=")
            .map(|i| i + 2)
            .ok_or_else(|| malformed("missing T= marker", raw))?;
        let t_field = &raw[t_start..];
        let t_end = t_field
            .find(' ')
            .ok_or_else(|| malformed("temperature field not terminated", raw))?;
        let temperature = parse_decimal(&t_field[..t_end], "temperature", raw)?;

        let h_start = raw
            .find("H=")
            .map(|i| i + 2)
            .ok_or_else(|| malformed("missing H= marker", raw))?;
        let h_field = &raw[h_start..];
        let mut chars = h_field.chars();
        if chars.next_back().is_none() {
            return Err(malformed("humidity field is empty", raw));
        }
        let h_trimmed = chars.as_str();
        let h_end = h_trimmed
            .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
            .unwrap_or(h_trimmed.len());
        let humidity = parse_decimal(&h_trimmed[..h_end], "humidity", raw)?;

        Ok(Self::new(temperature, humidity))
    }

    /// Encode for transport across the bridge: colon-joined decimals.
    ///
    /// `23.5 / 45.0` encodes to `"23.5:45.0"`; [`Self::decode`] reverses
    /// it exactly for every finite value.
    pub fn encode(&self) -> String {
        format!("{:?}:{:?}", self.temperature_celsius, self.humidity_percent)
    }

    /// Decode the bridge encoding produced by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] when the separator or either
    /// decimal field is missing.
    pub fn decode(encoded: &str) -> Result<Self> {
        let (temperature, humidity) = encoded
            .split_once(':')
            .ok_or_else(|| malformed("missing : separator", encoded))?;

        Ok(Self::new(
            parse_decimal(temperature, "temperature", encoded)?,
            parse_decimal(humidity, "humidity", encoded)?,
        ))
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.1}°C {:.1}%RH",
            self.temperature_celsius, self.humidity_percent
        )
    }
}

/// A reading stamped with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingUpdate {
    /// The parsed measurement.
    pub reading: SensorReading,
    /// When the notification arrived.
    pub received_at: DateTime<Utc>,
}

impl ReadingUpdate {
    /// Stamp a reading with the current time.
    pub fn now(reading: SensorReading) -> Self {
        Self {
            reading,
            received_at: Utc::now(),
        }
    }
}

fn malformed(context: &str, raw: &str) -> Error {
    Error::MalformedPayload {
        context: format!("{context} in {raw:?}"),
    }
}

fn parse_decimal(field: &str, name: &str, raw: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|_| malformed(&format!("{name} is not a decimal number"), raw))
}
