//! Error types for the mijia-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The platform refused to start or continue a scan.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of the platform-reported scan error.
        reason: String,
    },

    /// Failed to establish a connection to the sensor.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Service discovery on a connected sensor failed.
    #[error("Service discovery failed: {reason}")]
    DiscoveryFailed {
        /// Description of why discovery failed.
        reason: String,
    },

    /// The characteristic supports neither notifications nor indications,
    /// or cannot be written with any supported write type.
    #[error("Characteristic {uuid} does not support the requested capability")]
    UnsupportedCapability {
        /// The UUID of the characteristic in question.
        uuid: String,
    },

    /// The characteristic does not carry the Client Characteristic
    /// Configuration descriptor.
    #[error("Characteristic {uuid} has no CCC descriptor")]
    MissingDescriptor {
        /// The UUID of the characteristic in question.
        uuid: String,
    },

    /// A sensor payload did not contain the expected markers or values.
    #[error("Malformed sensor payload: {context}")]
    MalformedPayload {
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// Operation requires a connection but no transport handle is active.
    #[error("Sensor not connected")]
    NotConnected,

    /// Scanning was refused because the required platform authorization
    /// has not been granted.
    #[error("Bluetooth permission not granted")]
    PermissionDenied,

    /// Invalid data was received from the sensor.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MalformedPayload {
            context: "no T= marker".to_string(),
        };
        assert_eq!(format!("{}", err), "Malformed sensor payload: no T= marker");

        assert_eq!(format!("{}", Error::NotConnected), "Sensor not connected");
        assert_eq!(
            format!("{}", Error::PermissionDenied),
            "Bluetooth permission not granted"
        );
    }

    #[test]
    fn test_error_carries_uuid_context() {
        let err = Error::MissingDescriptor {
            uuid: "226caa55".to_string(),
        };
        assert!(format!("{}", err).contains("226caa55"));
    }
}
