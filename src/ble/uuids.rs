//! BLE Service, Characteristic and Descriptor UUIDs.
//!
//! Contains all UUID constants used for MJ_HT_V1 sensor communication.

use uuid::Uuid;

/// Advertised device name of the Xiaomi Mijia temperature/humidity sensor.
pub const SENSOR_DEVICE_NAME: &str = "MJ_HT_V1";

// Environment Sensing (Xiaomi Custom)
/// Xiaomi environment sensing service UUID.
pub const ENV_SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x226c_0000_6476_4566_7562_66734470666d);
/// Xiaomi environment sensing characteristic UUID (Notify).
///
/// Value payloads are ASCII strings of the form `T=23.5 H=45.0 `.
pub const ENV_SENSOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x226c_aa55_6476_4566_7562_66734470666d);

// Battery Service (Standard BLE)
/// Standard BLE Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID (Read).
pub const BATTERY_LEVEL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration descriptor UUID, written to enable
/// or disable notifications/indications on a characteristic.
pub const CCC_DESCRIPTOR_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is the Xiaomi environment sensing service.
pub fn is_env_sensor_service(uuid: &Uuid) -> bool {
    *uuid == ENV_SENSOR_SERVICE_UUID
}

/// Check if a characteristic UUID carries sensor value payloads.
pub fn is_env_sensor_characteristic(uuid: &Uuid) -> bool {
    *uuid == ENV_SENSOR_CHARACTERISTIC_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        let env_service = ENV_SENSOR_SERVICE_UUID.to_string();
        assert_eq!(env_service, "226c0000-6476-4566-7562-66734470666d");

        let env_char = ENV_SENSOR_CHARACTERISTIC_UUID.to_string();
        assert_eq!(env_char, "226caa55-6476-4566-7562-66734470666d");

        let ccc = CCC_DESCRIPTOR_UUID.to_string();
        assert_eq!(ccc, "00002902-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_battery_uuids() {
        assert!(BATTERY_SERVICE_UUID.to_string().contains("180f"));
        assert!(BATTERY_LEVEL_CHARACTERISTIC_UUID.to_string().contains("2a19"));
    }

    #[test]
    fn test_is_env_sensor_service() {
        assert!(is_env_sensor_service(&ENV_SENSOR_SERVICE_UUID));
        assert!(!is_env_sensor_service(&BATTERY_SERVICE_UUID));
    }

    #[test]
    fn test_is_env_sensor_characteristic() {
        assert!(is_env_sensor_characteristic(&ENV_SENSOR_CHARACTERISTIC_UUID));
        assert!(!is_env_sensor_characteristic(&BATTERY_LEVEL_CHARACTERISTIC_UUID));
    }
}
