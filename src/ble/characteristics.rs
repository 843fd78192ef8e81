//! GATT characteristic handling.
//!
//! Notification arming, write-type policy and the battery level read for
//! the MJ_HT_V1 sensor.

use btleplug::api::{CharPropFlags, Characteristic, Descriptor, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use tracing::{debug, error};

use crate::ble::uuids::{
    BATTERY_LEVEL_CHARACTERISTIC_UUID, BATTERY_SERVICE_UUID, CCC_DESCRIPTOR_UUID,
};
use crate::error::{Error, Result};
use uuid::Uuid;

/// CCC payload enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCC payload enabling indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
/// CCC payload disabling both delivery modes.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Delivery mode for asynchronous characteristic updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Unacknowledged value updates.
    Notification,
    /// Peer-acknowledged value updates.
    Indication,
}

impl DeliveryMode {
    /// The CCC payload that enables this mode.
    pub fn enable_payload(&self) -> [u8; 2] {
        match self {
            Self::Notification => ENABLE_NOTIFICATION_VALUE,
            Self::Indication => ENABLE_INDICATION_VALUE,
        }
    }
}

/// Pick the delivery mode for a characteristic.
///
/// Indication takes priority over notification when both are supported.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCapability`] when the characteristic
/// supports neither.
pub fn select_delivery_mode(characteristic: &Characteristic) -> Result<DeliveryMode> {
    if characteristic.properties.contains(CharPropFlags::INDICATE) {
        Ok(DeliveryMode::Indication)
    } else if characteristic.properties.contains(CharPropFlags::NOTIFY) {
        Ok(DeliveryMode::Notification)
    } else {
        Err(Error::UnsupportedCapability {
            uuid: characteristic.uuid.to_string(),
        })
    }
}

/// Pick the write type for a characteristic.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCapability`] when the characteristic is not
/// writable at all.
pub fn select_write_type(characteristic: &Characteristic) -> Result<WriteType> {
    if characteristic.properties.contains(CharPropFlags::WRITE) {
        Ok(WriteType::WithResponse)
    } else if characteristic
        .properties
        .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
    {
        Ok(WriteType::WithoutResponse)
    } else {
        Err(Error::UnsupportedCapability {
            uuid: characteristic.uuid.to_string(),
        })
    }
}

/// Locate the Client Characteristic Configuration descriptor.
///
/// # Errors
///
/// Returns [`Error::MissingDescriptor`] when the characteristic does not
/// carry one.
pub fn find_ccc_descriptor(characteristic: &Characteristic) -> Result<Descriptor> {
    characteristic
        .descriptors
        .iter()
        .find(|d| d.uuid == CCC_DESCRIPTOR_UUID)
        .cloned()
        .ok_or_else(|| Error::MissingDescriptor {
            uuid: characteristic.uuid.to_string(),
        })
}

/// Look up a characteristic by service and characteristic UUID.
///
/// Services must have been discovered on the peripheral first.
pub fn find_characteristic(
    peripheral: &Peripheral,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Result<Characteristic> {
    let service = peripheral
        .services()
        .into_iter()
        .find(|s| s.uuid == service_uuid)
        .ok_or_else(|| Error::ServiceNotFound {
            uuid: service_uuid.to_string(),
        })?;

    service
        .characteristics
        .into_iter()
        .find(|c| c.uuid == characteristic_uuid)
        .ok_or_else(|| Error::CharacteristicNotFound {
            uuid: characteristic_uuid.to_string(),
        })
}

/// Enable value-change delivery on a characteristic.
///
/// Registers local delivery first; only if that succeeds is the enable
/// payload written to the CCC descriptor. A local failure aborts before
/// the descriptor write.
pub async fn enable_notifications(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
) -> Result<()> {
    let mode = select_delivery_mode(characteristic)?;
    let descriptor = find_ccc_descriptor(characteristic)?;

    peripheral
        .subscribe(characteristic)
        .await
        .map_err(|e| {
            error!(
                "local notification registration failed for {}: {}",
                characteristic.uuid, e
            );
            Error::Bluetooth(e)
        })?;

    peripheral
        .write_descriptor(&descriptor, &mode.enable_payload())
        .await
        .map_err(Error::Bluetooth)?;

    debug!(
        "enabled {:?} delivery on {}",
        mode, characteristic.uuid
    );

    Ok(())
}

/// Disable value-change delivery on a characteristic.
///
/// Symmetric teardown: local deregistration, then the disable payload.
pub async fn disable_notifications(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
) -> Result<()> {
    // Still validates capability and descriptor presence, like the enable path.
    select_delivery_mode(characteristic)?;
    let descriptor = find_ccc_descriptor(characteristic)?;

    peripheral
        .unsubscribe(characteristic)
        .await
        .map_err(|e| {
            error!(
                "local notification deregistration failed for {}: {}",
                characteristic.uuid, e
            );
            Error::Bluetooth(e)
        })?;

    peripheral
        .write_descriptor(&descriptor, &DISABLE_NOTIFICATION_VALUE)
        .await
        .map_err(Error::Bluetooth)?;

    debug!("disabled delivery on {}", characteristic.uuid);

    Ok(())
}

/// Write a payload to a characteristic with the appropriate write type.
pub async fn write_characteristic(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
    payload: &[u8],
) -> Result<()> {
    let write_type = select_write_type(characteristic)?;

    peripheral
        .write(characteristic, payload, write_type)
        .await
        .map_err(Error::Bluetooth)?;

    debug!(
        "wrote {} bytes to characteristic {}",
        payload.len(),
        characteristic.uuid
    );

    Ok(())
}

/// Read the raw battery level byte from the standard battery service.
///
/// Refused unless the characteristic advertises readability.
pub async fn read_battery_level(peripheral: &Peripheral) -> Result<Vec<u8>> {
    let characteristic = find_characteristic(
        peripheral,
        BATTERY_SERVICE_UUID,
        BATTERY_LEVEL_CHARACTERISTIC_UUID,
    )?;

    if !characteristic.properties.contains(CharPropFlags::READ) {
        return Err(Error::UnsupportedCapability {
            uuid: characteristic.uuid.to_string(),
        });
    }

    peripheral
        .read(&characteristic)
        .await
        .map_err(Error::Bluetooth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::{ENV_SENSOR_CHARACTERISTIC_UUID, ENV_SENSOR_SERVICE_UUID};
    use std::collections::BTreeSet;

    fn characteristic(properties: CharPropFlags, with_ccc: bool) -> Characteristic {
        let mut descriptors = BTreeSet::new();
        if with_ccc {
            descriptors.insert(Descriptor {
                uuid: CCC_DESCRIPTOR_UUID,
                service_uuid: ENV_SENSOR_SERVICE_UUID,
                characteristic_uuid: ENV_SENSOR_CHARACTERISTIC_UUID,
            });
        }
        Characteristic {
            uuid: ENV_SENSOR_CHARACTERISTIC_UUID,
            service_uuid: ENV_SENSOR_SERVICE_UUID,
            properties,
            descriptors,
        }
    }

    #[test]
    fn test_indication_preferred_over_notification() {
        let both = characteristic(CharPropFlags::NOTIFY | CharPropFlags::INDICATE, true);
        assert_eq!(select_delivery_mode(&both).unwrap(), DeliveryMode::Indication);

        let notify_only = characteristic(CharPropFlags::NOTIFY, true);
        assert_eq!(
            select_delivery_mode(&notify_only).unwrap(),
            DeliveryMode::Notification
        );
    }

    #[test]
    fn test_neither_mode_is_unsupported() {
        let read_only = characteristic(CharPropFlags::READ, true);
        assert!(matches!(
            select_delivery_mode(&read_only),
            Err(Error::UnsupportedCapability { .. })
        ));
    }

    #[test]
    fn test_enable_payloads() {
        assert_eq!(DeliveryMode::Notification.enable_payload(), [0x01, 0x00]);
        assert_eq!(DeliveryMode::Indication.enable_payload(), [0x02, 0x00]);
        assert_eq!(DISABLE_NOTIFICATION_VALUE, [0x00, 0x00]);
    }

    #[test]
    fn test_ccc_descriptor_lookup() {
        let with = characteristic(CharPropFlags::NOTIFY, true);
        let descriptor = find_ccc_descriptor(&with).unwrap();
        assert_eq!(descriptor.uuid, CCC_DESCRIPTOR_UUID);

        let without = characteristic(CharPropFlags::NOTIFY, false);
        assert!(matches!(
            find_ccc_descriptor(&without),
            Err(Error::MissingDescriptor { .. })
        ));
    }

    #[test]
    fn test_write_type_selection() {
        let writable = characteristic(
            CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE,
            false,
        );
        assert!(matches!(
            select_write_type(&writable),
            Ok(WriteType::WithResponse)
        ));

        let no_response_only = characteristic(CharPropFlags::WRITE_WITHOUT_RESPONSE, false);
        assert!(matches!(
            select_write_type(&no_response_only),
            Ok(WriteType::WithoutResponse)
        ));

        let read_only = characteristic(CharPropFlags::READ, false);
        assert!(matches!(
            select_write_type(&read_only),
            Err(Error::UnsupportedCapability { .. })
        ));
    }
}
