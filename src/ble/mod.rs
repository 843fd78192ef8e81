//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality
//! for discovering and communicating with the MJ_HT_V1 sensor.

pub mod characteristics;
pub mod scanner;
pub mod session;
pub mod uuids;

pub use characteristics::{disable_notifications, enable_notifications, DeliveryMode};
pub use scanner::{BleScanner, DeviceFilter};
pub use session::{Session, SessionConfig, SessionEvent, SessionState};
pub use uuids::*;
