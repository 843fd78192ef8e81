// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # mijia-rust-ble
//!
//! A cross-platform Rust library for streaming temperature and humidity
//! readings from the Xiaomi Mijia `MJ_HT_V1` Bluetooth Low Energy sensor.
//!
//! The library owns the whole single-device session: it scans for the
//! sensor by its advertised name, connects over LE, discovers GATT
//! services, arms value notifications on the environment characteristic,
//! and parses the sensor's ASCII payloads into typed readings. Session
//! state and readings are relayed to an observer over a message-passing
//! bridge, so UI code never holds a reference into the session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mijia_rust_ble::{DeviceManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     manager.start().await?;
//!
//!     let mut readings = manager.subscribe_readings();
//!     manager.start_scan().await?;
//!
//!     while let Ok(update) = readings.recv().await {
//!         println!(
//!             "{:.1}°C {:.1}%RH at {}",
//!             update.reading.temperature_celsius,
//!             update.reading.humidity_percent,
//!             update.received_at,
//!         );
//!     }
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Observer bridge
//!
//! A UI process thread can drive the session without touching it: register
//! a reply channel with [`bridge::Bridge::register_client`], submit
//! [`bridge::Command::StartScan`], and consume
//! [`bridge::UiEvent`] values as they arrive. Only the most recently
//! registered observer receives events; sends with no observer are
//! silently dropped.
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! Where scanning needs an explicit runtime authorization, install a
//! [`permissions::PermissionCheck`] — the manager refuses to scan until
//! it reports granted.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod bridge;
pub mod data;
pub mod device_manager;
pub mod error;
pub mod permissions;
pub mod utils;

// Re-exports for convenience
pub use device_manager::{CallbackHandle, DeviceManager};
pub use error::{Error, Result};
pub use utils::{celsius_to_fahrenheit, dew_point_celsius, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use ble::scanner::DeviceFilter;
pub use ble::session::{SessionConfig, SessionState};
pub use ble::uuids::SENSOR_DEVICE_NAME;
pub use bridge::{Bridge, Command, UiEvent};
pub use data::{BatteryLevel, ReadingUpdate, SensorReading};
pub use permissions::{AlwaysGranted, PermissionCheck};
