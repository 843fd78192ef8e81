//! BLE scanning functionality.
//!
//! Provides the single-shot scanner that hunts for one named sensor.

use btleplug::api::{Central, Manager as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::ble::uuids::SENSOR_DEVICE_NAME;
use crate::error::{Error, Result};

/// Criteria selecting which advertisement to act on.
///
/// Matches by exact, case-sensitive device-name equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    name: String,
}

impl DeviceFilter {
    /// Create a filter for the given advertised device name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The device name this filter accepts.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check an advertised local name against the filter.
    pub fn matches(&self, advertised: Option<&str>) -> bool {
        advertised == Some(self.name.as_str())
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(SENSOR_DEVICE_NAME)
    }
}

/// One-shot claim over the first matching advertisement.
///
/// The scan acts on exactly one advertisement per session; once claimed,
/// every later advertisement is ignored without evaluation.
#[derive(Debug, Default)]
pub(crate) struct MatchLatch {
    claimed: AtomicBool,
}

impl MatchLatch {
    /// Claim the latch. Returns true for the first caller only.
    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Re-arm the latch for a new scan session.
    pub(crate) fn reset(&self) {
        self.claimed.store(false, Ordering::SeqCst);
    }

    /// Check whether a match has been claimed.
    pub(crate) fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

/// BLE scanner for discovering the target sensor.
///
/// Owns the scanning flag, the active device filter and the single-shot
/// match latch. Adapter events are consumed by the session driver, which
/// asks this type whether an advertisement wins the scan.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Filter applied to incoming advertisements.
    filter: RwLock<DeviceFilter>,
    /// Whether scanning is currently active.
    is_scanning: RwLock<bool>,
    /// First-match latch for the current scan session.
    latch: MatchLatch,
}

impl BleScanner {
    /// Create a new BLE scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            filter: RwLock::new(DeviceFilter::default()),
            is_scanning: RwLock::new(false),
            latch: MatchLatch::default(),
        }
    }

    /// Start scanning for the device named by `filter`.
    ///
    /// The platform scan runs unfiltered; name matching happens here
    /// because not every backend can filter by local name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanFailed`] if the platform refuses to scan.
    pub async fn start_scan(&self, filter: DeviceFilter) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for \"{}\"", filter.name());

        self.latch.reset();
        *self.filter.write() = filter;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::ScanFailed {
                reason: e.to_string(),
            })?;

        *self.is_scanning.write() = true;

        Ok(())
    }

    /// Stop scanning. Idempotent.
    pub async fn stop_scan(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Decide whether an advertisement wins the current scan session.
    ///
    /// True exactly once per session: the first advertisement whose local
    /// name passes the filter while scanning is active claims the latch.
    pub(crate) fn claim_match(&self, advertised_name: Option<&str>) -> bool {
        if !*self.is_scanning.read() || self.latch.is_claimed() {
            return false;
        }
        if !self.filter.read().matches(advertised_name) {
            return false;
        }
        self.latch.try_claim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_exact_name_equality() {
        let filter = DeviceFilter::new("MJ_HT_V1");

        assert!(filter.matches(Some("MJ_HT_V1")));
        assert!(!filter.matches(Some("MJ_HT_V2")));
        assert!(!filter.matches(Some("mj_ht_v1")));
        assert!(!filter.matches(Some("MJ_HT_V1 ")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_default_filter_targets_sensor_name() {
        assert_eq!(DeviceFilter::default().name(), "MJ_HT_V1");
    }

    #[test]
    fn test_latch_claims_once() {
        let latch = MatchLatch::default();

        assert!(!latch.is_claimed());
        assert!(latch.try_claim());
        assert!(latch.is_claimed());

        // Every later advertisement loses.
        assert!(!latch.try_claim());
        assert!(!latch.try_claim());
    }

    #[test]
    fn test_latch_reset_rearms() {
        let latch = MatchLatch::default();
        assert!(latch.try_claim());

        latch.reset();
        assert!(!latch.is_claimed());
        assert!(latch.try_claim());
    }
}
