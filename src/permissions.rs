//! Platform authorization seam.
//!
//! Scanning for and connecting to BLE devices requires platform
//! authorization (location or Bluetooth permissions, depending on the
//! OS). Prompting the user is the embedding application's job; the
//! session owner only queries this trait and refuses to scan when the
//! answer is no.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Query point for the platform's scan/connect authorization state.
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    /// Whether authorization is currently granted.
    async fn is_granted(&self) -> bool;
}

/// Permission check for platforms where authorization is ambient.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionCheck for AlwaysGranted {
    async fn is_granted(&self) -> bool {
        true
    }
}

/// Refuse with [`Error::PermissionDenied`] unless authorization is granted.
pub async fn ensure_granted(check: &dyn PermissionCheck) -> Result<()> {
    if check.is_granted().await {
        Ok(())
    } else {
        Err(Error::PermissionDenied)
    }
}
