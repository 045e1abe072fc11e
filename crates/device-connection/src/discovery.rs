//! Bounded device scans.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

use atvlink_discovery::{Client as DiscoveryClient, DiscoveredDevice};
use atvlink_protocol::DeviceSummary;

use crate::backend::BackendError;

/// Finds devices within a bounded window.
pub trait Scanner: Send + Sync {
    /// Scans for `window`. With a `uid`, only matching devices are returned.
    fn scan<'a>(
        &'a self,
        uid: Option<&'a str>,
        window: Duration,
    ) -> BoxFuture<'a, Result<Vec<DiscoveredDevice>, BackendError>>;
}

impl Scanner for DiscoveryClient {
    fn scan<'a>(
        &'a self,
        uid: Option<&'a str>,
        window: Duration,
    ) -> BoxFuture<'a, Result<Vec<DiscoveredDevice>, BackendError>> {
        Box::pin(async move {
            DiscoveryClient::scan(self, uid, window)
                .await
                .map_err(|e| BackendError::Discovery(e.to_string()))
        })
    }
}

/// Resolves a unique identifier to the first matching device.
pub(crate) async fn locate(
    scanner: &dyn Scanner,
    uid: &str,
    window: Duration,
) -> Result<DiscoveredDevice, BackendError> {
    let devices = scanner.scan(Some(uid), window).await?;
    devices
        .into_iter()
        .find(|d| d.uid == uid)
        .ok_or_else(|| BackendError::DeviceNotFound(uid.to_string()))
}

/// Lists every device seen within `window` as `{ name, uid }` entries.
pub async fn discover_devices(
    scanner: &dyn Scanner,
    window: Duration,
) -> Result<Vec<DeviceSummary>, BackendError> {
    let devices = scanner.scan(None, window).await?;
    debug!(count = devices.len(), "discovery finished");
    Ok(devices.iter().map(DiscoveredDevice::summary).collect())
}
