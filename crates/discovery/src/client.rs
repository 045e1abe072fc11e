use std::net::IpAddr;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, trace};

use crate::DiscoveryError;
use crate::types::{DiscoveredDevice, SERVICE_NAME, TXT_NAME, TXT_UNIQUE_IDENTIFIER};

/// Finds media-remote devices on the local network via mDNS/DNS-SD.
#[derive(Debug, Clone)]
pub struct Client {
    service_type: String,
}

impl Client {
    /// Creates a client browsing the default media-remote service type.
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Creates a client browsing a custom service type (without `.local.`).
    pub fn with_service(service: &str) -> Self {
        Self {
            service_type: format!("{service}.local."),
        }
    }

    /// Performs a one-time mDNS query and returns every device seen
    /// within `window`.
    pub async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        self.scan(None, window).await
    }

    /// Performs a bounded scan.
    ///
    /// With a `uid`, only that device is returned and the scan ends as soon
    /// as it resolves. An empty result means nothing matched in time.
    pub async fn scan(
        &self,
        uid: Option<&str>,
        window: Duration,
    ) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;

        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Mdns(format!("failed to browse mDNS: {e}")))?;

        let mut devices = Vec::new();
        let deadline = Instant::now() + window;

        while Instant::now() < deadline {
            match tokio::time::timeout(
                deadline.saturating_duration_since(Instant::now()),
                tokio::task::spawn_blocking({
                    let receiver = receiver.clone();
                    move || receiver.recv_timeout(Duration::from_millis(100))
                }),
            )
            .await
            {
                Ok(Ok(Ok(event))) => {
                    let Some(device) = device_from_event(&event) else {
                        continue;
                    };
                    if uid.is_some_and(|uid| uid != device.uid) {
                        trace!(uid = %device.uid, "ignoring non-matching device");
                        continue;
                    }
                    merge_device(&mut devices, device);
                    if uid.is_some() {
                        break;
                    }
                }
                _ => {
                    // Timeout or error, keep going until the deadline.
                    if Instant::now() >= deadline {
                        break;
                    }
                }
            }
        }

        let _ = daemon.shutdown();
        debug!(found = devices.len(), filter = ?uid, "mDNS scan finished");
        Ok(devices)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a resolved mDNS event into a device.
fn device_from_event(event: &ServiceEvent) -> Option<DiscoveredDevice> {
    let ServiceEvent::ServiceResolved(info) = event else {
        return None;
    };
    Some(device_from_info(info))
}

fn device_from_info(info: &ServiceInfo) -> DiscoveredDevice {
    let mut uid = String::new();
    let mut name = String::new();

    for property in info.get_properties().iter() {
        match property.key() {
            TXT_UNIQUE_IDENTIFIER => uid = property.val_str().to_string(),
            TXT_NAME => name = property.val_str().to_string(),
            _ => {}
        }
    }

    if uid.is_empty() {
        uid = info.get_fullname().to_string();
    }
    if name.is_empty() {
        name = instance_name(info.get_fullname()).to_string();
    }

    // Skip loopback and link-local.
    let ips: Vec<IpAddr> = info
        .get_addresses()
        .iter()
        .filter_map(|ip| {
            let IpAddr::V4(ip4) = ip else {
                return None;
            };
            let octets = ip4.octets();
            if octets[0] == 127 || (octets[0] == 169 && octets[1] == 254) {
                return None;
            }
            Some(IpAddr::V4(*ip4))
        })
        .collect();

    DiscoveredDevice {
        uid,
        name,
        host: info.get_hostname().to_string(),
        port: info.get_port(),
        ips,
    }
}

/// `Living Room._mediaremotetv._tcp.local.` -> `Living Room`.
fn instance_name(fullname: &str) -> &str {
    fullname.split('.').next().unwrap_or(fullname)
}

/// Adds a device or refreshes the entry with the same uid.
fn merge_device(devices: &mut Vec<DiscoveredDevice>, device: DiscoveredDevice) {
    match devices.iter_mut().find(|d| d.uid == device.uid) {
        Some(existing) => *existing = device,
        None => devices.push(device),
    }
}
