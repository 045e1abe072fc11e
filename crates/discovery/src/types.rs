use std::net::IpAddr;

use atvlink_protocol::DeviceSummary;
use serde::{Deserialize, Serialize};

/// mDNS service type advertised by media-remote devices.
pub const SERVICE_NAME: &str = "_mediaremotetv._tcp";

/// TXT record key carrying the device unique identifier.
pub const TXT_UNIQUE_IDENTIFIER: &str = "UniqueIdentifier";

/// TXT record key carrying the device display name.
pub const TXT_NAME: &str = "Name";

/// A device found by a bounded scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub uid: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub ips: Vec<IpAddr>,
}

impl DiscoveredDevice {
    /// Returns the address (IP:port or host:port) for connecting to the device.
    pub fn address(&self) -> String {
        if let Some(ip) = self.ips.first() {
            format!("{ip}:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The `{ name, uid }` entry handed to discovery listings.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }
}
