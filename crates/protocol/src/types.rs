use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Arbitrary key/value payload republished as a `message` event.
pub type Payload = serde_json::Value;

/// Which backend protocol a configured device is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Push-style backend: connect/message/close/error events.
    Native,
    /// Poll-style backend: periodic update/error events.
    Poll,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Poll => write!(f, "poll"),
        }
    }
}

/// Severity of a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Ok,
    Error,
}

/// How a poll-backend device is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum PollAddress {
    Host(IpAddr),
    Mac(String),
    Id(String),
}

impl PollAddress {
    /// Classifies a configured identifier as an IP host, a MAC address,
    /// or an opaque device id.
    pub fn classify(identifier: &str) -> Self {
        let identifier = identifier.trim();
        if let Ok(ip) = identifier.parse::<IpAddr>() {
            return PollAddress::Host(ip);
        }
        if is_mac_address(identifier) {
            return PollAddress::Mac(identifier.to_ascii_uppercase());
        }
        PollAddress::Id(identifier.to_string())
    }
}

impl fmt::Display for PollAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollAddress::Host(ip) => write!(f, "{ip}"),
            PollAddress::Mac(mac) => write!(f, "{mac}"),
            PollAddress::Id(id) => write!(f, "{id}"),
        }
    }
}

fn is_mac_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split([':', '-']).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A poll-backend device: address plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDeviceRef {
    pub address: PollAddress,
    pub name: String,
}

/// Identifies a physical device. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "backend")]
pub enum DeviceRef {
    Native { unique_identifier: String },
    Poll(PollDeviceRef),
}

impl DeviceRef {
    /// Human-readable label used in logs.
    pub fn label(&self) -> String {
        match self {
            DeviceRef::Native { unique_identifier } => unique_identifier.clone(),
            DeviceRef::Poll(p) => format!("{} ({})", p.name, p.address),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            DeviceRef::Native { .. } => BackendKind::Native,
            DeviceRef::Poll(_) => BackendKind::Poll,
        }
    }
}
