pub mod client;
pub mod types;

// Re-export primary types.
pub use client::Client;
pub use types::{DiscoveredDevice, SERVICE_NAME, TXT_NAME, TXT_UNIQUE_IDENTIFIER};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),
}
