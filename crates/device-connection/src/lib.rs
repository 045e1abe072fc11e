//! Device connection management for media-remote devices.
//!
//! Keeps one configured device connected through a push-style or
//! poll-style backend, with a fixed-delay reconnect and a periodic
//! heartbeat, and runs the PIN pairing flow that produces the native
//! backend's credential.

mod backend;
pub mod config;
mod discovery;
pub(crate) mod heartbeat;
pub mod manager;
pub mod pairing;
pub mod pin_relay;
pub(crate) mod reconnection;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    Backend, BackendError, PinCallback, PollEvent, PollHandle, PollTransport, PushChannel,
    PushEvent, PushHandle, PushTransport,
};
pub use config::{ConfigError, DeviceConfig, TimingConfig};
pub use discovery::{Scanner, discover_devices};
pub use manager::ConnectionManager;
pub use pairing::{GENERIC_REJECTION, PairingCoordinator, PairingError, classify_rejection};
pub use pin_relay::PinRelay;
pub use session::{Backends, DeviceSession};
pub use types::{
    ConnectionEvent, ConnectionState, ManagerConfig, ManagerSnapshot, PairingConfig,
    PairingPhase, ReconnectConfig,
};
