//! Public types for the device connection manager.

use std::time::Duration;

use atvlink_protocol::constants::{
    DEFAULT_HOUSEKEEPING_KEY, HEARTBEAT_PERIOD, PIN_POLL_INTERVAL, RECONNECT_DELAY, SCAN_WINDOW,
};
use atvlink_protocol::{Payload, StatusLevel};

/// Status text while an open attempt is in flight.
pub const STATUS_CONNECTING: &str = "connecting ...";
/// Status text once the backend reports the connection open.
pub const STATUS_CONNECTED: &str = "connected";
/// Status text when the backend closes the connection.
pub const STATUS_DISCONNECTED: &str = "disconnected";
/// User-facing status text for a failed open.
pub const STATUS_CONNECT_FAILED: &str = "bad credential or unreachable";

/// Connection state of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, stopped, or retries exhausted.
    Disconnected,
    /// Open attempt in progress.
    Connecting,
    /// Backend reported the connection open.
    Connected,
    /// Connection lost, a retry is scheduled.
    Reconnecting,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// User-facing status line.
    StatusChanged { level: StatusLevel, text: String },
    /// One backend-pushed event or heartbeat poll result.
    Message(Payload),
    /// Connection state changed.
    StateChanged(ConnectionState),
}

/// Point-in-time view of a manager's state and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: ConnectionState,
    pub reconnect_pending: bool,
    pub heartbeat_active: bool,
    pub link_open: bool,
    /// Retries scheduled since the last successful connect.
    pub reconnect_attempts: u32,
}

impl Default for ManagerSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_pending: false,
            heartbeat_active: false,
            link_open: false,
            reconnect_attempts: 0,
        }
    }
}

/// Reconnect policy: fixed delay, optional cap.
///
/// The default retries every 15 seconds forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub delay: Duration,
    /// `None` retries until the manager is stopped.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// Tuning for one connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub reconnect: ReconnectConfig,
    pub heartbeat_period: Duration,
    pub scan_window: Duration,
    /// Log every message payload at debug level.
    pub debug: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_period: HEARTBEAT_PERIOD,
            scan_window: SCAN_WINDOW,
            debug: false,
        }
    }
}

/// Tuning for the pairing flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    pub scan_window: Duration,
    pub pin_poll_interval: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            scan_window: SCAN_WINDOW,
            pin_poll_interval: PIN_POLL_INTERVAL,
        }
    }
}

/// Step a pairing attempt is currently at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingPhase {
    Idle,
    Discovering,
    Connecting,
    AwaitingPin,
    Completing,
}

/// Default poll-backend key excluded from liveness status.
pub fn default_housekeeping_key() -> String {
    DEFAULT_HOUSEKEEPING_KEY.to_string()
}
