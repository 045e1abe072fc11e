//! Timing defaults shared by the connection manager and pairing flow.

use std::time::Duration;

/// Fixed delay before a lost connection is retried.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(15);

/// Period of the keep-alive / state refresh while connected.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// Delay between construction and the first connection attempt.
pub const STARTUP_DELAY: Duration = Duration::from_millis(1500);

/// Window of a bounded device scan.
pub const SCAN_WINDOW: Duration = Duration::from_millis(1500);

/// Interval at which the pairing flow checks the PIN relay.
pub const PIN_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Exact length a PIN must have before the pairing flow consumes it.
pub const PIN_LENGTH: usize = 4;

/// Poll-backend update key that refreshes constantly and must not flip status.
pub const DEFAULT_HOUSEKEEPING_KEY: &str = "dateTime";
