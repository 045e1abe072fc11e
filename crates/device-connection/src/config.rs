//! JSON configuration for one managed device.
//!
//! Field names are camelCase so the file matches what the outer layer
//! already stores:
//!
//! ```json
//! {
//!   "backend": "native",
//!   "deviceIdentifier": "A1B2-C3D4",
//!   "token": "A1B2-C3D4:client-1:70616972:0a0b0c:deadbeef",
//!   "timing": { "reconnectDelayMs": 15000 }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use atvlink_protocol::constants::{
    HEARTBEAT_PERIOD, PIN_POLL_INTERVAL, RECONNECT_DELAY, SCAN_WINDOW, STARTUP_DELAY,
};
use atvlink_protocol::{
    BackendKind, Credential, CredentialError, DeviceRef, NativeCredential, PollAddress,
    PollCredential, PollDeviceRef,
};

use crate::backend::BackendError;
use crate::types::{ManagerConfig, PairingConfig, ReconnectConfig, default_housekeeping_key};

/// Errors from loading or interpreting a device configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("no device identifier configured")]
    MissingDevice,

    #[error("no {0} transport available")]
    MissingTransport(BackendKind),

    #[error("timing.{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Timing knobs, all in milliseconds on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub reconnect_delay_ms: u64,
    /// `null` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_period_ms: u64,
    pub startup_delay_ms: u64,
    pub scan_window_ms: u64,
    pub pin_poll_interval_ms: u64,
    /// Poll-backend update key that does not count as liveness.
    pub housekeeping_key: String,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: millis(RECONNECT_DELAY),
            max_reconnect_attempts: None,
            heartbeat_period_ms: millis(HEARTBEAT_PERIOD),
            startup_delay_ms: millis(STARTUP_DELAY),
            scan_window_ms: millis(SCAN_WINDOW),
            pin_poll_interval_ms: millis(PIN_POLL_INTERVAL),
            housekeeping_key: default_housekeeping_key(),
        }
    }
}

impl TimingConfig {
    /// Periods and windows must be non-zero; the startup delay may be zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("reconnectDelayMs", self.reconnect_delay_ms),
            ("heartbeatPeriodMs", self.heartbeat_period_ms),
            ("scanWindowMs", self.scan_window_ms),
            ("pinPollIntervalMs", self.pin_poll_interval_ms),
        ];
        match required.into_iter().find(|(_, ms)| *ms == 0) {
            Some((field, _)) => Err(ConfigError::ZeroDuration(field)),
            None => Ok(()),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Construction input for one device.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub backend: BackendKind,

    /// Native: unique identifier. Poll: IP host, MAC address or id.
    #[serde(default)]
    pub device_identifier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Native pairing token, or the poll backend's AirPlay credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Poll backend's Companion credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_token: Option<String>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub timing: TimingConfig,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("backend", &self.backend)
            .field("device_identifier", &self.device_identifier)
            .field("device_name", &self.device_name)
            .field("token", &self.token.is_some())
            .field("companion_token", &self.companion_token.is_some())
            .field("debug", &self.debug)
            .field("timing", &self.timing)
            .finish()
    }
}

impl DeviceConfig {
    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), backend = %config.backend, "configuration loaded");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the timing block and that the device and credential can be
    /// derived.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.device_ref()?;
        self.credential()?;
        Ok(())
    }

    /// The device this configuration targets.
    ///
    /// A native device without an explicit identifier falls back to the
    /// unique identifier embedded in its token.
    pub fn device_ref(&self) -> Result<DeviceRef, ConfigError> {
        let identifier = self.device_identifier.trim();
        match self.backend {
            BackendKind::Native => {
                let unique_identifier = if identifier.is_empty() {
                    let token = self.native_token()?.ok_or(ConfigError::MissingDevice)?;
                    token.unique_identifier().to_string()
                } else {
                    identifier.to_string()
                };
                Ok(DeviceRef::Native { unique_identifier })
            }
            BackendKind::Poll => {
                if identifier.is_empty() {
                    return Err(ConfigError::MissingDevice);
                }
                let name = self
                    .device_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| identifier.to_string());
                Ok(DeviceRef::Poll(PollDeviceRef {
                    address: PollAddress::classify(identifier),
                    name,
                }))
            }
        }
    }

    /// The stored credential, or `None` if the device is not paired yet.
    pub fn credential(&self) -> Result<Option<Credential>, ConfigError> {
        match self.backend {
            BackendKind::Native => Ok(self.native_token()?.map(Credential::Native)),
            BackendKind::Poll => {
                if blank(&self.token) && blank(&self.companion_token) {
                    return Ok(None);
                }
                let credential =
                    PollCredential::new(self.token.clone(), self.companion_token.clone())?;
                Ok(Some(Credential::Poll(credential)))
            }
        }
    }

    fn native_token(&self) -> Result<Option<NativeCredential>, ConfigError> {
        match self.token.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(token) => Ok(Some(token.parse()?)),
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            delay: Duration::from_millis(self.timing.reconnect_delay_ms),
            max_attempts: self.timing.max_reconnect_attempts,
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect: self.reconnect_config(),
            heartbeat_period: Duration::from_millis(self.timing.heartbeat_period_ms),
            scan_window: self.scan_window(),
            debug: self.debug,
        }
    }

    pub fn pairing_config(&self) -> PairingConfig {
        PairingConfig {
            scan_window: self.scan_window(),
            pin_poll_interval: Duration::from_millis(self.timing.pin_poll_interval_ms),
        }
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.timing.scan_window_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.timing.startup_delay_ms)
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
