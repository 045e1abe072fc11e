//! Per-device facade used by the outer layer.
//!
//! A session selects the backend once from its configuration, owns the
//! connection manager (when a credential exists) and the pairing
//! coordinator (native backend only), and tears both down on shutdown.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atvlink_discovery::Client as DiscoveryClient;
use atvlink_protocol::{
    BackendKind, DeviceRef, DeviceSummary, NativeCredential, PairResponse, parse_device_selector,
};

use crate::backend::{Backend, BackendError, PollTransport, PushTransport};
use crate::config::{ConfigError, DeviceConfig};
use crate::discovery::{Scanner, discover_devices};
use crate::manager::ConnectionManager;
use crate::pairing::{PairingCoordinator, PairingError};
use crate::types::{ConnectionEvent, ConnectionState};

/// Backend implementations available to a session.
#[derive(Clone)]
pub struct Backends {
    pub push: Option<Arc<dyn PushTransport>>,
    pub poll: Option<Arc<dyn PollTransport>>,
    pub scanner: Arc<dyn Scanner>,
}

impl Default for Backends {
    /// No transports; scans with mDNS.
    fn default() -> Self {
        Self::new(Arc::new(DiscoveryClient::new()))
    }
}

impl Backends {
    pub fn new(scanner: Arc<dyn Scanner>) -> Self {
        Self {
            push: None,
            poll: None,
            scanner,
        }
    }

    pub fn with_push(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.push = Some(transport);
        self
    }

    pub fn with_poll(mut self, transport: Arc<dyn PollTransport>) -> Self {
        self.poll = Some(transport);
        self
    }

    /// Picks the variant for `kind`.
    pub fn select(&self, kind: BackendKind, housekeeping_key: &str) -> Result<Backend, ConfigError> {
        match kind {
            BackendKind::Native => self
                .push
                .clone()
                .map(|transport| Backend::push(transport, self.scanner.clone()))
                .ok_or(ConfigError::MissingTransport(kind)),
            BackendKind::Poll => self
                .poll
                .clone()
                .map(|transport| Backend::poll(transport, housekeeping_key))
                .ok_or(ConfigError::MissingTransport(kind)),
        }
    }
}

/// One configured device.
pub struct DeviceSession {
    config: DeviceConfig,
    device: DeviceRef,
    scanner: Arc<dyn Scanner>,
    manager: Option<Arc<ConnectionManager>>,
    coordinator: Option<PairingCoordinator>,
    startup: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl DeviceSession {
    /// Builds the session and, if a credential is stored, starts the
    /// connection manager after the configured startup delay.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: DeviceConfig, backends: Backends) -> Result<Self, ConfigError> {
        config.timing.validate()?;
        let device = config.device_ref()?;
        let credential = config.credential()?;
        let cancel = CancellationToken::new();

        let manager = match credential {
            Some(credential) => {
                let backend = backends.select(config.backend, &config.timing.housekeeping_key)?;
                let manager = ConnectionManager::new(
                    backend,
                    device.clone(),
                    credential,
                    config.manager_config(),
                )?;
                Some(Arc::new(manager))
            }
            None => {
                info!(device = %device.label(), "no credential stored, connection not started");
                None
            }
        };

        let startup = manager
            .as_ref()
            .map(|manager| spawn_delayed_start(manager.clone(), &config, cancel.clone()));

        let coordinator = match (config.backend, &backends.push) {
            (BackendKind::Native, Some(push)) => Some(PairingCoordinator::new(
                backends.scanner.clone(),
                push.clone(),
                config.pairing_config(),
            )),
            _ => None,
        };

        Ok(Self {
            config,
            device,
            scanner: backends.scanner,
            manager,
            coordinator,
            startup: Mutex::new(startup),
            cancel,
        })
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn manager(&self) -> Option<&ConnectionManager> {
        self.manager.as_deref()
    }

    pub fn coordinator(&self) -> Option<&PairingCoordinator> {
        self.coordinator.as_ref()
    }

    /// Takes the manager's event receiver. `None` without a credential or
    /// on the second call.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        match &self.manager {
            Some(manager) => manager.take_events().await,
            None => None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager
            .as_ref()
            .map_or(ConnectionState::Disconnected, |m| m.state())
    }

    /// Hands a PIN to the pairing attempt in progress.
    pub fn submit_pin(&self, code: impl Into<String>) {
        match &self.coordinator {
            Some(coordinator) => coordinator.submit_pin(code),
            None => debug!(device = %self.device.label(), "pin ignored, pairing unavailable"),
        }
    }

    /// Pairs with the device named by a `name:uid` selector.
    pub async fn pair(&self, selector: &str) -> Result<NativeCredential, PairingError> {
        let uid = parse_device_selector(selector)
            .ok_or_else(|| PairingError::InvalidSelector(selector.to_string()))?;
        let coordinator = self.coordinator.as_ref().ok_or(PairingError::Unavailable)?;
        coordinator.pair(uid).await
    }

    /// [`pair`](Self::pair), shaped as the `{token}` / `{error}` reply.
    pub async fn pair_response(&self, selector: &str) -> PairResponse {
        self.pair(selector)
            .await
            .map(|credential| credential.to_string())
            .into()
    }

    /// Lists devices seen within the scan window.
    pub async fn discover(&self) -> Result<Vec<DeviceSummary>, BackendError> {
        discover_devices(self.scanner.as_ref(), self.config.scan_window()).await
    }

    /// Stops everything this session started. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let startup = self.startup.lock().ok().and_then(|mut s| s.take());
        if let Some(startup) = startup
            && let Err(e) = startup.await
        {
            warn!(device = %self.device.label(), error = %e, "startup task ended abnormally");
        }
        if let Some(manager) = &self.manager {
            manager.stop().await;
        }
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_delayed_start(
    manager: Arc<ConnectionManager>,
    config: &DeviceConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let delay = config.startup_delay();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(device = %manager.device().label(), "startup cancelled");
            }
            _ = tokio::time::sleep(delay) => {
                manager.start();
            }
        }
    })
}
