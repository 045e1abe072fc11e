//! PIN pairing flow for the native backend.
//!
//! One attempt runs at a time per coordinator: locate the device, open an
//! unauthenticated connection, start pairing, wait for a four-character
//! PIN from the relay, then complete the handshake and return the
//! negotiated credential. The connection is closed on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atvlink_protocol::NativeCredential;

use crate::backend::{BackendError, PushChannel, PushHandle, PushTransport};
use crate::discovery::{Scanner, locate};
use crate::pin_relay::PinRelay;
use crate::types::{PairingConfig, PairingPhase};

const MIN_PIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shown when a pairing failure is not a lockout.
pub const GENERIC_REJECTION: &str = "Wrong PIN code, please try pairing again";

/// Errors from a pairing attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PairingError {
    #[error("a pairing attempt is already in progress")]
    InProgress,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Already classified for display.
    #[error("{0}")]
    Rejected(String),

    #[error("pairing completed without a credential")]
    MissingCredential,

    #[error("pairing cancelled")]
    Cancelled,

    #[error("pairing needs the native backend")]
    Unavailable,

    #[error("invalid device selector: {0:?}")]
    InvalidSelector(String),
}

impl From<BackendError> for PairingError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(uid) => PairingError::DeviceNotFound(uid),
            BackendError::Discovery(e) => PairingError::Discovery(e),
            other => PairingError::Rejected(classify_rejection(&other.to_string())),
        }
    }
}

/// Lockout and reboot notices are shown verbatim; anything else becomes
/// the generic wrong-PIN text.
pub fn classify_rejection(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("attempt") || lower.contains("rebooting") {
        message.to_string()
    } else {
        GENERIC_REJECTION.to_string()
    }
}

/// Runs pairing attempts against push-style devices.
pub struct PairingCoordinator {
    scanner: Arc<dyn Scanner>,
    transport: Arc<dyn PushTransport>,
    relay: PinRelay,
    config: PairingConfig,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    phase: watch::Sender<PairingPhase>,
}

impl PairingCoordinator {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        transport: Arc<dyn PushTransport>,
        mut config: PairingConfig,
    ) -> Self {
        config.pin_poll_interval = config.pin_poll_interval.max(MIN_PIN_POLL_INTERVAL);
        let (phase, _) = watch::channel(PairingPhase::Idle);
        Self {
            scanner,
            transport,
            relay: PinRelay::new(),
            config,
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            phase,
        }
    }

    /// Stores a PIN for the attempt in progress. Last write wins.
    pub fn submit_pin(&self, code: impl Into<String>) {
        self.relay.set_pin(code);
    }

    pub fn relay(&self) -> &PinRelay {
        &self.relay
    }

    pub fn phase(&self) -> PairingPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<PairingPhase> {
        self.phase.subscribe()
    }

    /// Pairs with the device whose unique identifier is `uid`.
    ///
    /// Dropping the returned future abandons the attempt: the connection
    /// is still closed and the relay cleared.
    pub async fn pair(&self, uid: &str) -> Result<NativeCredential, PairingError> {
        let Some(_attempt) = Attempt::begin(self) else {
            debug!(uid, "pairing rejected, another attempt is running");
            return Err(PairingError::InProgress);
        };
        if self.cancel.is_cancelled() {
            return Err(PairingError::Cancelled);
        }

        info!(uid, "pairing started");
        self.relay.clear();
        let result = self.run(uid).await;

        match &result {
            Ok(_) => info!(uid, "pairing succeeded"),
            Err(e) => warn!(uid, error = %e, "pairing failed"),
        }
        result
    }

    /// Cancels any attempt in progress and refuses new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.relay.clear();
    }

    async fn run(&self, uid: &str) -> Result<NativeCredential, PairingError> {
        self.phase.send_replace(PairingPhase::Discovering);
        let device = tokio::select! {
            _ = self.cancel.cancelled() => return Err(PairingError::Cancelled),
            found = locate(self.scanner.as_ref(), uid, self.config.scan_window) => found?,
        };

        self.phase.send_replace(PairingPhase::Connecting);
        debug!(uid, address = %device.address(), "opening pairing connection");
        let PushChannel { handle, events } = tokio::select! {
            _ = self.cancel.cancelled() => return Err(PairingError::Cancelled),
            channel = self.transport.connect(&device, None) => channel?,
        };
        // Pairing connections carry no traffic of interest.
        drop(events);

        let mut connection = PairingConnection::new(handle);
        let result = self.handshake(&mut connection).await;
        connection.close().await;
        result
    }

    async fn handshake(
        &self,
        connection: &mut PairingConnection,
    ) -> Result<NativeCredential, PairingError> {
        let handle = connection.handle()?;
        let finish = tokio::select! {
            _ = self.cancel.cancelled() => return Err(PairingError::Cancelled),
            callback = handle.begin_pairing() => callback?,
        };

        self.phase.send_replace(PairingPhase::AwaitingPin);
        let pin = self.wait_for_pin().await?;

        self.phase.send_replace(PairingPhase::Completing);
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(PairingError::Cancelled),
            done = finish(pin) => done?,
        }

        handle.credential().ok_or(PairingError::MissingCredential)
    }

    /// Polls the relay until it holds a full-length PIN.
    async fn wait_for_pin(&self) -> Result<String, PairingError> {
        let mut poll = tokio::time::interval(self.config.pin_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PairingError::Cancelled),
                _ = poll.tick() => {
                    if let Some(pin) = self.relay.try_take_pin() {
                        debug!("pin received");
                        return Ok(pin);
                    }
                }
            }
        }
    }
}

/// Claim on the coordinator's single attempt slot.
///
/// Released on drop, including when the `pair()` future is dropped: the
/// relay is cleared and the phase returns to idle.
struct Attempt<'a> {
    coordinator: &'a PairingCoordinator,
}

impl<'a> Attempt<'a> {
    fn begin(coordinator: &'a PairingCoordinator) -> Option<Self> {
        coordinator
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { coordinator })
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.coordinator.relay.clear();
        self.coordinator.phase.send_replace(PairingPhase::Idle);
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}

/// Unauthenticated connection used for one handshake.
///
/// Closed exactly once. If dropped while still open, the close runs on a
/// spawned task.
struct PairingConnection {
    handle: Option<Box<dyn PushHandle>>,
}

impl PairingConnection {
    fn new(handle: Box<dyn PushHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn handle(&mut self) -> Result<&mut (dyn PushHandle + 'static), PairingError> {
        self.handle.as_deref_mut().ok_or(PairingError::Cancelled)
    }

    async fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close().await;
        }
    }
}

impl Drop for PairingConnection {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("pairing attempt abandoned, closing connection");
                runtime.spawn(async move {
                    handle.close().await;
                });
            }
            Err(_) => warn!("pairing connection dropped outside a runtime, not closed"),
        }
    }
}
