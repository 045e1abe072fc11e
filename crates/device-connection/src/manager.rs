//! Connection manager driving one device through its lifecycle.
//!
//! A single driver task owns the backend link and both timers, so every
//! transition runs sequentially. Connection loss (close, error or failed
//! open) always ends in one scheduled retry after the fixed reconnect delay.

use std::sync::Mutex;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use atvlink_protocol::{Credential, DeviceRef, Payload, StatusLevel};

use crate::backend::{Backend, BackendError, Link, LinkEvent};
use crate::heartbeat::Heartbeat;
use crate::reconnection::{ReconnectTimer, Schedule};
use crate::types::{
    ConnectionEvent, ConnectionState, ManagerConfig, ManagerSnapshot, STATUS_CONNECT_FAILED,
    STATUS_CONNECTED, STATUS_CONNECTING, STATUS_DISCONNECTED,
};

/// Connection manager for one configured device.
pub struct ConnectionManager {
    device: DeviceRef,
    driver: Mutex<Option<Driver>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    snapshot_rx: watch::Receiver<ManagerSnapshot>,
}

impl ConnectionManager {
    /// Creates a manager. The backend variant is fixed from here on.
    ///
    /// Fails if the device or credential belongs to another backend.
    pub fn new(
        backend: Backend,
        device: DeviceRef,
        credential: Credential,
        config: ManagerConfig,
    ) -> Result<Self, BackendError> {
        backend.check(&device, &credential)?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(ManagerSnapshot::default());
        let cancel = CancellationToken::new();

        let driver = Driver {
            backend,
            device: device.clone(),
            credential,
            heartbeat: Heartbeat::new(config.heartbeat_period),
            reconnect: ReconnectTimer::new(config.reconnect.clone()),
            config,
            link: None,
            state: ConnectionState::Disconnected,
            events_tx,
            snapshot_tx,
            cancel: cancel.clone(),
        };

        Ok(Self {
            device,
            driver: Mutex::new(Some(driver)),
            task: Mutex::new(None),
            cancel,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
            snapshot_rx,
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot_rx.borrow().state
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watches state and timer changes.
    pub fn subscribe(&self) -> watch::Receiver<ManagerSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Starts the connection lifecycle on the current Tokio runtime.
    ///
    /// Returns `false` if the manager was already started or stopped.
    pub fn start(&self) -> bool {
        if self.cancel.is_cancelled() {
            warn!(device = %self.device.label(), "start after stop ignored");
            return false;
        }
        let Some(driver) = self.driver.lock().ok().and_then(|mut d| d.take()) else {
            debug!(device = %self.device.label(), "manager already started");
            return false;
        };
        let handle = tokio::spawn(driver.run());
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        true
    }

    /// Stops the manager: cancels both timers, closes the live connection
    /// and detaches listeners. Terminal and idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        // Never started: nothing is open.
        if let Ok(mut driver) = self.driver.lock() {
            driver.take();
        }
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(device = %self.device.label(), error = %e, "driver task ended abnormally");
            }
            info!(device = %self.device.label(), "connection manager stopped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the link and timers; runs on one task.
struct Driver {
    backend: Backend,
    device: DeviceRef,
    credential: Credential,
    config: ManagerConfig,
    link: Option<Link>,
    state: ConnectionState,
    heartbeat: Heartbeat,
    reconnect: ReconnectTimer,
    events_tx: mpsc::Sender<ConnectionEvent>,
    snapshot_tx: watch::Sender<ManagerSnapshot>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        info!(
            device = %self.device.label(),
            backend = %self.backend.kind(),
            "connection manager started"
        );
        self.connect().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.reconnect.fired() => {
                    debug!(device = %self.device.label(), "reconnect timer fired");
                    self.connect().await;
                }
                _ = self.heartbeat.tick() => self.beat().await,
                event = next_link_event(&mut self.link) => self.on_link_event(event).await,
            }
        }

        self.teardown().await;
    }

    /// Disconnected/Reconnecting -> Connecting.
    async fn connect(&mut self) {
        self.heartbeat.stop();
        if let Some(stale) = self.link.take() {
            stale.close().await;
        }
        self.set_state(ConnectionState::Connecting);
        self.status(StatusLevel::Info, STATUS_CONNECTING);

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.backend.open(&self.device, &self.credential, self.config.scan_window) => result,
        };

        match opened {
            Ok(link) => {
                debug!(device = %self.device.label(), "backend opened, awaiting connect");
                self.link = Some(link);
                self.publish_snapshot();
            }
            Err(e) => {
                warn!(device = %self.device.label(), error = %e, "connection failed");
                self.status(StatusLevel::Error, STATUS_CONNECT_FAILED);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => self.on_opened().await,
            LinkEvent::Message { payload, alive } => {
                if alive {
                    self.status(StatusLevel::Ok, STATUS_CONNECTED);
                }
                self.publish(payload);
            }
            LinkEvent::Closed => self.on_lost(STATUS_DISCONNECTED.to_string()).await,
            LinkEvent::Failed(e) => self.on_lost(format!("error: {e}")).await,
        }
    }

    /// Connecting -> Connected.
    async fn on_opened(&mut self) {
        if self.state == ConnectionState::Connected {
            return;
        }
        self.reconnect.reset();
        self.heartbeat.start();
        self.set_state(ConnectionState::Connected);
        self.status(StatusLevel::Ok, STATUS_CONNECTED);
        info!(device = %self.device.label(), "connected");

        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = link.request_initial_state() => result,
        };
        match result {
            Ok(Some(payload)) => self.publish(payload),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "initial state request failed, ignoring"),
        }
    }

    /// Connected/Connecting -> Reconnecting.
    async fn on_lost(&mut self, text: String) {
        self.heartbeat.stop();
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        warn!(device = %self.device.label(), reason = %text, "connection lost");
        self.status(StatusLevel::Error, text);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.schedule() {
            Schedule::Armed { attempt } => {
                info!(
                    device = %self.device.label(),
                    attempt,
                    delay_secs = self.reconnect.delay_secs(),
                    "reconnect scheduled"
                );
                self.set_state(ConnectionState::Reconnecting);
            }
            Schedule::AlreadyPending => {
                debug!(device = %self.device.label(), "reconnect already pending");
            }
            Schedule::Exhausted => {
                let attempts = self.reconnect.attempts();
                warn!(device = %self.device.label(), attempts, "retry limit reached");
                self.set_state(ConnectionState::Disconnected);
                self.status(
                    StatusLevel::Error,
                    format!("giving up after {attempts} reconnect attempts"),
                );
            }
        }
        self.publish_snapshot();
    }

    /// Heartbeat: failures are swallowed; only backend events end a session.
    async fn beat(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = link.keep_alive() => result,
        };
        match result {
            Ok(Some(payload)) => self.publish(payload),
            Ok(None) => trace!(device = %self.device.label(), "keep-alive sent"),
            Err(e) => debug!(device = %self.device.label(), error = %e, "heartbeat failed, ignoring"),
        }
    }

    /// Any state -> Disconnected.
    async fn teardown(&mut self) {
        self.reconnect.cancel();
        self.heartbeat.stop();
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        self.publish_snapshot();
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(device = %self.device.label(), from = ?self.state, to = ?state, "state change");
        self.state = state;
        self.emit(ConnectionEvent::StateChanged(state));
        self.publish_snapshot();
    }

    fn status(&self, level: StatusLevel, text: impl Into<String>) {
        self.emit(ConnectionEvent::StatusChanged {
            level,
            text: text.into(),
        });
    }

    fn publish(&self, payload: Payload) {
        if self.config.debug {
            debug!(device = %self.device.label(), %payload, "message");
        } else {
            trace!(device = %self.device.label(), %payload, "message");
        }
        self.emit(ConnectionEvent::Message(payload));
    }

    fn emit(&self, event: ConnectionEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(device = %self.device.label(), "event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = ManagerSnapshot {
            state: self.state,
            reconnect_pending: self.reconnect.is_pending(),
            heartbeat_active: self.heartbeat.is_active(),
            link_open: self.link.is_some(),
            reconnect_attempts: self.reconnect.attempts(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link.as_mut() {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}
