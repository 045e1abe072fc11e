//! Backend capability surface.
//!
//! The two device protocols are external: a push-style transport that
//! emits connect/message/close/error events, and a poll-style transport
//! that emits update/error events. [`Backend`] selects one of them at
//! construction and [`Link`] normalises the live connection into the
//! manager's signals. Nothing outside this module branches on the
//! backend kind.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use atvlink_discovery::DiscoveredDevice;
use atvlink_protocol::{
    BackendKind, Credential, DeviceRef, NativeCredential, Payload, PlaybackQueueRequest,
    PollCredential, PollDeviceRef,
};

use crate::discovery::{Scanner, locate};

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Failure text from the external protocol, shown as-is.
    #[error("{0}")]
    Transport(String),

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("{backend} backend cannot use a {what}")]
    Mismatch {
        backend: BackendKind,
        what: &'static str,
    },

    #[error("connection closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Push variant
// ---------------------------------------------------------------------------

/// Event pushed by a push-style connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connect,
    Message(Payload),
    Close,
    Error(String),
}

/// Completes a pairing handshake once the PIN is known.
pub type PinCallback =
    Box<dyn FnOnce(String) -> BoxFuture<'static, Result<(), BackendError>> + Send>;

/// A freshly opened push connection and its event stream.
pub struct PushChannel {
    pub handle: Box<dyn PushHandle>,
    pub events: mpsc::Receiver<PushEvent>,
}

/// Opens push-style connections.
pub trait PushTransport: Send + Sync {
    /// Opens a connection to `device`. Without a credential the connection
    /// is unauthenticated and only good for pairing.
    fn connect<'a>(
        &'a self,
        device: &'a DiscoveredDevice,
        credential: Option<&'a NativeCredential>,
    ) -> BoxFuture<'a, Result<PushChannel, BackendError>>;
}

/// Live push-style connection.
pub trait PushHandle: Send {
    /// Lightweight introduction, used as keep-alive.
    fn send_introduction(&mut self) -> BoxFuture<'_, Result<(), BackendError>>;

    fn request_playback_queue(
        &mut self,
        request: PlaybackQueueRequest,
    ) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Starts pairing; the returned callback finishes it with a PIN.
    fn begin_pairing(&mut self) -> BoxFuture<'_, Result<PinCallback, BackendError>>;

    /// Credential negotiated by a completed pairing, if any.
    fn credential(&self) -> Option<NativeCredential>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

// ---------------------------------------------------------------------------
// Poll variant
// ---------------------------------------------------------------------------

/// Event delivered to poll-style listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Update { key: String, value: Payload },
    Error(String),
}

/// Attaches poll-style device handles.
pub trait PollTransport: Send + Sync {
    fn attach<'a>(
        &'a self,
        device: &'a PollDeviceRef,
        credential: &'a PollCredential,
    ) -> BoxFuture<'a, Result<Box<dyn PollHandle>, BackendError>>;
}

/// Live poll-style device handle.
pub trait PollHandle: Send {
    /// Registers the `update` and `error` listeners.
    fn subscribe(&mut self) -> mpsc::Receiver<PollEvent>;

    /// Removes the listeners registered by [`subscribe`](Self::subscribe).
    fn unsubscribe(&mut self);

    /// Pulls the current device state.
    fn fetch_state(&mut self) -> BoxFuture<'_, Result<Payload, BackendError>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

// ---------------------------------------------------------------------------
// Variant selection
// ---------------------------------------------------------------------------

/// Backend variant, fixed for the lifetime of a manager.
#[derive(Clone)]
pub enum Backend {
    Push {
        transport: Arc<dyn PushTransport>,
        scanner: Arc<dyn Scanner>,
    },
    Poll {
        transport: Arc<dyn PollTransport>,
        /// Update key that must not count as a liveness signal.
        housekeeping_key: String,
    },
}

impl Backend {
    pub fn push(transport: Arc<dyn PushTransport>, scanner: Arc<dyn Scanner>) -> Self {
        Backend::Push { transport, scanner }
    }

    pub fn poll(transport: Arc<dyn PollTransport>, housekeeping_key: impl Into<String>) -> Self {
        Backend::Poll {
            transport,
            housekeeping_key: housekeeping_key.into(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Push { .. } => BackendKind::Native,
            Backend::Poll { .. } => BackendKind::Poll,
        }
    }

    /// Checks that a device and credential belong to this variant.
    pub(crate) fn check(&self, device: &DeviceRef, credential: &Credential) -> Result<(), BackendError> {
        let backend = self.kind();
        if device.kind() != backend {
            return Err(BackendError::Mismatch {
                backend,
                what: "device reference of another backend",
            });
        }
        match (backend, credential) {
            (BackendKind::Native, Credential::Native(_)) | (BackendKind::Poll, Credential::Poll(_)) => {
                Ok(())
            }
            _ => Err(BackendError::Mismatch {
                backend,
                what: "credential of another backend",
            }),
        }
    }

    /// Opens a live link.
    ///
    /// Push: locate the device by unique identifier, then open an
    /// authenticated connection. Poll: attach the handle and subscribe.
    pub(crate) async fn open(
        &self,
        device: &DeviceRef,
        credential: &Credential,
        scan_window: Duration,
    ) -> Result<Link, BackendError> {
        self.check(device, credential)?;
        match (self, device, credential) {
            (
                Backend::Push { transport, scanner },
                DeviceRef::Native { unique_identifier },
                Credential::Native(native),
            ) => {
                let found = locate(scanner.as_ref(), unique_identifier, scan_window).await?;
                debug!(uid = %found.uid, address = %found.address(), "opening push connection");
                let PushChannel { handle, events } = transport.connect(&found, Some(native)).await?;
                Ok(Link::Push { handle, events })
            }
            (
                Backend::Poll {
                    transport,
                    housekeeping_key,
                },
                DeviceRef::Poll(poll_ref),
                Credential::Poll(poll_cred),
            ) => {
                debug!(device = %poll_ref.address, "attaching poll handle");
                let mut handle = transport.attach(poll_ref, poll_cred).await?;
                let events = handle.subscribe();
                Ok(Link::Poll {
                    handle,
                    events,
                    housekeeping_key: housekeeping_key.clone(),
                    announced: false,
                })
            }
            _ => Err(BackendError::Mismatch {
                backend: self.kind(),
                what: "device reference of another backend",
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalised link
// ---------------------------------------------------------------------------

/// Backend event normalised for the manager.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LinkEvent {
    Opened,
    /// `alive` marks an implicit liveness signal.
    Message { payload: Payload, alive: bool },
    Closed,
    Failed(String),
}

/// Live connection owned by exactly one manager.
pub(crate) enum Link {
    Push {
        handle: Box<dyn PushHandle>,
        events: mpsc::Receiver<PushEvent>,
    },
    Poll {
        handle: Box<dyn PollHandle>,
        events: mpsc::Receiver<PollEvent>,
        housekeeping_key: String,
        /// Attaching the handle is the implicit connect; reported once.
        announced: bool,
    },
}

impl Link {
    /// Waits for the next backend event. A dropped event stream reads as
    /// `Closed`. Cancel-safe.
    pub(crate) async fn next_event(&mut self) -> LinkEvent {
        match self {
            Link::Push { events, .. } => match events.recv().await {
                Some(PushEvent::Connect) => LinkEvent::Opened,
                Some(PushEvent::Message(payload)) => LinkEvent::Message {
                    payload,
                    alive: false,
                },
                Some(PushEvent::Close) | None => LinkEvent::Closed,
                Some(PushEvent::Error(e)) => LinkEvent::Failed(e),
            },
            Link::Poll {
                events,
                housekeeping_key,
                announced,
                ..
            } => {
                if !*announced {
                    *announced = true;
                    return LinkEvent::Opened;
                }
                match events.recv().await {
                    Some(PollEvent::Update { key, value }) => {
                        let alive = key != *housekeeping_key;
                        if !alive {
                            trace!(key = %key, "housekeeping update");
                        }
                        LinkEvent::Message {
                            payload: keyed_payload(key, value),
                            alive,
                        }
                    }
                    Some(PollEvent::Error(e)) => LinkEvent::Failed(e),
                    None => LinkEvent::Closed,
                }
            }
        }
    }

    /// Periodic keep-alive. Poll links return the fetched state.
    pub(crate) async fn keep_alive(&mut self) -> Result<Option<Payload>, BackendError> {
        match self {
            Link::Push { handle, .. } => handle.send_introduction().await.map(|_| None),
            Link::Poll { handle, .. } => handle.fetch_state().await.map(Some),
        }
    }

    /// One informational request right after the link opens.
    pub(crate) async fn request_initial_state(&mut self) -> Result<Option<Payload>, BackendError> {
        match self {
            Link::Push { handle, .. } => handle
                .request_playback_queue(PlaybackQueueRequest::default())
                .await
                .map(|_| None),
            Link::Poll { handle, .. } => handle.fetch_state().await.map(Some),
        }
    }

    /// Releases the connection. Poll links detach their listeners first.
    pub(crate) async fn close(self) {
        match self {
            Link::Push { mut handle, events } => {
                drop(events);
                handle.close().await;
            }
            Link::Poll {
                mut handle, events, ..
            } => {
                handle.unsubscribe();
                drop(events);
                handle.close().await;
            }
        }
    }
}

fn keyed_payload(key: String, value: Payload) -> Payload {
    let mut map = serde_json::Map::new();
    map.insert(key, value);
    Payload::Object(map)
}
