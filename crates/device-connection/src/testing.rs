//! In-memory backends and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use atvlink_discovery::DiscoveredDevice;
use atvlink_protocol::{
    Credential, DeviceRef, NativeCredential, Payload, PlaybackQueueRequest, PollAddress,
    PollCredential, PollDeviceRef,
};

use crate::backend::{
    BackendError, PinCallback, PollEvent, PollHandle, PollTransport, PushChannel, PushEvent,
    PushHandle, PushTransport,
};
use crate::discovery::Scanner;
use crate::types::ConnectionEvent;

pub(crate) const NATIVE_TOKEN: &str = "UID-1:client-1:70616972:0a0b0c:deadbeef";

pub(crate) fn native_ref() -> DeviceRef {
    DeviceRef::Native {
        unique_identifier: "UID-1".into(),
    }
}

pub(crate) fn native_credential() -> Credential {
    Credential::Native(paired_credential())
}

pub(crate) fn paired_credential() -> NativeCredential {
    NATIVE_TOKEN.parse().unwrap()
}

pub(crate) fn poll_ref() -> DeviceRef {
    DeviceRef::Poll(PollDeviceRef {
        address: PollAddress::classify("192.168.1.40"),
        name: "Bedroom".into(),
    })
}

pub(crate) fn poll_credential() -> Credential {
    Credential::Poll(PollCredential::new(Some("airplay-secret".into()), None).unwrap())
}

pub(crate) fn discovered(uid: &str) -> DiscoveredDevice {
    DiscoveredDevice {
        uid: uid.to_string(),
        name: format!("Device {uid}"),
        host: format!("{}.local.", uid.to_lowercase()),
        port: 49152,
        ips: vec!["192.168.1.50".parse().unwrap()],
    }
}

/// Collects every event already queued.
pub(crate) fn drain(rx: &mut mpsc::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(async move { value })
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub(crate) struct MockScanner {
    devices: Vec<DiscoveredDevice>,
    scans: AtomicUsize,
}

impl MockScanner {
    pub(crate) fn with_devices(devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            devices,
            scans: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_device(uid: &str) -> Self {
        Self::with_devices(vec![discovered(uid)])
    }

    pub(crate) fn empty() -> Self {
        Self::with_devices(Vec::new())
    }

    pub(crate) fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl Scanner for MockScanner {
    fn scan<'a>(
        &'a self,
        uid: Option<&'a str>,
        _window: Duration,
    ) -> BoxFuture<'a, Result<Vec<DiscoveredDevice>, BackendError>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let found = self
            .devices
            .iter()
            .filter(|d| uid.is_none_or(|uid| d.uid == uid))
            .cloned()
            .collect();
        ready(Ok(found))
    }
}

// ---------------------------------------------------------------------------
// Push transport
// ---------------------------------------------------------------------------

/// How a mock push handle answers a pairing request.
#[derive(Debug, Clone)]
pub(crate) enum PairingScript {
    /// The right PIN completes pairing and installs `credential`.
    Accept {
        pin: String,
        credential: Option<NativeCredential>,
    },
    /// Every PIN fails with this text.
    Reject(String),
}

#[derive(Default)]
pub(crate) struct PushLog {
    attempts: Mutex<Vec<Instant>>,
    connected: AtomicUsize,
    closes: AtomicUsize,
    introductions: AtomicUsize,
    queue_requests: AtomicUsize,
    sender: Mutex<Option<mpsc::Sender<PushEvent>>>,
}

impl PushLog {
    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.connected.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn introductions(&self) -> usize {
        self.introductions.load(Ordering::SeqCst)
    }

    pub(crate) fn queue_requests(&self) -> usize {
        self.queue_requests.load(Ordering::SeqCst)
    }

    /// Event sender of the most recent connection.
    pub(crate) fn last_sender(&self) -> Option<mpsc::Sender<PushEvent>> {
        self.sender.lock().unwrap().clone()
    }
}

pub(crate) struct MockPushTransport {
    default_ok: bool,
    plan: Mutex<VecDeque<bool>>,
    pairing: PairingScript,
    fail_introductions: bool,
    pub(crate) log: Arc<PushLog>,
}

impl MockPushTransport {
    /// Connects succeed when `default_ok`, unless a plan says otherwise.
    pub(crate) fn new(default_ok: bool) -> Self {
        Self {
            default_ok,
            plan: Mutex::new(VecDeque::new()),
            pairing: PairingScript::Accept {
                pin: "1234".into(),
                credential: Some(paired_credential()),
            },
            fail_introductions: false,
            log: Arc::new(PushLog::default()),
        }
    }

    /// Outcomes for the next connects, in order.
    pub(crate) fn with_plan(self, plan: impl IntoIterator<Item = bool>) -> Self {
        *self.plan.lock().unwrap() = plan.into_iter().collect();
        self
    }

    pub(crate) fn with_pairing(mut self, script: PairingScript) -> Self {
        self.pairing = script;
        self
    }

    pub(crate) fn failing_introductions(mut self) -> Self {
        self.fail_introductions = true;
        self
    }
}

impl PushTransport for MockPushTransport {
    fn connect<'a>(
        &'a self,
        _device: &'a DiscoveredDevice,
        _credential: Option<&'a NativeCredential>,
    ) -> BoxFuture<'a, Result<PushChannel, BackendError>> {
        self.log.attempts.lock().unwrap().push(Instant::now());
        let ok = self
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_ok);
        if !ok {
            return ready(Err(BackendError::Transport("connection refused".into())));
        }

        let (tx, events) = mpsc::channel(16);
        tx.try_send(PushEvent::Connect).unwrap();
        *self.log.sender.lock().unwrap() = Some(tx);
        self.log.connected.fetch_add(1, Ordering::SeqCst);

        let handle = MockPushHandle {
            log: self.log.clone(),
            pairing: self.pairing.clone(),
            fail_introductions: self.fail_introductions,
            credential: Arc::new(Mutex::new(None)),
            closed: false,
        };
        ready(Ok(PushChannel {
            handle: Box::new(handle),
            events,
        }))
    }
}

struct MockPushHandle {
    log: Arc<PushLog>,
    pairing: PairingScript,
    fail_introductions: bool,
    credential: Arc<Mutex<Option<NativeCredential>>>,
    closed: bool,
}

impl PushHandle for MockPushHandle {
    fn send_introduction(&mut self) -> BoxFuture<'_, Result<(), BackendError>> {
        self.log.introductions.fetch_add(1, Ordering::SeqCst);
        if self.fail_introductions {
            ready(Err(BackendError::Transport("timeout".into())))
        } else {
            ready(Ok(()))
        }
    }

    fn request_playback_queue(
        &mut self,
        _request: PlaybackQueueRequest,
    ) -> BoxFuture<'_, Result<(), BackendError>> {
        self.log.queue_requests.fetch_add(1, Ordering::SeqCst);
        ready(Err(BackendError::Transport("no active player".into())))
    }

    fn begin_pairing(&mut self) -> BoxFuture<'_, Result<PinCallback, BackendError>> {
        let slot = self.credential.clone();
        let callback: PinCallback = match self.pairing.clone() {
            PairingScript::Accept { pin, credential } => Box::new(move |code: String| -> BoxFuture<'static, Result<(), BackendError>> {
                Box::pin(async move {
                    if code == pin {
                        *slot.lock().unwrap() = credential;
                        Ok(())
                    } else {
                        Err(BackendError::Transport("pairing failed".into()))
                    }
                })
            }),
            PairingScript::Reject(message) => Box::new(move |_code: String| -> BoxFuture<'static, Result<(), BackendError>> {
                Box::pin(async move { Err(BackendError::Transport(message)) })
            }),
        };
        ready(Ok(callback))
    }

    fn credential(&self) -> Option<NativeCredential> {
        self.credential.lock().unwrap().clone()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
        ready(())
    }
}

// ---------------------------------------------------------------------------
// Poll transport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct PollLog {
    attempts: AtomicUsize,
    attaches: AtomicUsize,
    closes: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    fetches: AtomicUsize,
    sender: Mutex<Option<mpsc::Sender<PollEvent>>>,
}

impl PollLog {
    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.attaches.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }

    /// Listener registrations still attached.
    pub(crate) fn subscriptions(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst) - self.unsubscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn last_sender(&self) -> Option<mpsc::Sender<PollEvent>> {
        self.sender.lock().unwrap().clone()
    }
}

pub(crate) struct MockPollTransport {
    default_ok: bool,
    pub(crate) log: Arc<PollLog>,
}

impl MockPollTransport {
    pub(crate) fn new(default_ok: bool) -> Self {
        Self {
            default_ok,
            log: Arc::new(PollLog::default()),
        }
    }

    /// State returned by every fetch.
    pub(crate) fn state_payload() -> Payload {
        json!({ "deviceState": "playing", "title": "Song" })
    }
}

impl PollTransport for MockPollTransport {
    fn attach<'a>(
        &'a self,
        _device: &'a PollDeviceRef,
        _credential: &'a PollCredential,
    ) -> BoxFuture<'a, Result<Box<dyn PollHandle>, BackendError>> {
        self.log.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.default_ok {
            return ready(Err(BackendError::Transport("host unreachable".into())));
        }
        self.log.attaches.fetch_add(1, Ordering::SeqCst);
        let handle: Box<dyn PollHandle> = Box::new(MockPollHandle {
            log: self.log.clone(),
            subscribed: false,
            closed: false,
        });
        ready(Ok(handle))
    }
}

struct MockPollHandle {
    log: Arc<PollLog>,
    subscribed: bool,
    closed: bool,
}

impl PollHandle for MockPollHandle {
    fn subscribe(&mut self) -> mpsc::Receiver<PollEvent> {
        let (tx, rx) = mpsc::channel(16);
        *self.log.sender.lock().unwrap() = Some(tx);
        self.log.subscribes.fetch_add(1, Ordering::SeqCst);
        self.subscribed = true;
        rx
    }

    fn unsubscribe(&mut self) {
        if self.subscribed {
            self.subscribed = false;
            self.log.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fetch_state(&mut self) -> BoxFuture<'_, Result<Payload, BackendError>> {
        self.log.fetches.fetch_add(1, Ordering::SeqCst);
        ready(Ok(MockPollTransport::state_payload()))
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
        ready(())
    }
}
