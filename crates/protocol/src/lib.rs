//! Shared types for the atvlink device connection core.
//!
//! Device references, credentials, status levels and the JSON shapes
//! exchanged with the outer relay layer.

pub mod constants;
pub mod credential;
pub mod messages;
pub mod types;

pub use credential::{Credential, CredentialError, NativeCredential, PollCredential};
pub use messages::{DeviceSummary, PairResponse, PlaybackQueueRequest, parse_device_selector};
pub use types::{BackendKind, DeviceRef, Payload, PollAddress, PollDeviceRef, StatusLevel};
