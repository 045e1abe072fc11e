//! Hand-off slot between an out-of-band PIN entry and a pairing attempt.

use std::sync::{Arc, Mutex};

use atvlink_protocol::constants::PIN_LENGTH;

/// Single-value PIN slot. Last write wins; nothing is queued.
///
/// Each [`PairingCoordinator`](crate::pairing::PairingCoordinator) owns its
/// relay, so concurrent coordinators never share a slot.
#[derive(Debug, Clone, Default)]
pub struct PinRelay {
    slot: Arc<Mutex<Option<String>>>,
}

impl PinRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the slot.
    pub fn set_pin(&self, code: impl Into<String>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(code.into());
        }
    }

    /// Takes the PIN if the slot holds exactly [`PIN_LENGTH`] characters.
    ///
    /// Any other value is left in place.
    pub fn try_take_pin(&self) -> Option<String> {
        let mut slot = self.slot.lock().ok()?;
        let ready = slot
            .as_deref()
            .is_some_and(|pin| pin.chars().count() == PIN_LENGTH);
        if ready { slot.take() } else { None }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}
