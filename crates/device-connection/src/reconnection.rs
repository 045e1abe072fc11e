//! Debounced fixed-delay reconnect timer.

use std::pin::Pin;

use tokio::time::{Instant, Sleep};

use crate::types::ReconnectConfig;

/// Outcome of [`ReconnectTimer::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    /// A new timer was armed for this attempt number.
    Armed { attempt: u32 },
    /// A timer was already pending; nothing changed.
    AlreadyPending,
    /// The retry cap is reached; no timer was armed.
    Exhausted,
}

/// At most one pending reconnect per manager.
pub(crate) struct ReconnectTimer {
    config: ReconnectConfig,
    attempts: u32,
    pending: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            pending: None,
        }
    }

    /// Arms the timer unless one is already pending.
    pub(crate) fn schedule(&mut self) -> Schedule {
        if self.pending.is_some() {
            return Schedule::AlreadyPending;
        }
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return Schedule::Exhausted;
        }
        self.attempts = self.attempts.saturating_add(1);
        self.pending = Some(Box::pin(tokio::time::sleep_until(
            Instant::now() + self.config.delay,
        )));
        Schedule::Armed {
            attempt: self.attempts,
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.pending = None;
    }

    /// Cancels any pending timer and forgets past attempts.
    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn delay_secs(&self) -> f64 {
        self.config.delay.as_secs_f64()
    }

    /// Resolves when the pending timer fires, disarming it. Never resolves
    /// while nothing is pending. Cancel-safe.
    pub(crate) async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.pending = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
