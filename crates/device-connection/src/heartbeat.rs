//! Periodic keep-alive while connected.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// At most one running keep-alive interval per manager.
pub(crate) struct Heartbeat {
    period: Duration,
    interval: Option<Interval>,
}

impl Heartbeat {
    /// A zero period is raised to one millisecond.
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            interval: None,
        }
    }

    /// (Re)starts the interval; the first beat is one period from now.
    pub(crate) fn start(&mut self) {
        self.stop();
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub(crate) fn stop(&mut self) {
        self.interval = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next beat. Never resolves while stopped. Cancel-safe.
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
