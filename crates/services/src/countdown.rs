//! Wall-clock driver for timed sessions.
//!
//! The engine only counts `tick()` calls; this type produces them once per second from a
//! tokio interval. Tests can skip it and call `tick()` directly.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// One tick per `period`, starting one period from now.
#[derive(Debug)]
pub struct Countdown {
    interval: Interval,
}

impl Countdown {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        // A stalled runtime still owes the user every second that passed.
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self { interval }
    }

    #[must_use]
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Wait for the next tick. Cancel-safe, so it can sit in a `tokio::select!` arm.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}
