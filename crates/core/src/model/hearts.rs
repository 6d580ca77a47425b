use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored heart balance and when it was last written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartBalance {
    pub hearts: u32,
    pub updated_at: DateTime<Utc>,
}

impl HeartBalance {
    #[must_use]
    pub fn new(hearts: u32, updated_at: DateTime<Utc>) -> Self {
        Self { hearts, updated_at }
    }
}

/// Regeneration rule for the shared heart balance.
///
/// One heart comes back per `interval` since the balance was last written, up to `cap`.
/// A balance already at or above the cap is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRefill {
    cap: u32,
    interval: Duration,
}

impl HeartRefill {
    /// Returns `None` for a zero cap or a non-positive interval.
    #[must_use]
    pub fn new(cap: u32, interval: Duration) -> Option<Self> {
        (cap > 0 && interval > Duration::zero()).then_some(Self { cap, interval })
    }

    /// Five hearts, one back every 30 minutes.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            cap: 5,
            interval: Duration::minutes(30),
        }
    }

    #[must_use]
    pub fn cap(&self) -> u32 {
        self.cap
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Hearts available at `now`.
    #[must_use]
    pub fn available(&self, balance: &HeartBalance, now: DateTime<Utc>) -> u32 {
        if balance.hearts >= self.cap {
            return balance.hearts;
        }
        let elapsed = now - balance.updated_at;
        if elapsed <= Duration::zero() {
            return balance.hearts;
        }
        let regained = elapsed.num_seconds() / self.interval.num_seconds().max(1);
        let regained = u32::try_from(regained).unwrap_or(u32::MAX);
        balance.hearts.saturating_add(regained).min(self.cap)
    }

    /// When the next heart comes back, or `None` if the balance is already full.
    #[must_use]
    pub fn next_heart_at(
        &self,
        balance: &HeartBalance,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.available(balance, now) >= self.cap {
            return None;
        }
        let mut at = balance.updated_at + self.interval;
        while at <= now {
            at += self.interval;
        }
        Some(at)
    }
}

impl Default for HeartRefill {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn regains_one_heart_per_interval_up_to_cap() {
        let refill = HeartRefill::standard();
        let empty = HeartBalance::new(0, fixed_now());

        assert_eq!(refill.available(&empty, fixed_now()), 0);
        assert_eq!(refill.available(&empty, fixed_now() + Duration::minutes(29)), 0);
        assert_eq!(refill.available(&empty, fixed_now() + Duration::minutes(30)), 1);
        assert_eq!(refill.available(&empty, fixed_now() + Duration::minutes(95)), 3);
        assert_eq!(refill.available(&empty, fixed_now() + Duration::days(2)), 5);
    }

    #[test]
    fn balance_above_cap_is_kept() {
        let refill = HeartRefill::standard();
        let topped_up = HeartBalance::new(8, fixed_now());
        assert_eq!(refill.available(&topped_up, fixed_now() + Duration::days(1)), 8);
    }

    #[test]
    fn clock_skew_does_not_regain() {
        let refill = HeartRefill::standard();
        let balance = HeartBalance::new(2, fixed_now());
        assert_eq!(refill.available(&balance, fixed_now() - Duration::hours(3)), 2);
    }

    #[test]
    fn next_heart_follows_the_interval_grid() {
        let refill = HeartRefill::new(3, Duration::minutes(10)).unwrap();
        let balance = HeartBalance::new(0, fixed_now());

        assert_eq!(
            refill.next_heart_at(&balance, fixed_now() + Duration::minutes(15)),
            Some(fixed_now() + Duration::minutes(20))
        );
        assert_eq!(
            refill.next_heart_at(&balance, fixed_now() + Duration::minutes(30)),
            None
        );
    }

    #[test]
    fn rejects_degenerate_rules() {
        assert!(HeartRefill::new(0, Duration::minutes(1)).is_none());
        assert!(HeartRefill::new(5, Duration::zero()).is_none());
    }
}
