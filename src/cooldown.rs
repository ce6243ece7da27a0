//! Draw cooldown: one draw submission per address per interval
//!
//! The marker is debited before the draw is submitted, so a failed or
//! crashed submission still counts against the interval.

use crate::cache::SecureCache;
use crate::types::{Address, DRAW_COOLDOWN};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCooldown {
    interval_ms: i64,
}

impl Default for DrawCooldown {
    fn default() -> Self {
        Self::new(DRAW_COOLDOWN)
    }
}

impl DrawCooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms as u64)
    }

    /// Milliseconds left before another draw is allowed, 0 if allowed now.
    ///
    /// A marker dated in the future (clock moved backwards) counts as a draw
    /// made just now.
    pub fn remaining_ms(&self, last_draw: Option<i64>, now: i64) -> i64 {
        let Some(last) = last_draw else {
            return 0;
        };
        let elapsed = now.saturating_sub(last);
        if elapsed < 0 {
            return self.interval_ms;
        }
        self.interval_ms.saturating_sub(elapsed).max(0)
    }

    pub fn is_ready(&self, last_draw: Option<i64>, now: i64) -> bool {
        self.remaining_ms(last_draw, now) == 0
    }

    /// Remaining wait for `address` according to its cached marker
    pub fn check(&self, cache: &SecureCache, address: &Address, now: i64) -> i64 {
        self.remaining_ms(cache.last_draw(address), now)
    }
}
