//! Bounded polling with exponential backoff
//!
//! Objects created by a finalized transaction become visible in owner
//! listings only after the indexer catches up. Instead of one fixed sleep,
//! the query is retried with a growing delay until the expected object shows
//! up or the attempt budget is spent.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before the first query (ledger indexing settle time)
pub const INITIAL_POLL_DELAY: Duration = Duration::from_millis(800);

/// Upper bound for a single backoff step
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

pub const POLL_BACKOFF_FACTOR: u32 = 2;

pub const MAX_POLL_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_POLL_DELAY,
            backoff_factor: POLL_BACKOFF_FACTOR,
            max_delay: MAX_POLL_DELAY,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Single query after a fixed settle delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            backoff_factor: 1,
            max_delay: delay,
            max_attempts: 1,
        }
    }

    /// Delay before each attempt, in order
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut next = self.initial_delay.min(self.max_delay);
        (0..self.max_attempts.max(1)).map(move |_| {
            let current = next;
            next = next
                .saturating_mul(self.backoff_factor.max(1))
                .min(self.max_delay);
            current
        })
    }

    /// Worst-case time spent sleeping
    pub fn total_budget(&self) -> Duration {
        self.delays().sum()
    }
}

/// Run `attempt` after each policy delay until it yields `Some`.
///
/// Query errors are retried. If the budget runs out, the last error is
/// returned when the final attempt failed, otherwise `Ok(None)`.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, what: &str, mut attempt: F) -> Result<Option<T>, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut last_err = None;

    for (i, delay) in policy.delays().enumerate() {
        tokio::time::sleep(delay).await;

        match attempt().await {
            Ok(Some(found)) => {
                debug!("Found {} on attempt {}", what, i + 1);
                return Ok(Some(found));
            }
            Ok(None) => {
                debug!("{} not visible yet (attempt {})", what, i + 1);
                last_err = None;
            }
            Err(e) => {
                warn!("Query for {} failed (attempt {}): {}", what, i + 1, e);
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}
