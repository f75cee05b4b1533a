//! Process-wide admission control for outbound fetches
//!
//! Grants are spaced on a single shared schedule: every `acquire` reserves
//! the next free slot under a lock and then sleeps until that slot, so the
//! long-run rate never exceeds the configured requests per second no matter
//! how many workers are waiting.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returned when the cancellation token fires before a slot is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Smooth rate limiter shared by all workers
#[derive(Debug)]
pub struct RateLimiter {
    /// Spacing between two grants
    interval: Duration,

    /// Earliest instant the next grant may be issued at
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `requests_per_second` grants per second
    ///
    /// A rate of zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rate = requests_per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / rate,
            next_slot: Mutex::new(None),
        }
    }

    /// Spacing between consecutive grants
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the next admission slot
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The caller may proceed
    /// * `Err(Cancelled)` - The token fired first; the reserved slot is not returned
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let slot = self.reserve(Instant::now());

        if slot <= Instant::now() {
            return Ok(());
        }

        tracing::trace!(
            "Waiting {:?} for a rate slot",
            slot.saturating_duration_since(Instant::now())
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }

    /// Claims the next free slot at or after `now`
    fn reserve(&self, now: Instant) -> Instant {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);

        let slot = match *next {
            Some(scheduled) if scheduled > now => scheduled,
            _ => now,
        };
        *next = Some(slot + self.interval);

        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_interval_from_rate() {
        assert_eq!(RateLimiter::new(1).interval(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new(4).interval(), Duration::from_millis(250));
        assert_eq!(RateLimiter::new(0).interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_reserve_spaces_slots() {
        let limiter = RateLimiter::new(10);
        let now = Instant::now();

        let first = limiter.reserve(now);
        let second = limiter.reserve(now);
        let third = limiter.reserve(now);

        assert_eq!(first, now);
        assert_eq!(second - first, Duration::from_millis(100));
        assert_eq!(third - second, Duration::from_millis(100));
    }

    #[test]
    fn test_reserve_after_idle_is_immediate() {
        let limiter = RateLimiter::new(10);
        let now = Instant::now();
        limiter.reserve(now);

        let later = now + Duration::from_secs(5);
        assert_eq!(limiter.reserve(later), later);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_paces_grants() {
        let limiter = RateLimiter::new(5);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.acquire(&cancel).await.unwrap();
        }

        // Six grants at 200ms spacing: the first is immediate.
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(RateLimiter::new(10));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.unwrap();
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap() - start);
        }
        grants.sort();

        // At most one grant per 100ms slot.
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_returns_when_cancelled() {
        let limiter = Arc::new(RateLimiter::new(1));
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    }

    #[tokio::test]
    async fn test_acquire_with_fired_token() {
        let limiter = RateLimiter::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(limiter.acquire(&cancel).await, Err(Cancelled));
    }
}
