//! Process-wide token bucket bounding how often repositories are inspected

use crate::cancel::cancellable;
use autoindex_core::error::{Error, Result};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Token bucket with a burst of one
///
/// Acquisition reserves a token up front, possibly driving the balance
/// negative, and then sleeps until the reservation matures. Waiters are
/// therefore served in the order they arrived and never poll.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    burst: f64,
    per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.burst);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// Limit to `per_second` acquisitions per second; `None` or infinity means unlimited
    pub fn new(per_second: Option<f64>) -> Result<Self> {
        match per_second {
            None => Ok(Self::unlimited()),
            Some(rate) if rate.is_infinite() && rate > 0.0 => Ok(Self::unlimited()),
            Some(rate) if rate.is_nan() || rate <= 0.0 => Err(Error::config(format!(
                "rate limit must be positive, got {rate}"
            ))),
            Some(rate) => Ok(Self {
                bucket: Some(Mutex::new(Bucket {
                    tokens: 1.0,
                    burst: 1.0,
                    per_second: rate,
                    last_refill: Instant::now(),
                })),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    pub fn is_unlimited(&self) -> bool {
        self.bucket.is_none()
    }

    /// Take one token, waiting for it if necessary
    ///
    /// Fails with [`Error::Cancelled`] if the token fires before or during
    /// the wait; the reservation is handed back in that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };

        let wait = {
            let mut bucket = bucket.lock().await;
            bucket.refill(Instant::now());
            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(-bucket.tokens / bucket.per_second)
            }
        };

        if wait.is_zero() {
            return Ok(());
        }

        trace!("Waiting {wait:?} for inspection budget");
        let waited = cancellable(cancel, async {
            tokio::time::sleep(wait).await;
            Ok(())
        })
        .await;

        if waited.is_err() {
            let mut bucket = bucket.lock().await;
            bucket.refill(Instant::now());
            bucket.tokens = (bucket.tokens + 1.0).min(bucket.burst);
        }
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_non_positive_rates() {
        assert!(RateLimiter::new(Some(0.0)).is_err());
        assert!(RateLimiter::new(Some(-1.0)).is_err());
        assert!(RateLimiter::new(Some(f64::NAN)).is_err());
        assert!(RateLimiter::new(Some(f64::NEG_INFINITY)).is_err());
    }

    #[test]
    fn test_unlimited_variants() {
        assert!(RateLimiter::new(None).unwrap().is_unlimited());
        assert!(RateLimiter::new(Some(f64::INFINITY)).unwrap().is_unlimited());
        assert!(!RateLimiter::new(Some(1.0)).unwrap().is_unlimited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_token_is_immediate() {
        let limiter = RateLimiter::new(Some(1.0)).unwrap();
        let token = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&token).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisitions_are_spaced_by_rate() {
        let limiter = RateLimiter::new(Some(2.0)).unwrap();
        let token = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire(&token).await.unwrap();
        }
        // One free token, then four more at 500ms each
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_across_tasks() {
        let limiter = Arc::new(RateLimiter::new(Some(1.0)).unwrap());
        let token = CancellationToken::new();
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let token = token.clone();
                tokio::spawn(async move { limiter.acquire(&token).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_returns_reservation() {
        let limiter = Arc::new(RateLimiter::new(Some(0.1)).unwrap());
        let token = CancellationToken::new();
        limiter.acquire(&token).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let token = token.clone();
            tokio::spawn(async move { limiter.acquire(&token).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        // The cancelled reservation no longer delays the next caller
        let fresh = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(&fresh).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancelled_before_acquire() {
        let limiter = RateLimiter::unlimited();
        let token = CancellationToken::new();
        token.cancel();
        assert!(limiter.acquire(&token).await.unwrap_err().is_cancelled());
    }
}
