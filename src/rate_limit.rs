//! Fixed-window request counter with exponential penalty on exhaustion.
//!
//! The window never rolls over on a timer: it only resets when a caller
//! finds it full and waits out `60s * backoff_factor`. Bursts below the
//! limit are never throttled.
//!
//! The count is checked before a call and incremented only after it
//! succeeds, so callers that arrive together while the window still has
//! room all proceed. A window can therefore admit more than `limit` calls
//! under concurrency; the limit caps completed successes, not calls in
//! flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

use crate::clock::Sleeper;
use crate::metrics::THROTTLE_WAITS;

pub const BASE_BACKOFF: Duration = Duration::from_secs(60);
pub const MAX_BACKOFF_FACTOR: u32 = 64;

// Limiter counters, owned by one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    pub requests_count: u32,
    pub backoff_factor: u32,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self {
            requests_count: 0,
            backoff_factor: 1,
        }
    }
}

pub struct RateLimiter {
    limit: u32,
    // Never held across an await.
    state: Mutex<RateLimiterState>,
    // Serializes callers waiting out a full window.
    gate: tokio::sync::Mutex<()>,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    pub fn new(limit: u32, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(RateLimiterState::default()),
            gate: tokio::sync::Mutex::new(()),
            sleeper,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Wait for a slot. Returns how long the caller was held back, if at all.
    ///
    /// Only one caller waits out a full window at a time. Callers queued
    /// behind it re-check the count once they get the gate, so they find the
    /// fresh window and pass without waiting again. Recording successes
    /// never blocks on a wait in progress.
    pub async fn acquire(&self) -> Option<Duration> {
        if !self.is_full() {
            return None;
        }

        let _gate = self.gate.lock().await;
        let factor = {
            let state = self.lock();
            if state.requests_count < self.limit {
                return None;
            }
            state.backoff_factor
        };

        let wait = BASE_BACKOFF * factor;
        warn!(
            limit = self.limit,
            backoff_factor = factor,
            wait_secs = wait.as_secs(),
            "rate limit reached, backing off"
        );
        THROTTLE_WAITS.inc();
        self.sleeper.sleep(wait).await;

        let mut state = self.lock();
        state.backoff_factor = (state.backoff_factor * 2).min(MAX_BACKOFF_FACTOR);
        state.requests_count = 0;
        Some(wait)
    }

    /// Count a successful call and clear any backoff penalty
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.requests_count = state.requests_count.saturating_add(1);
        state.backoff_factor = 1;
    }

    pub fn snapshot(&self) -> RateLimiterState {
        *self.lock()
    }

    fn is_full(&self) -> bool {
        self.lock().requests_count >= self.limit
    }

    fn lock(&self) -> MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: StdMutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    // Parks every wait until released
    #[derive(Default)]
    struct ParkedSleeper {
        waits: StdMutex<Vec<Duration>>,
        release: Notify,
    }

    #[async_trait]
    impl Sleeper for ParkedSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
            self.release.notified().await;
        }
    }

    async fn until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    fn limiter(limit: u32) -> (RateLimiter, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        (RateLimiter::new(limit, sleeper.clone()), sleeper)
    }

    #[tokio::test]
    async fn below_limit_never_waits() {
        let (limiter, sleeper) = limiter(3);
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, None);
            limiter.record_success();
        }
        assert!(sleeper.waits.lock().unwrap().is_empty());
        assert_eq!(limiter.snapshot().requests_count, 3);
    }

    #[tokio::test]
    async fn exhaustion_waits_and_doubles_factor() {
        let (limiter, sleeper) = limiter(2);
        limiter.record_success();
        limiter.record_success();

        assert_eq!(limiter.acquire().await, Some(Duration::from_secs(60)));
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(60)]);
        assert_eq!(
            limiter.snapshot(),
            RateLimiterState {
                requests_count: 0,
                backoff_factor: 2
            }
        );
    }

    #[tokio::test]
    async fn success_after_throttle_resets_factor() {
        let (limiter, _) = limiter(1);
        limiter.record_success();
        limiter.acquire().await;
        assert_eq!(limiter.snapshot().backoff_factor, 2);

        limiter.record_success();
        assert_eq!(
            limiter.snapshot(),
            RateLimiterState {
                requests_count: 1,
                backoff_factor: 1
            }
        );
    }

    #[tokio::test]
    async fn consecutive_throttles_progress_to_cap() {
        let (limiter, sleeper) = limiter(1);
        for _ in 0..8 {
            // Fill the window without clearing the penalty.
            limiter.lock().requests_count = 1;
            limiter.acquire().await;
        }
        let waits: Vec<u64> = sleeper.waits.lock().unwrap().iter().map(Duration::as_secs).collect();
        assert_eq!(waits, vec![60, 120, 240, 480, 960, 1920, 3840, 3840]);
        assert_eq!(limiter.snapshot().backoff_factor, MAX_BACKOFF_FACTOR);
    }

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        let (limiter, sleeper) = limiter(0);
        assert_eq!(limiter.limit(), 1);
        assert_eq!(limiter.acquire().await, None);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successes_are_recorded_during_a_wait() {
        let sleeper = Arc::new(ParkedSleeper::default());
        let limiter = Arc::new(RateLimiter::new(1, sleeper.clone()));
        limiter.record_success();

        let waiting = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.acquire().await }
        });
        until(|| sleeper.waits.lock().unwrap().len() == 1).await;

        limiter.record_success();
        assert_eq!(limiter.snapshot().requests_count, 2);

        sleeper.release.notify_one();
        assert_eq!(waiting.await.unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(
            limiter.snapshot(),
            RateLimiterState {
                requests_count: 0,
                backoff_factor: 2
            }
        );
    }

    #[tokio::test]
    async fn queued_callers_share_one_wait() {
        let sleeper = Arc::new(ParkedSleeper::default());
        let limiter = Arc::new(RateLimiter::new(1, sleeper.clone()));
        limiter.record_success();

        let first = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.acquire().await }
        });
        until(|| sleeper.waits.lock().unwrap().len() == 1).await;
        let second = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.acquire().await }
        });
        tokio::task::yield_now().await;

        sleeper.release.notify_one();
        assert_eq!(first.await.unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(second.await.unwrap(), None);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 1);
    }
}
