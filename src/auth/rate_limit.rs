//! Sliding-window attempt tracking with bounded memory.
//!
//! Each key holds the timestamps of its recent attempts; a check counts
//! only the attempts inside the caller's window. The tracked-key set is
//! capped, with least-recently-active eviction, and a background task
//! prunes stale history so memory stays bounded under sustained abuse.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Upper bound on tracked keys before eviction kicks in.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
/// How often the background pass prunes stale attempt history.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Age past which attempts are dropped by the background pass.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rate limit exceeded")]
pub struct RateLimitExceeded;

pub struct RateLimiter {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
    max_entries: usize,
    stop: Mutex<Option<watch::Sender<()>>>,
}

impl RateLimiter {
    /// Create the limiter and spawn its cleanup task.
    ///
    /// Must be called from within a Tokio runtime. The task stops when
    /// [`RateLimiter::stop`] is called or the last handle is dropped.
    #[must_use]
    pub fn new(max_entries: usize, cleanup_interval: Duration, max_age: Duration) -> Arc<Self> {
        let (stop_tx, mut stop_rx) = watch::channel(());
        let limiter = Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            stop: Mutex::new(Some(stop_tx)),
        });

        let weak = Arc::downgrade(&limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            // The first tick completes immediately; skip it so the first
            // real pass happens one full interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(limiter) = weak.upgrade() else { break };
                        limiter.cleanup(max_age);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("Rate limiter cleanup task stopped");
        });

        limiter
    }

    /// Record an attempt for `key` unless it already used up its window.
    ///
    /// Only attempts younger than `window` count toward `max_attempts`; a
    /// rejected call does not record a new attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the key has no allowance left.
    pub fn check_limit(
        &self,
        key: &str,
        max_attempts: usize,
        window: Duration,
    ) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut entries = self.lock_entries();

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            evict_stalest(&mut entries);
        }

        let attempts = entries.entry(key.to_string()).or_default();
        attempts.retain(|at| now.duration_since(*at) < window);
        if attempts.len() >= max_attempts {
            return Err(RateLimitExceeded);
        }
        attempts.push(now);
        Ok(())
    }

    /// Forget a key's history, typically after a successful authentication.
    pub fn reset_limit(&self, key: &str) {
        self.lock_entries().remove(key);
    }

    /// Drop attempts older than `max_age` everywhere and delete keys left
    /// empty.
    ///
    /// This is a memory-hygiene pass, independent of the per-call window
    /// used by [`RateLimiter::check_limit`].
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        entries.retain(|_, attempts| {
            attempts.retain(|at| now.duration_since(*at) < max_age);
            !attempts.is_empty()
        });
    }

    /// Halt the background cleanup task. Safe to call more than once.
    pub fn stop(&self) {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of currently tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Evict the key whose most recent attempt is oldest.
///
/// Not a true access-order LRU: a key with many old attempts goes before a
/// key with a single fresh one, and a key with no attempts left goes first.
fn evict_stalest(entries: &mut HashMap<String, Vec<Instant>>) {
    let stalest = entries
        .iter()
        .min_by_key(|(_, attempts)| attempts.last().copied())
        .map(|(key, _)| key.clone());
    if let Some(key) = stalest {
        debug!("Evicting rate limiter entry for {key}");
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const WINDOW: Duration = Duration::from_millis(80);

    fn quiet_limiter(max_entries: usize) -> Arc<RateLimiter> {
        // Long interval and age keep the background pass out of the way.
        RateLimiter::new(max_entries, Duration::from_secs(3600), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn allows_up_to_max_attempts_then_rejects() {
        let limiter = quiet_limiter(16);

        for _ in 0..3 {
            assert!(limiter.check_limit("key", 3, WINDOW).is_ok());
        }
        assert_eq!(
            limiter.check_limit("key", 3, WINDOW),
            Err(RateLimitExceeded)
        );
        limiter.stop();
    }

    #[tokio::test]
    async fn window_slides_past_old_attempts() {
        let limiter = quiet_limiter(16);

        for _ in 0..3 {
            assert!(limiter.check_limit("key", 3, WINDOW).is_ok());
        }
        assert!(limiter.check_limit("key", 3, WINDOW).is_err());

        sleep(WINDOW + Duration::from_millis(20)).await;
        assert!(limiter.check_limit("key", 3, WINDOW).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn rejected_calls_do_not_consume_allowance() {
        let limiter = quiet_limiter(16);

        assert!(limiter.check_limit("key", 1, WINDOW).is_ok());
        // Repeated rejections must not extend the lockout.
        for _ in 0..5 {
            assert!(limiter.check_limit("key", 1, WINDOW).is_err());
        }
        sleep(WINDOW + Duration::from_millis(20)).await;
        assert!(limiter.check_limit("key", 1, WINDOW).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let limiter = quiet_limiter(16);

        assert!(limiter.check_limit("alpha", 1, WINDOW).is_ok());
        assert!(limiter.check_limit("alpha", 1, WINDOW).is_err());
        assert!(limiter.check_limit("beta", 1, WINDOW).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn reset_forgives_previous_failures() {
        let limiter = quiet_limiter(16);

        assert!(limiter.check_limit("key", 1, WINDOW).is_ok());
        assert!(limiter.check_limit("key", 1, WINDOW).is_err());

        limiter.reset_limit("key");
        assert!(limiter.check_limit("key", 1, WINDOW).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn capacity_is_enforced_by_eviction() {
        let limiter = quiet_limiter(5);

        for key in ["a", "b", "c", "d", "e", "f"] {
            assert!(limiter.check_limit(key, 3, Duration::from_secs(60)).is_ok());
        }
        assert_eq!(limiter.len(), 5);
        limiter.stop();
    }

    #[tokio::test]
    async fn evicts_least_recently_active_key() {
        let limiter = quiet_limiter(2);

        assert!(limiter.check_limit("old", 1, Duration::from_secs(60)).is_ok());
        sleep(Duration::from_millis(10)).await;
        assert!(limiter.check_limit("fresh", 1, Duration::from_secs(60)).is_ok());
        sleep(Duration::from_millis(10)).await;
        // "old" has the oldest most-recent attempt and must be the victim.
        assert!(limiter.check_limit("new", 1, Duration::from_secs(60)).is_ok());
        assert_eq!(limiter.len(), 2);

        // Had "fresh" been evicted instead, "old" would still be exhausted.
        assert!(limiter.check_limit("old", 1, Duration::from_secs(60)).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn evicted_key_starts_fresh() {
        let limiter = quiet_limiter(1);

        assert!(limiter.check_limit("victim", 1, Duration::from_secs(60)).is_ok());
        assert!(limiter.check_limit("victim", 1, Duration::from_secs(60)).is_err());

        // Inserting a second key evicts "victim" entirely.
        assert!(limiter.check_limit("other", 1, Duration::from_secs(60)).is_ok());
        assert!(limiter.check_limit("victim", 1, Duration::from_secs(60)).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn cleanup_drops_only_stale_entries() {
        let limiter = quiet_limiter(16);

        assert!(limiter.check_limit("stale", 5, Duration::from_secs(60)).is_ok());
        sleep(Duration::from_millis(50)).await;
        assert!(limiter.check_limit("live", 5, Duration::from_secs(60)).is_ok());

        limiter.cleanup(Duration::from_millis(40));
        assert_eq!(limiter.len(), 1);

        limiter.cleanup(Duration::from_millis(1));
        sleep(Duration::from_millis(5)).await;
        limiter.cleanup(Duration::from_millis(1));
        assert!(limiter.is_empty());
        limiter.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let limiter = quiet_limiter(16);

        limiter.stop();
        limiter.stop();

        // The limiter itself keeps working after the task is gone.
        assert!(limiter.check_limit("key", 1, WINDOW).is_ok());
        limiter.stop();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_allowance() {
        let limiter = quiet_limiter(16);
        let mut handles = Vec::new();

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                usize::from(limiter.check_limit("shared", 4, Duration::from_secs(60)).is_ok())
            }));
        }

        let mut granted = 0;
        for handle in handles {
            granted += handle.await.expect("task panicked");
        }
        assert_eq!(granted, 4);
        limiter.stop();
    }
}
