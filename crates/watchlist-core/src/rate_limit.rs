use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{WatchlistError, WatchlistResult};

struct Window {
    started: Instant,
    count: u32,
}

/// Key shared by every call that carries no identity.
pub const ANONYMOUS: &str = "anonymous";

/// Fixed-window call counter per (requester, action).
///
/// Safe to share across worker threads; each increment happens under the
/// map's per-entry lock. Unauthenticated calls share one window per action
/// with its own, larger, limit.
pub struct RateLimiter {
    windows: DashMap<(String, String), Window>,
    max_requests: u32,
    anonymous_max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests,
            anonymous_max_requests: config.anonymous_max_requests,
            window: config.window,
        }
    }

    /// Count one call. Fails with the time left in the current window once
    /// the limit is exceeded.
    pub fn check(&self, requester: &str, action: &str) -> WatchlistResult<()> {
        self.hit(requester, action, self.max_requests)
    }

    /// Count one unauthenticated call.
    pub fn check_anonymous(&self, action: &str) -> WatchlistResult<()> {
        self.hit(ANONYMOUS, action, self.anonymous_max_requests)
    }

    fn hit(&self, requester: &str, action: &str, max_requests: u32) -> WatchlistResult<()> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((requester.to_string(), action.to_string()))
            .or_insert(Window {
                started: now,
                count: 0,
            });
        let window = entry.value_mut();

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        window.count += 1;
        if window.count > max_requests {
            let retry_after = self.window.saturating_sub(now.duration_since(window.started));
            tracing::warn!(
                "Rate limit hit for {} on {} ({} calls in window)",
                requester,
                action,
                window.count
            );
            return Err(WatchlistError::RateLimited { retry_after });
        }
        Ok(())
    }

    /// Remove windows that have expired.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Run `cleanup` every `every` until the handle is aborted.
    pub fn spawn_cleanup(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.cleanup();
                tracing::debug!("Rate limiter cleanup, {} windows tracked", self.tracked());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            anonymous_max_requests: max_requests * 3,
            window: Duration::from_secs(window_secs),
            cleanup_interval: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_exceeded_reports_remaining_window() {
        let limiter = limiter(2, 10);
        limiter.check("alice", "add_item").unwrap();
        limiter.check("alice", "add_item").unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        let err = limiter.check("alice", "add_item").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        match err {
            WatchlistError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(6));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, 10);
        limiter.check("alice", "add_item").unwrap();
        limiter.check("alice", "add_note").unwrap();
        limiter.check("bob", "add_item").unwrap();
        assert!(limiter.check("alice", "add_item").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_has_its_own_limit() {
        let limiter = limiter(1, 10);
        for _ in 0..3 {
            limiter.check_anonymous("list_public_watchlists").unwrap();
        }
        assert!(limiter.check_anonymous("list_public_watchlists").is_err());

        limiter.check("alice", "list_public_watchlists").unwrap();
        assert!(limiter.check("alice", "list_public_watchlists").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_count() {
        let limiter = limiter(1, 10);
        limiter.check("alice", "get_stats").unwrap();
        assert!(limiter.check("alice", "get_stats").is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.check("alice", "get_stats").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_purges_expired() {
        let limiter = limiter(5, 10);
        limiter.check("alice", "a").unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.check("bob", "a").unwrap();
        assert_eq!(limiter.tracked(), 2);

        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.cleanup();
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup() {
        let limiter = Arc::new(limiter(5, 1));
        limiter.check("alice", "a").unwrap();
        let handle = limiter.clone().spawn_cleanup(Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.tracked(), 0);
        handle.abort();
    }
}
