//! Per-model rate limiting with a sliding one-minute window
//!
//! The limiter does not sleep itself: it reports how long a caller has to wait
//! before the next request, and the trial runner performs the wait.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter combining request and token budgets with a minimum spacing
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u32,
    min_interval: Duration,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u32)>,
}

impl WindowState {
    fn evict(&mut self, now: Instant) {
        while matches!(self.requests.front(), Some(&t) if now.duration_since(t) > WINDOW) {
            self.requests.pop_front();
        }
        while matches!(self.tokens.front(), Some(&(t, _)) if now.duration_since(t) > WINDOW) {
            self.tokens.pop_front();
        }
    }

    fn used_tokens(&self) -> u64 {
        self.tokens.iter().map(|&(_, t)| u64::from(t)).sum()
    }
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            min_interval: Duration::ZERO,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Require at least `interval` between two consecutive requests
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// How long to wait before the next request may be sent
    pub async fn delay(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.evict(now);

        let mut wait = Duration::ZERO;

        if let Some(&last) = state.requests.back() {
            let since = now.duration_since(last);
            if since < self.min_interval {
                wait = wait.max(self.min_interval - since);
            }
        }

        if state.requests.len() >= self.requests_per_minute as usize {
            if let Some(&oldest) = state.requests.front() {
                wait = wait.max(WINDOW.saturating_sub(now.duration_since(oldest)) + Duration::from_millis(10));
            }
        }

        if state.used_tokens() >= u64::from(self.tokens_per_minute) {
            if let Some(&(oldest, _)) = state.tokens.front() {
                wait = wait.max(WINDOW.saturating_sub(now.duration_since(oldest)) + Duration::from_millis(10));
            }
        }

        (!wait.is_zero()).then_some(wait)
    }

    /// Record that a request is being sent
    pub async fn record_request(&self) {
        let mut state = self.state.lock().await;
        state.requests.push_back(Instant::now());
    }

    /// Record token usage for rate limiting
    pub async fn record_tokens(&self, tokens: u32) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.evict(now);
        state.tokens.push_back((now, tokens));
    }

    /// Tokens used in the last minute
    pub async fn current_token_usage(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.evict(Instant::now());
        state.used_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_under_limits() {
        let limiter = RateLimiter::new(5, 1000);
        for _ in 0..4 {
            limiter.record_request().await;
        }
        assert_eq!(limiter.delay().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_when_request_window_full() {
        let limiter = RateLimiter::new(2, 1000);
        limiter.record_request().await;
        limiter.record_request().await;

        let wait = limiter.delay().await.unwrap();
        assert!(wait > Duration::from_secs(59));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.delay().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval() {
        let limiter = RateLimiter::new(100, 1000).with_min_interval(Duration::from_millis(500));
        limiter.record_request().await;
        tokio::time::advance(Duration::from_millis(200)).await;

        assert_eq!(limiter.delay().await, Some(Duration::from_millis(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_recording() {
        let limiter = RateLimiter::new(60, 250);
        limiter.record_tokens(100).await;
        limiter.record_tokens(200).await;

        assert_eq!(limiter.current_token_usage().await, 300);
        assert!(limiter.delay().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_token_records_do_not_overflow() {
        let limiter = RateLimiter::new(60, u32::MAX);
        limiter.record_tokens(u32::MAX).await;
        limiter.record_tokens(u32::MAX).await;

        assert_eq!(limiter.current_token_usage().await, 2 * u64::from(u32::MAX));
        assert!(limiter.delay().await.is_some());
    }
}
