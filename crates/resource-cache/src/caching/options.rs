use std::time::Duration;

use tokio::time::Instant;

use super::InvalidOptions;

/// Per-request options of [`AsyncResourceCache::request`](super::AsyncResourceCache::request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// How long a successfully produced value stays fresh.
    pub ttl: Duration,
    /// How many times a failed producer is retried, on top of the first attempt.
    pub max_retries: u32,
    /// The wait after failed attempt `n` is `retry_backoff_base * n`.
    pub retry_backoff_base: Duration,
    /// Skips a fresh cache entry, but still joins a request that is already in flight.
    pub force_refresh: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_retries: 2,
            retry_backoff_base: Duration::from_secs(1),
            force_refresh: false,
        }
    }
}

impl RequestOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff_base(mut self, retry_backoff_base: Duration) -> Self {
        self.retry_backoff_base = retry_backoff_base;
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// The total number of attempts a request makes before it fails.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The wait before the attempt following the failed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base.saturating_mul(attempt)
    }

    /// Makes sure every deadline derived from these options can be scheduled.
    pub fn validate(&self) -> Result<(), InvalidOptions> {
        if Instant::now().checked_add(self.ttl).is_none() {
            return Err(InvalidOptions::TtlOutOfRange(self.ttl));
        }

        let longest_backoff = self
            .retry_backoff_base
            .checked_mul(self.max_retries)
            .and_then(|backoff| Instant::now().checked_add(backoff));
        if longest_backoff.is_none() {
            return Err(InvalidOptions::BackoffOverflow {
                base: self.retry_backoff_base,
                max_retries: self.max_retries,
            });
        }

        Ok(())
    }
}
