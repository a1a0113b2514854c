//! Token-bucket gate for channels whose API throttles aggressively.

use crate::error::NotifyError;
use crate::ChannelSender;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Classic token bucket: `tokens += elapsed * rate`, clamped to `burst`.
/// When empty, [`acquire`](TokenBucket::acquire) sleeps exactly
/// `(1 - tokens) / rate` seconds — without holding the mutex — and resumes
/// with an empty bucket.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full (`tokens = burst`).
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        let wait = {
            let mut s = self.state.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(s.last_refill).as_secs_f64();
            s.last_refill = now;
            s.tokens = (s.tokens + elapsed * self.rate).min(self.burst);
            if s.tokens >= 1.0 {
                s.tokens -= 1.0;
                return;
            }
            Duration::from_secs_f64((1.0 - s.tokens) / self.rate)
        };

        // The lock is released before sleeping so other callers can refill.
        tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");
        tokio::time::sleep(wait).await;

        let mut s = self.state.lock().await;
        s.tokens = 0.0;
        s.last_refill = Instant::now();
    }
}

/// Wraps a sender so every delivery first takes a token.
pub struct RateLimitedSender {
    inner: Box<dyn ChannelSender>,
    bucket: TokenBucket,
}

impl RateLimitedSender {
    pub fn new(inner: Box<dyn ChannelSender>, rate: f64, burst: f64) -> Self {
        Self {
            inner,
            bucket: TokenBucket::new(rate, burst),
        }
    }
}

#[async_trait]
impl ChannelSender for RateLimitedSender {
    async fn send(
        &self,
        config: &str,
        title: &str,
        body: &str,
        is_recovery: bool,
    ) -> Result<(), NotifyError> {
        self.bucket.acquire().await;
        self.inner.send(config, title, body, is_recovery).await
    }

    fn channel_type(&self) -> &str {
        self.inner.channel_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_free_then_callers_wait() {
        let bucket = TokenBucket::new(5.0, 3.0);
        let start = Instant::now();

        // Initial burst of 3 acquires instantly.
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Fourth acquire: tokens = 0, wait = (1 - 0) / 5 = 200ms.
        bucket.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250),
            "waited {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_refill_with_time() {
        let bucket = TokenBucket::new(5.0, 3.0);
        for _ in 0..3 {
            bucket.acquire().await;
        }

        // One second refills to burst; the next three acquires are free.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let start = Instant::now();
        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
