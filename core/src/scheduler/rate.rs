//! Token-bucket rate limiter.
//!
//! One bucket guards one module. The bucket starts full at `burst`
//! tokens and refills continuously at `rate` tokens per second, so a
//! burst of executions may start back-to-back before pacing enforces
//! the configured inter-request spacing.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use sondr_common::config::RateLimit;

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
    pub fn new(limit: RateLimit) -> Self {
        let burst = f64::from(limit.burst.max(1));
        Self {
            rate: limit.rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_drains_without_waiting() {
        let bucket = TokenBucket::new(RateLimit { rate: 1.0, burst: 3 });

        let before = Instant::now();
        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_bucket_paces_at_configured_rate() {
        let bucket = TokenBucket::new(RateLimit { rate: 2.0, burst: 1 });
        bucket.acquire().await;

        let before = Instant::now();
        bucket.acquire().await;
        let spacing = Instant::now().duration_since(before);

        // 2 tokens per second: about half a second apart.
        assert!(spacing >= Duration::from_millis(450), "spacing {spacing:?}");
        assert!(spacing <= Duration::from_millis(600), "spacing {spacing:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_up_to_burst() {
        let bucket = TokenBucket::new(RateLimit { rate: 10.0, burst: 2 });
        bucket.acquire().await;
        bucket.acquire().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        // Refill is capped at burst, a third immediate acquire waits.
        let before = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(Instant::now(), before);
        bucket.acquire().await;
        assert!(Instant::now() > before);
    }
}
