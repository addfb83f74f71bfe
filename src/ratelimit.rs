//! Token-bucket admission control for outbound API calls
//!
//! One bucket per external source (info API, explorer, rate providers) so a
//! burst against one dependency cannot starve the others. Refill is computed
//! lazily from elapsed time on every call - there is no background timer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Maximum sleep per wait iteration. Keeps waits responsive to refill
/// recomputation even when the deficit is large.
const MAX_WAIT_SLICE_MS: u64 = 1_000;

/// Time source used by the limiter and the fetch client backoff.
///
/// Production uses [`SystemClock`]. Tests substitute a manual clock so that
/// wait behavior can be asserted without real sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Suspend the caller for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by `chrono::Utc` and `tokio::time::sleep`
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A single token bucket: tokens are clamped to [0, capacity] at every
/// observation point.
#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_millis: i64,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64, now_millis: i64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_millis: now_millis,
        }
    }

    /// Credit tokens for the time elapsed since the last observation
    fn refill(&mut self, now_millis: i64) {
        let elapsed_secs = (now_millis - self.last_millis).max(0) as f64 / 1000.0;
        self.last_millis = now_millis;
        self.tokens = (self.tokens + elapsed_secs * self.refill_per_sec).min(self.capacity);
    }
}

/// Registry of named token buckets.
///
/// Explicitly constructed and passed into the fetch client rather than held as
/// hidden global state. `consume` cannot fail - it only delays.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Limiter with the production bucket budgets:
    /// info 1200 cap / 20 per sec, explorer 1200 / 20, rates 60 / 1.
    pub fn with_default_buckets(clock: Arc<dyn Clock>) -> Self {
        let limiter = Self::new(clock);
        limiter.add_bucket("info", 1200.0, 20.0);
        limiter.add_bucket("explorer", 1200.0, 20.0);
        limiter.add_bucket("rates", 60.0, 1.0);
        limiter
    }

    /// Register a bucket for a named source
    pub fn add_bucket(&self, source: &str, capacity: f64, refill_per_sec: f64) {
        let now = self.clock.now_millis();
        let mut buckets = self.buckets.lock().unwrap();
        buckets.insert(source.to_string(), TokenBucket::new(capacity, refill_per_sec, now));
    }

    /// Block until `weight` tokens are available in the source's bucket, then
    /// deduct them atomically.
    ///
    /// Waits in bounded slices (at most 1s each) sized to the token deficit,
    /// recomputing the refill on every iteration. A source with no registered
    /// bucket passes through unlimited.
    pub async fn consume(&self, weight: f64, source: &str) {
        loop {
            let wait_ms = {
                let now = self.clock.now_millis();
                let mut buckets = self.buckets.lock().unwrap();
                let bucket = match buckets.get_mut(source) {
                    Some(b) => b,
                    None => {
                        log::debug!("No rate bucket registered for source '{}', passing through", source);
                        return;
                    }
                };
                bucket.refill(now);
                if bucket.tokens >= weight {
                    bucket.tokens -= weight;
                    return;
                }
                let deficit = weight - bucket.tokens;
                ((deficit / bucket.refill_per_sec) * 1000.0).ceil() as u64
            };

            let slice = wait_ms.min(MAX_WAIT_SLICE_MS).max(1);
            self.clock.sleep(Duration::from_millis(slice)).await;
        }
    }

    /// Current token count for a source (observability hook)
    pub fn tokens(&self, source: &str) -> Option<f64> {
        let now = self.clock.now_millis();
        let mut buckets = self.buckets.lock().unwrap();
        buckets.get_mut(source).map(|b| {
            b.refill(now);
            b.tokens
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockClock;
    use super::*;

    fn make_limiter(capacity: f64, refill: f64) -> (Arc<MockClock>, RateLimiter) {
        let clock = Arc::new(MockClock::new(1_000_000));
        let limiter = RateLimiter::new(clock.clone());
        limiter.add_bucket("test", capacity, refill);
        (clock, limiter)
    }

    #[tokio::test]
    async fn test_consume_within_capacity_does_not_wait() {
        let (clock, limiter) = make_limiter(10.0, 1.0);

        for _ in 0..10 {
            limiter.consume(1.0, "test").await;
        }

        assert_eq!(clock.total_slept_ms(), 0);
        let tokens = limiter.tokens("test").unwrap();
        assert!(tokens.abs() < 1e-9, "bucket should be drained, got {}", tokens);
    }

    #[tokio::test]
    async fn test_wait_proportional_to_deficit() {
        let (clock, limiter) = make_limiter(10.0, 2.0);

        // Drain the bucket, then ask for 4 more tokens: deficit 4 / 2 per sec = 2s
        limiter.consume(10.0, "test").await;
        limiter.consume(4.0, "test").await;

        let slept = clock.total_slept_ms();
        assert!(slept >= 2_000, "expected >= 2000ms wait, got {}", slept);
        // Bounded slices: each individual sleep capped at 1s
        assert!(clock.slept_ms.lock().unwrap().iter().all(|&ms| ms <= 1_000));
        // The wait is the deficit, not a fixed polling granularity
        assert!(slept <= 2_100, "expected ~2000ms wait, got {}", slept);
    }

    #[tokio::test]
    async fn test_refill_clamped_to_capacity() {
        let (clock, limiter) = make_limiter(5.0, 100.0);

        limiter.consume(5.0, "test").await;
        // A long idle period must not overfill the bucket
        clock.advance(60_000);
        let tokens = limiter.tokens("test").unwrap();
        assert!(tokens <= 5.0, "tokens exceeded capacity: {}", tokens);
        assert!((tokens - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_independent_buckets_per_source() {
        let clock = Arc::new(MockClock::new(0));
        let limiter = RateLimiter::new(clock.clone());
        limiter.add_bucket("a", 1.0, 0.5);
        limiter.add_bucket("b", 100.0, 10.0);

        // Drain "a" completely; "b" must stay unaffected
        limiter.consume(1.0, "a").await;
        limiter.consume(1.0, "b").await;

        assert_eq!(clock.total_slept_ms(), 0);
        assert!(limiter.tokens("b").unwrap() > 90.0);
        assert!(limiter.tokens("a").unwrap() < 1.0);
    }

    #[tokio::test]
    async fn test_unregistered_source_passes_through() {
        let (clock, limiter) = make_limiter(1.0, 1.0);
        limiter.consume(100.0, "unknown").await;
        assert_eq!(clock.total_slept_ms(), 0);
    }
}
