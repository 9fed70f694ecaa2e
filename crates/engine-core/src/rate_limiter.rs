//! Token bucket used to pace origin reads and target writes.
//!
//! One bucket is shared by every partition of a job; callers await
//! [`RateLimiter::acquire`] and are parked until enough tokens have refilled.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::trace;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    /// Permits per second. 0 = unlimited.
    rate: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a bucket that starts full, holding one second worth of permits.
    pub fn new(permits_per_second: u32) -> Self {
        Self {
            rate: permits_per_second,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(permits_per_second),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate == 0
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Waits until `permits` tokens are available and consumes them.
    ///
    /// Requests larger than the bucket capacity are admitted once the bucket
    /// is full and leave it in debt, so a batch of any size always completes.
    pub async fn acquire(&self, permits: u32) {
        if self.is_unlimited() || permits == 0 {
            return;
        }

        let wait = self.reserve(permits);
        if !wait.is_zero() {
            trace!(permits, wait_ms = wait.as_millis() as u64, "Rate limited");
            tokio::time::sleep(wait).await;
        }
    }

    /// Consumes `permits` tokens if they are available right now.
    pub fn try_acquire(&self, permits: u32) -> bool {
        if self.is_unlimited() || permits == 0 {
            return true;
        }

        let mut bucket = self.lock();
        self.refill(&mut bucket);
        let needed = f64::from(permits).min(f64::from(self.rate));
        if bucket.tokens >= needed {
            bucket.tokens -= f64::from(permits);
            true
        } else {
            false
        }
    }

    /// Takes the tokens up front and returns how long the caller must wait
    /// for the bucket to pay them back.
    fn reserve(&self, permits: u32) -> Duration {
        let mut bucket = self.lock();
        self.refill(&mut bucket);

        let rate = f64::from(self.rate);
        let needed = f64::from(permits).min(rate);
        let deficit = needed - bucket.tokens;
        bucket.tokens -= f64::from(permits);

        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / rate)
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let capacity = f64::from(self.rate);
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);
        bucket.last_refill = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // A poisoned bucket still holds a usable token count.
        self.bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}
