use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-author command throttle. Each author gets a bucket of `burst` tokens
/// that regains one token every `refill_every`.
///
/// Owned by the tracker task, so it needs no locking.
pub struct RateLimiter {
    burst: f64,
    refill_every: Duration,
    buckets: HashMap<String, Bucket>,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    available: f64,
    touched: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            available: burst,
            touched: now,
        }
    }

    fn refill(&mut self, now: Instant, burst: f64, refill_every: Duration) {
        let earned = now.saturating_duration_since(self.touched).as_secs_f64()
            / refill_every.as_secs_f64();
        self.available = (self.available + earned).min(burst);
        self.touched = now;
    }
}

impl RateLimiter {
    pub fn new(burst: u32, refill_every: Duration) -> Self {
        Self {
            burst: f64::from(burst),
            refill_every,
            buckets: HashMap::new(),
        }
    }

    /// Spend one token for `author`. False means the command is throttled.
    pub fn check(&mut self, author: &str) -> bool {
        self.check_at(author, Instant::now())
    }

    fn check_at(&mut self, author: &str, now: Instant) -> bool {
        let bucket = self
            .buckets
            .entry(author.to_string())
            .or_insert_with(|| Bucket::full(self.burst, now));
        bucket.refill(now, self.burst, self.refill_every);

        if bucket.available < 1.0 {
            return false;
        }
        bucket.available -= 1.0;
        true
    }

    /// Forget authors not seen for `idle`.
    pub fn cleanup(&mut self, idle: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.touched) < idle);
    }

    pub fn tracked_authors(&self) -> usize {
        self.buckets.len()
    }
}
