use crate::error::AppError;
use dashmap::DashMap;
use std::time::Instant;

#[derive(Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_update: now,
        }
    }

    fn allow_request(&mut self, tokens: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(
            self.capacity as f64,
            self.tokens + elapsed * self.refill_rate,
        );
        self.last_update = now;

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }
}

/// Per-key token buckets, keyed as `"<caller>:<scope>"`.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: u32,
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate,
        }
    }

    pub fn check_rate_limit(&self, key: &str) -> Result<(), AppError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), AppError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.capacity, self.refill_rate, now));

        if bucket.allow_request(1, now) {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(format!("Rate limit for {}", key)))
        }
    }
}
