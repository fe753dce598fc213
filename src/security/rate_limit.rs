//! Per-client, per-method token bucket rate limiting.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::RateLimitConfig;

/// A token bucket for one (client, method) pair.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A fresh bucket that has already paid for the request creating it.
    fn first_request(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst - 1.0,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, burst: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let available = (self.tokens + elapsed * refill_rate).min(burst);

        // A denial leaves the bucket untouched; refill keeps accruing from the
        // last admitted request.
        if available < 1.0 {
            return false;
        }

        self.tokens = available - 1.0;
        self.last_refill = now;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    client: String,
    method: String,
}

/// The limiter lock was poisoned by a panicking holder.
#[derive(Debug, thiserror::Error)]
#[error("rate limiter state is poisoned")]
pub struct LimiterPoisoned;

/// Token bucket admission gate keyed by (client identity, call method).
///
/// All buckets sit behind one mutex. The key space is bounded by
/// clients × limited methods, and buckets live for the whole process.
#[derive(Debug)]
pub struct MethodRateLimiter {
    refill_rate: f64,
    burst: f64,
    methods: HashSet<String>,
    buckets: Mutex<HashMap<BucketKey, TokenBucket>>,
}

impl MethodRateLimiter {
    pub fn new(refill_rate: f64, burst: u32, methods: impl IntoIterator<Item = String>) -> Self {
        Self {
            refill_rate,
            burst: f64::from(burst),
            methods: methods.into_iter().collect(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.refill_rate, config.burst, config.methods.iter().cloned())
    }

    /// Whether calls to `method` are subject to limiting at all.
    pub fn is_limited(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    /// Decide whether a call may proceed.
    ///
    /// Anonymous callers and methods outside the allow-list are always admitted.
    pub fn allow(&self, client: &str, method: &str) -> Result<bool, LimiterPoisoned> {
        self.allow_at(client, method, Instant::now())
    }

    pub(crate) fn allow_at(
        &self,
        client: &str,
        method: &str,
        now: Instant,
    ) -> Result<bool, LimiterPoisoned> {
        if client.is_empty() || !self.is_limited(method) {
            return Ok(true);
        }

        let key = BucketKey {
            client: client.to_string(),
            method: method.to_string(),
        };

        let mut buckets = self.buckets.lock().map_err(|_| LimiterPoisoned)?;
        match buckets.get_mut(&key) {
            Some(bucket) => Ok(bucket.try_acquire(self.burst, self.refill_rate, now)),
            None => {
                buckets.insert(key, TokenBucket::first_request(self.burst, now));
                Ok(true)
            }
        }
    }

    /// Number of buckets created so far.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }
}
