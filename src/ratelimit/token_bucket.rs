//! Token-bucket limiter.

use tracing::{debug, info, trace};

use super::backend::{Policy, RateLimiter};
use super::clock::{Clock, SystemClock};
use super::store::ClientStore;
use crate::config::TokenBucketConfig;
use crate::error::{Result, TurnstileError};

/// A client's bucket. Both fields change together under the client's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    /// When tokens were last credited
    last_refill_millis: u64,
    tokens_remaining: u64,
}

impl Bucket {
    /// Credit whole intervals elapsed since the last refill, capped at
    /// `max_tokens`. The sub-interval remainder is dropped.
    fn refill(&mut self, now: u64, config: &TokenBucketConfig) {
        let elapsed = now.saturating_sub(self.last_refill_millis);
        let tokens_to_add = elapsed / config.refill_interval_millis;
        self.tokens_remaining = self
            .tokens_remaining
            .saturating_add(tokens_to_add)
            .min(config.max_tokens);
        self.last_refill_millis = now;
    }

    fn try_take(&mut self) -> bool {
        if self.tokens_remaining == 0 {
            return false;
        }
        self.tokens_remaining -= 1;
        true
    }
}

/// Lets each client burst up to `max_tokens` requests, then one request per
/// `refill_interval_millis`.
///
/// Client keys must be non-empty.
pub struct TokenBucketLimiter<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    clock: C,
    buckets: ClientStore<Bucket>,
}

impl TokenBucketLimiter<SystemClock> {
    /// Create a limiter on the system clock.
    pub fn new(config: TokenBucketConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::new())
    }
}

impl Default for TokenBucketLimiter<SystemClock> {
    fn default() -> Self {
        Self {
            config: TokenBucketConfig::default(),
            clock: SystemClock::new(),
            buckets: ClientStore::new(),
        }
    }
}

impl<C: Clock> TokenBucketLimiter<C> {
    /// Create a limiter reading time from `clock`.
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> Result<Self> {
        config.validate()?;
        info!(
            max_tokens = config.max_tokens,
            refill_interval_millis = config.refill_interval_millis,
            "Creating token bucket limiter"
        );
        Ok(Self {
            config,
            clock,
            buckets: ClientStore::new(),
        })
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    /// Refill the client's bucket and try to take one token from it.
    ///
    /// A rejected call still moves the refill timestamp forward, so the next
    /// call measures elapsed time from this attempt.
    pub fn try_acquire(&self, client_key: &str) -> Result<bool> {
        if client_key.is_empty() {
            return Err(TurnstileError::InvalidArgument(
                "client key can not be empty".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        let bucket = self.buckets.get_or_insert_with(client_key, || {
            debug!(client = %client_key, "Tracking new client");
            Bucket {
                last_refill_millis: now,
                tokens_remaining: self.config.max_tokens,
            }
        });

        let mut bucket = bucket.lock();
        bucket.refill(now, &self.config);
        let allowed = bucket.try_take();

        trace!(
            client = %client_key,
            now = now,
            tokens = bucket.tokens_remaining,
            allowed = allowed,
            "Checked token bucket"
        );
        if !allowed {
            debug!(client = %client_key, "Rate limit exceeded");
        }

        Ok(allowed)
    }

    /// Tokens left in the client's bucket as of its last call.
    ///
    /// Does not refill. Returns `None` for a client that has never been seen.
    pub fn tokens_remaining(&self, client_key: &str) -> Option<u64> {
        self.buckets
            .inspect(client_key, |bucket| bucket.tokens_remaining)
    }
}

impl<C: Clock> RateLimiter for TokenBucketLimiter<C> {
    fn is_request_allowed(&self, client_key: &str) -> Result<bool> {
        self.try_acquire(client_key)
    }

    fn client_count(&self) -> usize {
        self.buckets.len()
    }

    fn policy(&self) -> Policy {
        Policy::TokenBucket
    }
}
