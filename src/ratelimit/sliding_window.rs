//! Sliding-window request-log limiter.

use std::collections::VecDeque;

use tracing::{debug, info, trace};

use super::backend::{Policy, RateLimiter};
use super::clock::{Clock, SystemClock};
use super::store::ClientStore;
use crate::config::SlidingWindowConfig;
use crate::error::Result;

/// Admits at most `max_requests_per_client` requests per client within any
/// trailing window of `window_size_millis`.
///
/// Every call is recorded in the client's log, admitted or not, so a client
/// that keeps hammering stays rejected until it backs off. Any string is a
/// valid client key, including the empty string.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    config: SlidingWindowConfig,
    clock: C,
    /// Request timestamps per client, oldest first
    logs: ClientStore<VecDeque<u64>>,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a limiter on the system clock.
    pub fn new(config: SlidingWindowConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::new())
    }
}

impl Default for SlidingWindowLimiter<SystemClock> {
    fn default() -> Self {
        Self {
            config: SlidingWindowConfig::default(),
            clock: SystemClock::new(),
            logs: ClientStore::new(),
        }
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a limiter reading time from `clock`.
    pub fn with_clock(config: SlidingWindowConfig, clock: C) -> Result<Self> {
        config.validate()?;
        info!(
            window_size_millis = config.window_size_millis,
            max_requests_per_client = config.max_requests_per_client,
            "Creating sliding window limiter"
        );
        Ok(Self {
            config,
            clock,
            logs: ClientStore::new(),
        })
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// Record a request from `client_key` and decide whether it is admitted.
    pub fn check(&self, client_key: &str) -> bool {
        let now = self.clock.now_millis();
        let log = self.logs.get_or_insert_with(client_key, || {
            debug!(client = %client_key, "Tracking new client");
            VecDeque::new()
        });

        let mut log = log.lock();
        let window_start = now.saturating_sub(self.config.window_size_millis);
        while log.front().is_some_and(|&ts| ts < window_start) {
            log.pop_front();
        }
        log.push_back(now);

        let in_window = log.len() as u64;
        let allowed = in_window <= self.config.max_requests_per_client;

        trace!(
            client = %client_key,
            now = now,
            in_window = in_window,
            allowed = allowed,
            "Checked sliding window"
        );
        if !allowed {
            debug!(
                client = %client_key,
                in_window = in_window,
                limit = self.config.max_requests_per_client,
                "Rate limit exceeded"
            );
        }

        allowed
    }

    /// Size of the client's log as of its last check, rejected calls included.
    ///
    /// Returns `None` for a client that has never been seen.
    pub fn requests_in_window(&self, client_key: &str) -> Option<usize> {
        self.logs.inspect(client_key, VecDeque::len)
    }
}

impl<C: Clock> RateLimiter for SlidingWindowLimiter<C> {
    fn is_request_allowed(&self, client_key: &str) -> Result<bool> {
        Ok(self.check(client_key))
    }

    fn client_count(&self) -> usize {
        self.logs.len()
    }

    fn policy(&self) -> Policy {
        Policy::SlidingWindow
    }
}
