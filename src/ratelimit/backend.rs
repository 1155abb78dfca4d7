//! Rate limiter trait shared by every admission policy.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::sliding_window::SlidingWindowLimiter;
use super::token_bucket::TokenBucketLimiter;
use crate::config::LimiterConfig;
use crate::error::Result;

/// Client key used by [`RateLimiter::is_global_request_allowed`].
///
/// Every caller using the key-less form shares this one budget.
pub const GLOBAL_CLIENT_KEY: &str = "GLOBAL";

/// The admission algorithm behind a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    SlidingWindow,
    TokenBucket,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::SlidingWindow => write!(f, "sliding_window"),
            Policy::TokenBucket => write!(f, "token_bucket"),
        }
    }
}

/// Trait for rate limiter implementations.
///
/// Callers pick one policy object and use it through this trait; the
/// implementations never depend on each other.
pub trait RateLimiter: Send + Sync {
    /// Decide whether a request from `client_key` may proceed.
    ///
    /// Returns `Ok(false)` when the client is over its budget. An `Err` means
    /// the limiter refused to evaluate the key at all.
    fn is_request_allowed(&self, client_key: &str) -> Result<bool>;

    /// Decide against the shared [`GLOBAL_CLIENT_KEY`] budget.
    fn is_global_request_allowed(&self) -> Result<bool> {
        self.is_request_allowed(GLOBAL_CLIENT_KEY)
    }

    /// Number of distinct clients seen so far.
    fn client_count(&self) -> usize;

    /// The admission algorithm this limiter runs.
    fn policy(&self) -> Policy;
}

/// Build the limiter selected by `config` behind a shared trait object.
pub fn build_limiter(config: &LimiterConfig) -> Result<Arc<dyn RateLimiter>> {
    let limiter: Arc<dyn RateLimiter> = match config {
        LimiterConfig::SlidingWindow(config) => Arc::new(SlidingWindowLimiter::new(*config)?),
        LimiterConfig::TokenBucket(config) => Arc::new(TokenBucketLimiter::new(*config)?),
    };
    info!(policy = %limiter.policy(), "Rate limiter initialized");
    Ok(limiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlidingWindowConfig, TokenBucketConfig};
    use crate::error::TurnstileError;

    #[test]
    fn test_build_selects_policy() {
        let sliding = build_limiter(&LimiterConfig::default()).unwrap();
        assert_eq!(sliding.policy(), Policy::SlidingWindow);

        let bucket =
            build_limiter(&LimiterConfig::TokenBucket(TokenBucketConfig::default())).unwrap();
        assert_eq!(bucket.policy(), Policy::TokenBucket);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = build_limiter(&LimiterConfig::SlidingWindow(SlidingWindowConfig::new(
            0, 5,
        )));
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_policies_are_interchangeable() {
        let limiters = [
            build_limiter(&LimiterConfig::SlidingWindow(SlidingWindowConfig::new(
                60_000, 3,
            )))
            .unwrap(),
            build_limiter(&LimiterConfig::TokenBucket(TokenBucketConfig::new(3, 60_000)))
                .unwrap(),
        ];

        for limiter in &limiters {
            for _ in 0..3 {
                assert!(limiter.is_request_allowed("client").unwrap());
            }
            assert!(!limiter.is_request_allowed("client").unwrap());
            assert_eq!(limiter.client_count(), 1);
        }
    }

    #[test]
    fn test_global_form_shares_one_budget() {
        let limiter = build_limiter(&LimiterConfig::TokenBucket(TokenBucketConfig::new(
            2, 60_000,
        )))
        .unwrap();

        assert!(limiter.is_global_request_allowed().unwrap());
        assert!(limiter.is_request_allowed(GLOBAL_CLIENT_KEY).unwrap());
        assert!(!limiter.is_global_request_allowed().unwrap());
        assert_eq!(limiter.client_count(), 1);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(Policy::SlidingWindow.to_string(), "sliding_window");
        assert_eq!(Policy::TokenBucket.to_string(), "token_bucket");
    }
}
