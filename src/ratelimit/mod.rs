//! Admission policies and per-client state management.

mod backend;
mod clock;
mod sliding_window;
mod store;
mod token_bucket;

pub use backend::{build_limiter, Policy, RateLimiter, GLOBAL_CLIENT_KEY};
pub use clock::{Clock, ManualClock, SystemClock};
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;
