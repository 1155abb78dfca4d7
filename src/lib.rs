//! Turnstile - per-client request admission control
//!
//! This crate decides, request by request, whether a client identified by a
//! key may proceed. Two interchangeable policies are provided behind the
//! [`ratelimit::RateLimiter`] trait: a sliding-window request log and a
//! token bucket. Both keep independent, lock-protected state per client so
//! unrelated clients never contend with each other.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulation;
