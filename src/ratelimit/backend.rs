//! Rate limiter trait for abstracting single limiters and rule registries.

use super::limiter::RateLimiter;
use super::registry::LimiterRegistry;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over a single `RateLimiter` and a `LimiterRegistry`
/// so outbound call sites and the background sweeper can work with either.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request for `key` may proceed.
    fn check(&self, key: &str) -> bool;

    /// Drop expired entries, returning how many were removed.
    fn prune(&self) -> usize;
}

impl RateLimiterBackend for RateLimiter {
    fn check(&self, key: &str) -> bool {
        RateLimiter::check(self, key)
    }

    fn prune(&self) -> usize {
        RateLimiter::prune(self)
    }
}

impl RateLimiterBackend for LimiterRegistry {
    fn check(&self, key: &str) -> bool {
        LimiterRegistry::check(self, key)
    }

    fn prune(&self) -> usize {
        LimiterRegistry::prune(self)
    }
}
