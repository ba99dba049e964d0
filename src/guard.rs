//! Rate-limited outbound calls.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SlidegateError};
use crate::ratelimit::RateLimiterBackend;

/// Runs outbound calls only when the rate limiter admits their key.
///
/// The guard does not queue or delay: a call whose key is over quota is
/// skipped and reported as [`SlidegateError::Throttled`], leaving the caller
/// to decide whether to drop, retry later, or surface the error.
pub struct OutboundGuard<B: RateLimiterBackend + ?Sized> {
    /// The rate limiter instance
    backend: Arc<B>,
}

impl<B: RateLimiterBackend + ?Sized> OutboundGuard<B> {
    /// Create a new guard over the given rate limiter.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Check `key` and, if admitted, run the call produced by `call`.
    ///
    /// `call` is never invoked for a rejected key.
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn call<F, Fut, T>(&self, key: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.backend.check(key) {
            warn!("Skipping outbound call, rate limit exceeded");
            return Err(SlidegateError::Throttled {
                key: key.to_string(),
            });
        }

        debug!("Forwarding outbound call");
        Ok(call().await)
    }

    /// The rate limiter this guard consults.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: RateLimiterBackend + ?Sized> Clone for OutboundGuard<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}
