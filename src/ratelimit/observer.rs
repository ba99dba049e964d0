//! Notifications for rejected checks.

use tracing::warn;

/// Receives a notification every time a check is rejected.
///
/// Observers run synchronously on the calling thread after the decision has
/// been made and the limiter's lock has been released, so an observer may
/// call back into the limiter.
pub trait LimitObserver: Send + Sync {
    /// Called once per rejected check with the rejected key.
    fn on_limit_exceeded(&self, key: &str);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LimitObserver for NoopObserver {
    fn on_limit_exceeded(&self, _key: &str) {}
}

/// Observer that logs each rejection as a `warn` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LimitObserver for TracingObserver {
    fn on_limit_exceeded(&self, key: &str) {
        warn!(key = %key, "Rate limit exceeded");
    }
}

impl<F> LimitObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_limit_exceeded(&self, key: &str) {
        self(key)
    }
}
