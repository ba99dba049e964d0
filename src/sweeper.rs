//! Periodic background pruning.
//!
//! Limiters prune lazily on every check, so a limiter that goes idle after a
//! burst keeps its entries until the next call. The sweeper bounds that
//! memory by pruning on a fixed interval. It never changes decisions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::ratelimit::RateLimiterBackend;

/// Handle to a running sweep task.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that prunes `target` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(target: Arc<dyn RateLimiterBackend>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        debug!(interval_ms = interval.as_millis() as u64, "Starting rate limit sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = target.prune();
                        if removed > 0 {
                            trace!(removed = removed, "Swept expired rate limit entries");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Rate limit sweeper stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Rate limit sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, RateLimiter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a limiter and records what the sweeper does to it.
    struct CountingBackend {
        inner: RateLimiter,
        sweeps: AtomicUsize,
        removed: AtomicUsize,
    }

    impl RateLimiterBackend for CountingBackend {
        fn check(&self, key: &str) -> bool {
            self.inner.check(key)
        }

        fn prune(&self) -> usize {
            let removed = self.inner.prune();
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            self.removed.fetch_add(removed, Ordering::SeqCst);
            removed
        }
    }

    fn create_counting_backend(clock: &ManualClock) -> Arc<CountingBackend> {
        let inner = RateLimiter::builder()
            .window_ms(1000)
            .max_requests(10)
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        Arc::new(CountingBackend {
            inner,
            sweeps: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_sweeper_prunes_idle_entries() {
        let clock = ManualClock::new(0);
        let backend = create_counting_backend(&clock);

        assert!(backend.check("/a"));
        assert!(backend.check("/b"));
        clock.set(2000);

        let sweeper = Sweeper::spawn(backend.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.shutdown().await;

        assert!(backend.sweeps.load(Ordering::SeqCst) >= 1);
        assert_eq!(backend.removed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let clock = ManualClock::new(0);
        let backend = create_counting_backend(&clock);

        let sweeper = Sweeper::spawn(backend.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        sweeper.shutdown().await;

        let sweeps = backend.sweeps.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.sweeps.load(Ordering::SeqCst), sweeps);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_sweeper() {
        let clock = ManualClock::new(0);
        let backend = create_counting_backend(&clock);

        let sweeper = Sweeper::spawn(backend.clone(), Duration::from_millis(5));
        assert_eq!(Arc::strong_count(&backend), 2);
        drop(sweeper);

        // The task releases its reference once it sees the closed channel.
        for _ in 0..100 {
            if Arc::strong_count(&backend) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(Arc::strong_count(&backend), 1);
    }

    #[tokio::test]
    async fn test_sweeper_does_not_change_decisions() {
        let clock = ManualClock::new(0);
        let backend = create_counting_backend(&clock);
        let sweeper = Sweeper::spawn(backend.clone(), Duration::from_millis(1));

        for _ in 0..10 {
            assert!(backend.check("/a"));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!backend.check("/a"));

        sweeper.shutdown().await;
    }
}
