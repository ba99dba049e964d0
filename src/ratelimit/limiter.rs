//! Core sliding-window rate limiter implementation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::observer::{LimitObserver, NoopObserver};
use crate::error::{Result, SlidegateError};

/// Default width of the trailing window.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default number of requests allowed per key within one window.
pub const DEFAULT_MAX_REQUESTS: u64 = 60;

/// Quota configuration for a single limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Width of the trailing window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum accepted requests per key within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl LimiterConfig {
    /// Create a configuration with the given window and quota.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Reject configurations the limiter cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(SlidegateError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot returned by [`RateLimiter::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStats {
    /// Entries currently recorded across all keys
    pub total_requests: u64,
    pub window_ms: u64,
    pub max_requests: u64,
}

/// Per-key view returned by [`RateLimiter::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStatus {
    pub key: String,
    /// Accepted requests for this key inside the current window
    pub count: u64,
    /// Requests still allowed before the key hits its quota
    pub remaining: u64,
    /// Milliseconds until the next check for this key can succeed, if the
    /// key is at quota and waiting can help
    pub retry_after_ms: Option<u64>,
}

/// Time-ordered log of accepted requests, with a per-key count index.
#[derive(Default)]
struct RequestLog {
    entries: VecDeque<(u64, Arc<str>)>,
    counts: HashMap<Arc<str>, u64>,
    /// Latest time observed, used to keep timestamps non-decreasing
    last_seen: u64,
}

impl RequestLog {
    fn observe(&mut self, reading: u64) -> u64 {
        self.last_seen = self.last_seen.max(reading);
        self.last_seen
    }

    /// Drop every entry older than `cutoff`, across all keys.
    fn prune(&mut self, cutoff: u64) -> usize {
        let mut removed = 0;
        while let Some((timestamp, _)) = self.entries.front() {
            if *timestamp >= cutoff {
                break;
            }
            if let Some((_, key)) = self.entries.pop_front() {
                if let Some(count) = self.counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        self.counts.remove(&key);
                    }
                }
                removed += 1;
            }
        }
        removed
    }

    fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    fn push(&mut self, timestamp: u64, key: &str) {
        let key: Arc<str> = match self.counts.get_key_value(key) {
            Some((existing, _)) => Arc::clone(existing),
            None => Arc::from(key),
        };
        *self.counts.entry(Arc::clone(&key)).or_insert(0) += 1;
        self.entries.push_back((timestamp, key));
    }

    /// Timestamp of the `n`-th oldest entry for `key`.
    fn nth_timestamp(&self, key: &str, n: u64) -> Option<u64> {
        self.entries
            .iter()
            .filter(|(_, k)| &**k == key)
            .nth(n as usize)
            .map(|(timestamp, _)| *timestamp)
    }

    fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.counts.clear();
    }
}

/// A sliding-window rate limiter keyed by arbitrary strings.
///
/// Every accepted check is recorded in a single time-ordered log. A check
/// for `key` is accepted while fewer than `max_requests` entries for that
/// key fall within `[now - window_ms, now]`. Rejected checks are not
/// recorded.
///
/// The limiter is thread-safe and can be shared across tasks. Counting and
/// appending happen under one lock, so concurrent checks cannot overshoot
/// the quota.
pub struct RateLimiter {
    config: LimiterConfig,
    log: Mutex<RequestLog>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn LimitObserver>,
}

impl RateLimiter {
    /// Create a limiter using the system clock and no observer.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Start building a limiter with custom collaborators.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Decide whether a request for `key` may proceed, recording it if so.
    pub fn check(&self, key: &str) -> bool {
        let allowed = {
            let mut log = self.log.lock();
            let now = log.observe(self.clock.now_ms());
            log.prune(self.cutoff(now));

            let recent = log.count(key);
            trace!(key = %key, recent = recent, now = now, "Checking rate limit");

            if recent >= self.config.max_requests {
                false
            } else {
                log.push(now, key);
                true
            }
        };

        if !allowed {
            debug!(key = %key, max_requests = self.config.max_requests, "Rate limit exceeded");
            self.observer.on_limit_exceeded(key);
        }

        allowed
    }

    /// Forget every recorded request. Configuration is unchanged.
    pub fn reset(&self) {
        self.log.lock().clear();
        debug!("Rate limiter reset");
    }

    /// Prune expired entries and report totals across all keys.
    pub fn stats(&self) -> LimiterStats {
        let mut log = self.log.lock();
        let now = log.observe(self.clock.now_ms());
        log.prune(self.cutoff(now));

        LimiterStats {
            total_requests: log.len(),
            window_ms: self.config.window_ms,
            max_requests: self.config.max_requests,
        }
    }

    /// Prune expired entries and report the state of a single key.
    pub fn status(&self, key: &str) -> KeyStatus {
        let mut log = self.log.lock();
        let now = log.observe(self.clock.now_ms());
        log.prune(self.cutoff(now));

        let count = log.count(key);
        let max = self.config.max_requests;
        let retry_after_ms = if count >= max {
            // The key frees up once enough of its oldest entries fall out.
            log.nth_timestamp(key, count - max)
                .map(|oldest| {
                    oldest
                        .saturating_add(self.config.window_ms)
                        .saturating_add(1)
                        .saturating_sub(now)
                })
        } else {
            None
        };

        KeyStatus {
            key: key.to_string(),
            count,
            remaining: max.saturating_sub(count),
            retry_after_ms,
        }
    }

    /// Remove expired entries now, returning how many were dropped.
    pub fn prune(&self) -> usize {
        let mut log = self.log.lock();
        let now = log.observe(self.clock.now_ms());
        log.prune(self.cutoff(now))
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    fn cutoff(&self, now: u64) -> u64 {
        now.saturating_sub(self.config.window_ms)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            config: LimiterConfig::default(),
            log: Mutex::new(RequestLog::default()),
            clock: Arc::new(SystemClock::new()),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("recorded", &self.log.lock().len())
            .finish()
    }
}

/// Builder for [`RateLimiter`].
#[derive(Default)]
pub struct RateLimiterBuilder {
    config: LimiterConfig,
    clock: Option<Arc<dyn Clock>>,
    observer: Option<Arc<dyn LimitObserver>>,
}

impl RateLimiterBuilder {
    pub fn config(mut self, config: LimiterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn window_ms(mut self, window_ms: u64) -> Self {
        self.config.window_ms = window_ms;
        self
    }

    pub fn max_requests(mut self, max_requests: u64) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the observer notified on every rejected check.
    pub fn on_limit_exceeded(mut self, observer: Arc<dyn LimitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and build the limiter.
    pub fn build(self) -> Result<RateLimiter> {
        self.config.validate()?;

        debug!(
            window_ms = self.config.window_ms,
            max_requests = self.config.max_requests,
            "Creating rate limiter"
        );

        Ok(RateLimiter {
            config: self.config,
            log: Mutex::new(RequestLog::default()),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        })
    }
}
