//! Rate limiting logic and state management.

mod backend;
mod clock;
mod limiter;
mod observer;
mod registry;
mod rules;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{
    KeyStatus, LimiterConfig, LimiterStats, RateLimiter, RateLimiterBuilder, DEFAULT_MAX_REQUESTS,
    DEFAULT_WINDOW_MS,
};
pub use observer::{LimitObserver, NoopObserver, TracingObserver};
pub use registry::{LimiterRegistry, RegistryStats};
pub use rules::{RuleConfig, RuleSet};
