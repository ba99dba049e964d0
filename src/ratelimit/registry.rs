//! A set of limiters selected by prefix rules.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{LimiterConfig, LimiterStats, RateLimiter};
use super::observer::{LimitObserver, NoopObserver};
use super::rules::RuleSet;
use crate::error::Result;

/// Stats for every limiter in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub default: LimiterStats,
    /// Rule name and stats, in rule declaration order
    pub rules: Vec<(String, LimiterStats)>,
}

/// Routes each key to the limiter of the rule that governs it.
///
/// Every rule gets its own [`RateLimiter`]; keys that match no rule share the
/// default limiter. All limiters use the same clock and observer.
pub struct LimiterRegistry {
    rules: RuleSet,
    limiters: Vec<Arc<RateLimiter>>,
    default: Arc<RateLimiter>,
}

impl LimiterRegistry {
    /// Build a registry on the system clock with no observer.
    pub fn new(default: LimiterConfig, rules: RuleSet) -> Result<Self> {
        Self::with_collaborators(
            default,
            rules,
            Arc::new(SystemClock::new()),
            Arc::new(NoopObserver),
        )
    }

    /// Build a registry with an explicit clock and observer.
    pub fn with_collaborators(
        default: LimiterConfig,
        rules: RuleSet,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn LimitObserver>,
    ) -> Result<Self> {
        rules.validate()?;

        let build = |config: LimiterConfig| {
            RateLimiter::builder()
                .config(config)
                .clock(Arc::clone(&clock))
                .on_limit_exceeded(Arc::clone(&observer))
                .build()
                .map(Arc::new)
        };

        let default = build(default)?;
        let limiters = rules
            .rules()
            .iter()
            .map(|rule| build(rule.limit()))
            .collect::<Result<Vec<_>>>()?;

        debug!(rules = limiters.len(), "Limiter registry initialized");

        Ok(Self {
            rules,
            limiters,
            default,
        })
    }

    /// Check `key` against the limiter that governs it.
    pub fn check(&self, key: &str) -> bool {
        let (rule, limiter) = self.route(key);
        trace!(key = %key, rule = rule.unwrap_or("default"), "Routing rate limit check");
        limiter.check(key)
    }

    /// Name of the rule governing `key`, or `None` for the default limiter.
    pub fn rule_for(&self, key: &str) -> Option<&str> {
        self.route(key).0
    }

    /// The limiter that governs `key`.
    pub fn limiter_for(&self, key: &str) -> &Arc<RateLimiter> {
        self.route(key).1
    }

    /// Reset every limiter in the registry.
    pub fn reset(&self) {
        self.default.reset();
        for limiter in &self.limiters {
            limiter.reset();
        }
    }

    /// Prune every limiter, returning the total number of removed entries.
    pub fn prune(&self) -> usize {
        self.limiters
            .iter()
            .fold(self.default.prune(), |removed, limiter| removed + limiter.prune())
    }

    /// Stats for the default limiter and each rule.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            default: self.default.stats(),
            rules: self
                .rules
                .rules()
                .iter()
                .zip(&self.limiters)
                .map(|(rule, limiter)| (rule.name.clone(), limiter.stats()))
                .collect(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn route(&self, key: &str) -> (Option<&str>, &Arc<RateLimiter>) {
        match self.rules.find_index(key) {
            Some(index) => (
                Some(self.rules.rules()[index].name.as_str()),
                &self.limiters[index],
            ),
            None => (None, &self.default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::rules::RuleConfig;
    use parking_lot::Mutex;

    fn create_test_registry(clock: &ManualClock) -> LimiterRegistry {
        let rules = RuleSet::from_rules(vec![
            RuleConfig::new("wallet", "/api/wallet", LimiterConfig::new(1000, 1)),
            RuleConfig::new("tasks", "/api/tasks", LimiterConfig::new(500, 2)),
        ])
        .unwrap();

        LimiterRegistry::with_collaborators(
            LimiterConfig::new(1000, 3),
            rules,
            Arc::new(clock.clone()),
            Arc::new(NoopObserver),
        )
        .unwrap()
    }

    #[test]
    fn test_routes_by_rule() {
        let clock = ManualClock::new(0);
        let registry = create_test_registry(&clock);

        assert_eq!(registry.rule_for("/api/wallet/withdraw"), Some("wallet"));
        assert_eq!(registry.rule_for("/api/tasks/7/comments"), Some("tasks"));
        assert_eq!(registry.rule_for("/api/agents"), None);
        assert_eq!(registry.limiter_for("/api/tasks").config(), LimiterConfig::new(500, 2));
    }

    #[test]
    fn test_each_rule_enforces_its_own_quota() {
        let clock = ManualClock::new(0);
        let registry = create_test_registry(&clock);

        assert!(registry.check("/api/wallet/withdraw"));
        assert!(!registry.check("/api/wallet/withdraw"));

        assert!(registry.check("/api/tasks/1"));
        assert!(registry.check("/api/tasks/1"));
        assert!(!registry.check("/api/tasks/1"));

        // Rule windows are independent.
        clock.set(501);
        assert!(registry.check("/api/tasks/1"));
        assert!(!registry.check("/api/wallet/withdraw"));
    }

    #[test]
    fn test_keys_stay_distinct_within_a_rule() {
        let clock = ManualClock::new(0);
        let registry = create_test_registry(&clock);

        assert!(registry.check("/api/wallet/a"));
        assert!(registry.check("/api/wallet/b"));
        assert!(!registry.check("/api/wallet/a"));
    }

    #[test]
    fn test_stats_and_reset() {
        let clock = ManualClock::new(0);
        let registry = create_test_registry(&clock);

        registry.check("/api/wallet/a");
        registry.check("/api/tasks/a");
        registry.check("/api/tasks/b");
        registry.check("/other");

        let stats = registry.stats();
        assert_eq!(stats.default.total_requests, 1);
        assert_eq!(stats.rules[0].0, "wallet");
        assert_eq!(stats.rules[0].1.total_requests, 1);
        assert_eq!(stats.rules[1].0, "tasks");
        assert_eq!(stats.rules[1].1.total_requests, 2);

        registry.reset();
        let stats = registry.stats();
        assert_eq!(stats.default.total_requests, 0);
        assert!(stats.rules.iter().all(|(_, s)| s.total_requests == 0));
    }

    #[test]
    fn test_prune_sums_all_limiters() {
        let clock = ManualClock::new(0);
        let registry = create_test_registry(&clock);

        registry.check("/api/tasks/a");
        registry.check("/api/wallet/a");
        registry.check("/other");

        clock.set(600);
        assert_eq!(registry.prune(), 1);
        clock.set(1001);
        assert_eq!(registry.prune(), 2);
    }

    #[test]
    fn test_shared_observer_sees_all_rejections() {
        let clock = ManualClock::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let rules = RuleSet::from_rules(vec![RuleConfig::new(
            "wallet",
            "/api/wallet",
            LimiterConfig::new(1000, 1),
        )])
        .unwrap();
        let registry = LimiterRegistry::with_collaborators(
            LimiterConfig::new(1000, 1),
            rules,
            Arc::new(clock),
            Arc::new(move |key: &str| sink.lock().push(key.to_string())),
        )
        .unwrap();

        registry.check("/api/wallet/x");
        registry.check("/api/wallet/x");
        registry.check("/home");
        registry.check("/home");

        assert_eq!(*seen.lock(), vec!["/api/wallet/x", "/home"]);
    }
}
