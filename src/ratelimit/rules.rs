//! Prefix rules that assign keys to dedicated quotas.
//!
//! A rule set is an ordered list of named rules. Each rule owns a key prefix
//! and a quota; a key is governed by the rule with the longest matching
//! prefix. Keys no rule matches fall back to the default quota.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::limiter::{LimiterConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS};
use crate::error::{Result, SlidegateError};

/// A single prefix rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique name, used in logs and stats
    pub name: String,
    /// Keys starting with this prefix are governed by this rule
    pub prefix: String,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

impl RuleConfig {
    /// Build a rule from a name, prefix and quota.
    pub fn new(name: &str, prefix: &str, limit: LimiterConfig) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            window_ms: limit.window_ms,
            max_requests: limit.max_requests,
        }
    }

    /// The quota this rule applies.
    pub fn limit(&self) -> LimiterConfig {
        LimiterConfig::new(self.window_ms, self.max_requests)
    }

    /// Whether this rule governs `key`.
    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }
}

/// An ordered collection of prefix rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<RuleConfig>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rule set from rules, validating them.
    pub fn from_rules(rules: Vec<RuleConfig>) -> Result<Self> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Load rules from a YAML file containing a list of rules.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string containing a list of rules.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: Vec<RuleConfig> = serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse rate limit rules: {}", e)))?;
        Self::from_rules(rules)
    }

    /// Check names are unique, prefixes are non-empty and quotas are sane.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            if rule.name.is_empty() {
                return Err(SlidegateError::Config("rule name must not be empty".to_string()));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(SlidegateError::Config(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
            if rule.prefix.is_empty() {
                return Err(SlidegateError::Config(format!(
                    "rule '{}' has an empty prefix",
                    rule.name
                )));
            }
            rule.limit()
                .validate()
                .map_err(|e| SlidegateError::Config(format!("rule '{}': {}", rule.name, e)))?;
        }
        Ok(())
    }

    /// Find the rule governing `key`.
    ///
    /// The longest matching prefix wins; among equally long prefixes the
    /// rule declared first wins.
    pub fn find_rule(&self, key: &str) -> Option<&RuleConfig> {
        self.find_index(key).map(|index| &self.rules[index])
    }

    /// Position of the rule governing `key`.
    pub fn find_index(&self, key: &str) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.matches(key) {
                continue;
            }
            let len = rule.prefix.len();
            match best {
                Some((_, best_len)) if best_len >= len => {}
                _ => best = Some((index, len)),
            }
        }

        best.map(|(index, _)| index)
    }

    pub fn rules(&self) -> &[RuleConfig] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
