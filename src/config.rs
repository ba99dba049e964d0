//! Configuration management for slidegate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::{LimiterConfig, RuleConfig, RuleSet};

/// Prefix for environment overrides, e.g. `SLIDEGATE__LIMITER__MAX_REQUESTS=120`.
pub const ENV_PREFIX: &str = "SLIDEGATE";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Quota for keys no rule matches
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Prefix rules with dedicated quotas
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Background pruning
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Background sweeper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Interval between sweeps in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub interval_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    1000
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(yaml).map_err(|e| SlidegateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply
    /// `SLIDEGATE__`-prefixed environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiters cannot honor.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        self.rule_set()?;
        if self.sweeper.enabled && self.sweeper.interval_ms == 0 {
            return Err(SlidegateError::Config(
                "sweeper.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured rules as a validated rule set.
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::from_rules(self.rules.clone())
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SlidegateError::Config(e.to_string()))
    }
}
