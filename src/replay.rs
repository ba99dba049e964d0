//! Offline replay of request traces through a limiter registry.
//!
//! A trace is JSON lines, one `{"at_ms": u64, "key": string}` event per
//! line, with non-decreasing `at_ms`. Each event is checked at its own
//! timestamp using a manual clock, and one decision line is written per
//! event. Blank lines are skipped.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{Result, SlidegateError};
use crate::ratelimit::{LimiterRegistry, ManualClock, RegistryStats, TracingObserver};

/// One request in a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub at_ms: u64,
    pub key: String,
}

/// The outcome of replaying one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub at_ms: u64,
    pub key: String,
    pub allowed: bool,
    /// Rule that governed the key, or `None` for the default quota
    pub rule: Option<String>,
}

/// Summary of a finished replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub events: u64,
    pub allowed: u64,
    pub rejected: u64,
    pub stats: RegistryStats,
}

/// Replay `input` against a fresh registry built from `config`, writing one
/// JSON decision per line to `output`.
pub fn replay<R: BufRead, W: Write>(
    config: &AppConfig,
    input: R,
    mut output: W,
) -> Result<ReplaySummary> {
    let clock = ManualClock::new(0);
    let registry = LimiterRegistry::with_collaborators(
        config.limiter,
        config.rule_set()?,
        Arc::new(clock.clone()),
        Arc::new(TracingObserver),
    )?;

    let mut last_at = 0u64;
    let mut events = 0u64;
    let mut allowed = 0u64;

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: TraceEvent = serde_json::from_str(&line).map_err(|e| SlidegateError::Trace {
            line: line_no,
            message: e.to_string(),
        })?;

        if event.at_ms < last_at {
            return Err(SlidegateError::Trace {
                line: line_no,
                message: format!("at_ms {} is earlier than previous {}", event.at_ms, last_at),
            });
        }
        last_at = event.at_ms;
        clock.set(event.at_ms);

        let decision = Decision {
            allowed: registry.check(&event.key),
            rule: registry.rule_for(&event.key).map(str::to_string),
            at_ms: event.at_ms,
            key: event.key,
        };
        debug!(at_ms = decision.at_ms, key = %decision.key, allowed = decision.allowed, "Replayed event");

        events += 1;
        if decision.allowed {
            allowed += 1;
        }

        serde_json::to_writer(&mut output, &decision)?;
        output.write_all(b"\n")?;
    }

    let summary = ReplaySummary {
        events,
        allowed,
        rejected: events - allowed,
        stats: registry.stats(),
    };
    info!(events = events, allowed = allowed, rejected = summary.rejected, "Replay finished");

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimiterConfig, RuleConfig};

    fn create_test_config() -> AppConfig {
        AppConfig {
            limiter: LimiterConfig::new(1000, 3),
            rules: vec![RuleConfig::new(
                "wallet",
                "/api/wallet",
                LimiterConfig::new(1000, 1),
            )],
            ..AppConfig::default()
        }
    }

    fn decisions(output: &[u8]) -> Vec<Decision> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_replay_documented_scenario() {
        let trace = r#"{"at_ms": 0, "key": "/a"}
{"at_ms": 0, "key": "/a"}
{"at_ms": 0, "key": "/a"}
{"at_ms": 0, "key": "/a"}
{"at_ms": 0, "key": "/b"}

{"at_ms": 1001, "key": "/a"}
"#;
        let mut output = Vec::new();
        let summary = replay(&create_test_config(), trace.as_bytes(), &mut output).unwrap();

        let allowed: Vec<bool> = decisions(&output).iter().map(|d| d.allowed).collect();
        assert_eq!(allowed, vec![true, true, true, false, true, true]);
        assert_eq!(summary.events, 6);
        assert_eq!(summary.allowed, 5);
        assert_eq!(summary.rejected, 1);
        // Only the t=1001 entry remains inside the window.
        assert_eq!(summary.stats.default.total_requests, 1);
    }

    #[test]
    fn test_replay_reports_rule() {
        let trace = r#"{"at_ms": 5, "key": "/api/wallet/withdraw"}
{"at_ms": 6, "key": "/api/wallet/withdraw"}
{"at_ms": 7, "key": "/home"}
"#;
        let mut output = Vec::new();
        replay(&create_test_config(), trace.as_bytes(), &mut output).unwrap();

        let decisions = decisions(&output);
        assert_eq!(decisions[0].rule.as_deref(), Some("wallet"));
        assert!(decisions[0].allowed);
        assert!(!decisions[1].allowed);
        assert_eq!(decisions[2].rule, None);
    }

    #[test]
    fn test_replay_rejects_out_of_order_trace() {
        let trace = "{\"at_ms\": 10, \"key\": \"/a\"}\n{\"at_ms\": 9, \"key\": \"/a\"}\n";
        let err = replay(&create_test_config(), trace.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, SlidegateError::Trace { line: 2, .. }));
    }

    #[test]
    fn test_replay_rejects_malformed_line() {
        let trace = "{\"at_ms\": 1, \"key\": \"/a\"}\nnot json\n";
        let err = replay(&create_test_config(), trace.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, SlidegateError::Trace { line: 2, .. }));
    }
}
