//! Live admission of keys read from a stream.
//!
//! Each non-blank input line is one key. The key is checked against the
//! registry at the moment it arrives and a JSON decision line is written
//! back. The loop ends at end of input or when `shutdown` resolves.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::ratelimit::LimiterRegistry;

/// The outcome for one key read by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub key: String,
    pub allowed: bool,
    /// Rule that governed the key, or `None` for the default quota
    pub rule: Option<String>,
}

/// Counts for a finished gate session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSummary {
    pub keys: u64,
    pub allowed: u64,
}

/// Admit or reject every key read from `input` until it ends or `shutdown`
/// resolves, writing one JSON decision per line to `output`.
pub async fn run<R, W, S>(
    registry: &LimiterRegistry,
    input: R,
    mut output: W,
    shutdown: S,
) -> Result<GateSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut summary = GateSummary::default();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                info!("Gate interrupted");
                break;
            }
        };

        let Some(line) = line else { break };
        let key = line.trim();
        if key.is_empty() {
            continue;
        }

        let decision = GateDecision {
            key: key.to_string(),
            allowed: registry.check(key),
            rule: registry.rule_for(key).map(str::to_string),
        };
        debug!(key = %decision.key, allowed = decision.allowed, "Gate decision");

        summary.keys += 1;
        if decision.allowed {
            summary.allowed += 1;
        }

        let mut encoded = serde_json::to_vec(&decision)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
    }

    Ok(summary)
}
