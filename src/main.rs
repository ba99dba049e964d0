use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slidegate::config::AppConfig;
use slidegate::gate;
use slidegate::ratelimit::{LimiterRegistry, SystemClock, TracingObserver};
use slidegate::replay::replay;
use slidegate::sweeper::Sweeper;

/// Sliding-window rate limiting for outbound call sites.
#[derive(Parser, Debug)]
#[command(name = "slidegate", version, about)]
struct Cli {
    /// YAML configuration file (SLIDEGATE__* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines request trace and print one decision per event
    Replay {
        /// Trace file with {"at_ms": .., "key": ..} per line
        trace: PathBuf,
    },
    /// Read keys from stdin and admit or reject each one in real time
    Gate,
    /// Load and validate the configuration, then print it
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        window_ms = config.limiter.window_ms,
        max_requests = config.limiter.max_requests,
        rules = config.rules.len(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Replay { trace } => run_replay(&config, trace),
        Command::Gate => run_gate(config).await,
        Command::Validate => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

/// Initialize tracing on stderr so stdout carries only decisions.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_replay(config: &AppConfig, trace: PathBuf) -> anyhow::Result<()> {
    let file = File::open(&trace)
        .with_context(|| format!("Failed to open trace {}", trace.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = replay(config, BufReader::new(file), &mut out)?;

    serde_json::to_writer(&mut out, &summary)?;
    writeln!(out)?;
    Ok(())
}

async fn run_gate(config: AppConfig) -> anyhow::Result<()> {
    let registry = Arc::new(LimiterRegistry::with_collaborators(
        config.limiter,
        config.rule_set()?,
        Arc::new(SystemClock::new()),
        Arc::new(TracingObserver),
    )?);

    let sweeper = config
        .sweeper
        .enabled
        .then(|| Sweeper::spawn(registry.clone(), config.sweeper.interval()));

    info!("Reading keys from stdin");

    let summary = gate::run(
        &registry,
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        wait_for_shutdown(),
    )
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    let stats = registry.stats();
    info!(
        keys = summary.keys,
        allowed = summary.allowed,
        default_requests = stats.default.total_requests,
        rules = stats.rules.len(),
        "Gate stopped"
    );
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = interrupted() => info!("Received Ctrl+C, stopping"),
                    _ = sigterm.recv() => info!("Received SIGTERM, stopping"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                interrupted().await;
                info!("Received Ctrl+C, stopping");
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupted().await;
        info!("Received Ctrl+C, stopping");
    }
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}
