use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quotagate::config::Config;
use quotagate::health::HealthChecker;
use quotagate::{RateLimiter, RateLimiterConfig, RedisStore};

/// Operator tool for the shared upstream API rate limiter.
#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about)]
struct Cli {
    /// JSON file with the gate list, replacing the limits from the environment
    #[arg(long, global = true)]
    gates_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Attempt one admission, consuming a slot if allowed
    Check,
    /// Block until a slot is admitted; Ctrl+C or the timeout exits with status 2
    Acquire {
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Report whether a call made now would be denied, without counting it
    Limited,
    /// Requests left in the current sustained window
    Remaining,
    /// Counters for the current minute, window, day and hour
    Stats,
    /// Limited check, remaining quota and statistics together
    Status,
    /// Delete every counter in the namespace
    Reset,
    /// Check that the counter store is reachable
    Health,
}

#[derive(Debug, Serialize)]
struct DecisionOutput {
    allowed: bool,
    wait_time_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = if cli.gates_file.is_some() {
        Config::from_env_without_gates()
    } else {
        Config::from_env()
    }
    .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("quotagate={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let limiter_config = match &cli.gates_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read gate file {}", path.display()))?;
            RateLimiterConfig::from_json(&raw)?
        }
        None => config.limiter_config(),
    };

    tracing::debug!(
        namespace = %limiter_config.namespace,
        gates = limiter_config.gates.len(),
        "Connecting to counter store"
    );
    let store = RedisStore::connect(&config.redis_url).await?;
    let limiter = RateLimiter::new(Arc::new(store), limiter_config)?;

    match cli.command {
        Command::Check => {
            let decision = limiter.check_rate_limit().await?;
            print_json(&DecisionOutput {
                allowed: decision.allowed,
                wait_time_ms: decision.wait_time.as_millis() as u64,
            })?;
        }
        Command::Acquire { timeout_secs } => {
            let waited = match timeout_secs {
                Some(secs) => {
                    limiter
                        .wait_for_rate_limit_until_timeout(
                            shutdown_signal(),
                            Duration::from_secs(secs),
                        )
                        .await
                }
                None => limiter.wait_for_rate_limit_until(shutdown_signal()).await,
            };
            if let Err(e) = &waited {
                if e.is_cancellation() {
                    tracing::info!("Not admitted: {}", e);
                    std::process::exit(2);
                }
            }
            waited?;
            tracing::info!("Admitted");
            print_json(&DecisionOutput {
                allowed: true,
                wait_time_ms: 0,
            })?;
        }
        Command::Limited => {
            let decision = limiter.is_rate_limited().await?;
            print_json(&DecisionOutput {
                allowed: decision.allowed,
                wait_time_ms: decision.wait_time.as_millis() as u64,
            })?;
        }
        Command::Remaining => {
            let remaining = limiter.remaining_requests().await?;
            print_json(&serde_json::json!({ "remaining": remaining }))?;
        }
        Command::Stats => print_json(&limiter.stats().await?)?,
        Command::Status => print_json(&limiter.status().await?)?,
        Command::Reset => {
            limiter.reset_counters().await?;
            tracing::info!(namespace = %limiter.config().namespace, "Counters reset");
        }
        Command::Health => {
            let health = HealthChecker::new(limiter).check_health().await;
            print_json(&health)?;
            if !health.is_healthy() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, cancelling");
        },
    }
}
