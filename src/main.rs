use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wallet_throttle::config::ThrottleConfig;
use wallet_throttle::policy::{Policy, PolicySet};

/// Sliding-window attempt limiting for wallet flows.
#[derive(Parser, Debug)]
#[command(name = "wallet-throttle", version, about)]
struct Cli {
    /// YAML configuration file (built-in policy limits are used otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective policy limits
    Policies,

    /// Run a series of attempts against one policy and report each decision
    Simulate {
        /// Policy to exercise (login, otp, payment, password-reset)
        #[arg(long)]
        policy: Policy,

        /// Key to limit on, e.g. a phone number or user id
        #[arg(long)]
        key: String,

        /// Number of attempts to make
        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// Delay between attempts in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => ThrottleConfig::from_file(path)?,
        None => ThrottleConfig::default(),
    };

    match cli.command {
        Command::Policies => {
            let mut table = serde_json::Map::new();
            for policy in Policy::ALL {
                let name = serde_json::to_value(policy)?
                    .as_str()
                    .unwrap_or_default()
                    .to_owned();
                table.insert(name, serde_json::to_value(config.policies.get(policy))?);
            }
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        Command::Simulate {
            policy,
            key,
            attempts,
            interval_ms,
        } => {
            let policies = PolicySet::spawn(&config.policies)?;

            tokio::select! {
                result = simulate(&policies, policy, &key, attempts, interval_ms) => result?,
                _ = shutdown_signal() => warn!("Simulation interrupted"),
            }

            policies.shutdown().await;
        }
    }

    Ok(())
}

/// Install the global tracing subscriber. Logs go to stderr so stdout stays
/// machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn simulate(
    policies: &PolicySet,
    policy: Policy,
    key: &str,
    attempts: u32,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let limiter = policies.limiter(policy);
    info!(policy = %policy, key = %key, attempts = attempts, "Starting simulation");

    for attempt in 1..=attempts {
        let outcome = policies.check(policy, key);
        let line = json!({
            "attempt": attempt,
            "allowed": outcome.is_ok(),
            "active_attempts": limiter.attempt_count(key),
            "remaining_ms": limiter.remaining_time(key).as_millis() as u64,
            "message": outcome.err().map(|e| e.to_string()),
        });
        println!("{}", line);

        if interval_ms > 0 && attempt < attempts {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    println!("{}", serde_json::to_string_pretty(&limiter.entry_details(key))?);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
