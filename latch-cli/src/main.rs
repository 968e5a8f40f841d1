mod handlers;
mod server;

use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use latch_core::manager::LockManager;
use latch_core::types::{LockRequestsMessage, LockResponsesMessage};

#[derive(Parser)]
#[command(
    name = "latch",
    about = "Latch: all-or-nothing locking of linked objects",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Latch HTTP lock server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3200")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Lease applied to requests that don't set their own, in seconds
        #[arg(long, default_value = "3600", env = "LATCH_DEFAULT_AUTO_UNLOCK_SECS")]
        default_auto_unlock_secs: u64,

        /// How often expired locks are released in the background, in seconds
        #[arg(long, default_value = "30", env = "LATCH_REAP_INTERVAL_SECS")]
        reap_interval_secs: u64,
    },

    /// Evaluate a JSON lock request message (stdin) against an empty table
    Check,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            default_auto_unlock_secs,
            reap_interval_secs,
        } => {
            anyhow::ensure!(reap_interval_secs > 0, "--reap-interval-secs must be greater than 0");
            server::run(server::ServeOptions {
                host,
                port,
                default_auto_unlock: Duration::from_secs(default_auto_unlock_secs),
                reap_interval: Duration::from_secs(reap_interval_secs),
            })
            .await?;
        }
        Commands::Check => {
            eprintln!("Reading lock requests from stdin...");
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;

            let response = check(&input)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Version => {
            println!("latch {}", env!("CARGO_PKG_VERSION"));
            println!("All-or-nothing object locking with leased expiry");
        }
    }

    Ok(())
}

/// Process a request message against a fresh, empty lock table.
fn check(input: &str) -> anyhow::Result<LockResponsesMessage> {
    let message: LockRequestsMessage =
        serde_json::from_str(input).context("Invalid JSON lock request message")?;

    let manager = LockManager::new();
    let responses = manager.request_locks(&message.requests)?;
    Ok(LockResponsesMessage { responses })
}
