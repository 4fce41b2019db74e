//! twinkle-send - Background daemon for scheduled publishing
//!
//! Monitors the job ledger and publishes scheduled posts at their due
//! time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use libtwinkle::config::expand_path;
use libtwinkle::ledger::JobLedger;
use libtwinkle::publisher::StdoutPublisher;
use libtwinkle::scheduler::{SchedulerCore, SchedulerPolicy};
use libtwinkle::tokens::{NullExchange, TokenManager};
use libtwinkle::{Config, Result, TwinkleError};
use secrecy::SecretString;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "twinkle-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
twinkle-send - Background daemon for scheduled publishing

DESCRIPTION:
    twinkle-send is a long-running daemon that watches the Twinklecast
    job ledger and publishes scheduled posts when they come due. Jobs
    found mid-execution from a crashed process are re-queued on
    startup with the interrupted attempt counted.

    Each execution fetches current credentials, runs the publisher
    under a timeout, and records the outcome in the ledger. Transient
    failures (network, rate limit, timeout) are retried with a backoff
    while attempts remain; credential and surface errors fail the job
    immediately.

USAGE:
    # Run in foreground (logs to stderr)
    twinkle-send

    # Process due jobs once and exit
    twinkle-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current job)

CONFIGURATION:
    Configuration file: ~/.config/twinklecast/config.toml
    Ledger location:    ~/.local/share/twinklecast/jobs.jsonl

    [scheduler]
    max_attempts = 1          # executions per job, 1 = no retry
    retry_backoff_secs = 300  # delay before a transient retry
    publish_timeout_secs = 60 # per-publish hard timeout

    Override with environment variables:
        TWINKLE_CONFIG       - Path to config file
        TWINKLE_ACCESS_TOKEN - Access token handed to the publisher

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Credentials or configuration error
")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due jobs once and exit (for testing)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    libtwinkle::logging::init_cli(verbose, "info");
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    info!("twinkle-send daemon starting");

    let ledger = JobLedger::open(expand_path(&config.storage.ledger_path))?;
    let recovered = ledger.recover_interrupted()?;
    if recovered > 0 {
        info!("Re-queued {} job(s) interrupted by a previous run", recovered);
    }
    let core = SchedulerCore::new(
        ledger,
        Arc::new(StdoutPublisher),
        token_manager(&config),
        SchedulerPolicy::from_config(&config.scheduler),
    );

    if cli.once {
        let executed = core.run_due_once().await?;
        info!("Processed {} due job(s), exiting", executed);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    core.run(shutdown).await?;
    info!("twinkle-send daemon stopped");
    Ok(())
}

/// Build the token manager from the environment. Without a token the
/// daemon still runs, but every execution fails with a credentials
/// error until one is provided.
fn token_manager(config: &Config) -> Arc<Mutex<TokenManager>> {
    let ttl = config.tokens.ttl_secs as i64;
    match std::env::var("TWINKLE_ACCESS_TOKEN") {
        Ok(token) => Arc::new(Mutex::new(TokenManager::with_token(
            SecretString::from(token),
            ttl,
        ))),
        Err(_) => {
            warn!("TWINKLE_ACCESS_TOKEN not set, jobs will fail until credentials are provided");
            Arc::new(Mutex::new(TokenManager::new(Box::new(NullExchange), ttl)))
        }
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| TwinkleError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}
