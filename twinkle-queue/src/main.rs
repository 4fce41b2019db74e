//! twinkle-queue - Inspect and manage scheduled jobs
//!
//! Unix-style tool for listing, cancelling, and rescheduling jobs in
//! the Twinklecast ledger.

use clap::{Parser, Subcommand};
use libtwinkle::config::expand_path;
use libtwinkle::ledger::JobLedger;
use libtwinkle::scheduling::parse_schedule;
use libtwinkle::{Config, JobStatus, Result, ScheduledJob, TwinkleError};

#[derive(Parser, Debug)]
#[command(name = "twinkle-queue")]
#[command(version)]
#[command(about = "Inspect and manage scheduled jobs")]
#[command(long_about = "\
twinkle-queue - Inspect and manage scheduled jobs

DESCRIPTION:
    twinkle-queue works against the job ledger shared with twinkle-post
    and twinkle-send. Use it to list jobs, cancel pending ones, move
    their due time, or view queue statistics.

    Only pending jobs can be cancelled or rescheduled; running and
    finished jobs are part of the delivery record.

COMMANDS:
    list        List jobs
    cancel      Cancel a pending job
    reschedule  Move a pending job to a new time
    stats       Show counts by status

USAGE EXAMPLES:
    # List everything
    twinkle-queue list

    # Only jobs still waiting, as JSON
    twinkle-queue list --status pending --format json

    # Cancel and reschedule
    twinkle-queue cancel <JOB_ID>
    twinkle-queue reschedule <JOB_ID> \"tomorrow 3pm\"

CONFIGURATION:
    Configuration file: ~/.config/twinklecast/config.toml
    Ledger location:    ~/.local/share/twinklecast/jobs.jsonl

    Override with environment variables:
        TWINKLE_CONFIG - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed (unknown job, job not cancellable, etc.)
    3 - Invalid input (bad time format, bad status filter, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List jobs
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by status: pending, running, succeeded, failed
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Cancel a pending job
    Cancel {
        /// Job ID to cancel
        job_id: String,
    },

    /// Move a pending job to a new time
    Reschedule {
        /// Job ID to reschedule
        job_id: String,

        /// New time (e.g., "2h", "tomorrow 3pm")
        time: String,
    },

    /// Show counts by status
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    libtwinkle::logging::init_cli(verbose, "error");
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let ledger = JobLedger::open(expand_path(&config.storage.ledger_path))?;

    match cli.command {
        Commands::List { format, status } => {
            let filter = status.as_deref().map(parse_status).transpose()?;
            let jobs = ledger.list(filter);
            match format.as_str() {
                "json" => output_list_json(&jobs)?,
                "text" => output_list_text(&jobs),
                other => return invalid_format(other),
            }
        }
        Commands::Cancel { job_id } => {
            ledger.remove(&job_id)?;
            println!("{}", job_id);
        }
        Commands::Reschedule { job_id, time } => {
            let due_at = parse_schedule(&time)?.timestamp();
            let job = ledger.set_due(&job_id, due_at)?;
            println!("{} {}", job.id, format_due(due_at));
        }
        Commands::Stats { format } => {
            let stats = ledger.stats();
            match format.as_str() {
                "json" => println!(
                    "{}",
                    serde_json::to_string_pretty(&stats)
                        .map_err(libtwinkle::error::PersistenceError::Json)?
                ),
                "text" => {
                    println!("pending:   {}", stats.pending);
                    println!("running:   {}", stats.running);
                    println!("succeeded: {}", stats.succeeded);
                    println!("failed:    {}", stats.failed);
                }
                other => return invalid_format(other),
            }
        }
    }

    Ok(())
}

fn parse_status(status: &str) -> Result<JobStatus> {
    match status {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        other => Err(TwinkleError::InvalidInput(format!(
            "Invalid status '{}'. Must be pending, running, succeeded or failed",
            other
        ))),
    }
}

fn invalid_format(format: &str) -> Result<()> {
    Err(TwinkleError::InvalidInput(format!(
        "Invalid format '{}'. Must be 'text' or 'json'",
        format
    )))
}

fn output_list_json(jobs: &[ScheduledJob]) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(jobs).map_err(libtwinkle::error::PersistenceError::Json)?
    );
    Ok(())
}

fn output_list_text(jobs: &[ScheduledJob]) {
    let now = chrono::Utc::now().timestamp();
    for job in jobs {
        println!(
            "{} | {} | {} | {}",
            job.id,
            job.status,
            truncate_body(&job.post.body, 50),
            format_time_until(now, job.due_at)
        );
    }
}

fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn format_due(due_at: i64) -> String {
    chrono::DateTime::from_timestamp(due_at, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| due_at.to_string())
}

fn format_time_until(now: i64, due_at: i64) -> String {
    let diff = due_at - now;
    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
