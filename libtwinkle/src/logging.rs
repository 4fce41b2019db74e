//! Logging setup shared by the Twinklecast binaries
//!
//! All four tools log to stderr (stdout is reserved for command
//! output, twinkle-post pipes composed posts through it). Format and
//! level come from `TWINKLE_LOG_FORMAT` and `TWINKLE_LOG_LEVEL`, with
//! per-binary defaults; `RUST_LOG` filter syntax still wins when set.

use std::str::FromStr;

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text, no colors.
    Text,
    /// One JSON object per line.
    Json,
    /// Colored multi-line output for development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Unknown log format '{}' (expected text, json, or pretty)",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        write!(f, "{}", name)
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Install the global subscriber. Call once, early in main.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber is already installed.
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let fallback = if self.verbose {
            "debug"
        } else {
            self.level.as_str()
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .init();
            }
        }
    }
}

/// Initialize logging for a CLI binary.
///
/// Respects `TWINKLE_LOG_FORMAT` and `TWINKLE_LOG_LEVEL` environment
/// variables, falling back to text format at `default_level`. The
/// `verbose` flag bumps the level to debug.
pub fn init_cli(verbose: bool, default_level: &str) {
    let format = std::env::var("TWINKLE_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("TWINKLE_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());

    LoggingConfig::new(format, level, verbose).init();
}
