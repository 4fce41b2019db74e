//! Schedule-string parsing for the posting CLI
//!
//! A schedule string is either an offset from now ("30m", "2h",
//! "1 day") or a point in time, natural language included ("tomorrow",
//! "next friday 10am", "2026-09-01 15:00"). Offsets are tried first
//! since humantime is stricter than the date parser.

use crate::{Result, TwinkleError};
use chrono::{DateTime, Duration, Utc};

/// Parse a schedule string into the UTC time it names.
///
/// # Errors
///
/// Returns `InvalidInput` if the string matches neither a duration nor
/// a time expression.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TwinkleError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Some(offset) = as_offset(input) {
        return Ok(Utc::now() + offset);
    }

    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us).map_err(
        |_| TwinkleError::InvalidInput(format!("Could not parse schedule string: {}", input)),
    )
}

fn as_offset(input: &str) -> Option<Duration> {
    let parsed = humantime::parse_duration(input).ok()?;
    Duration::try_seconds(parsed.as_secs() as i64)
}
