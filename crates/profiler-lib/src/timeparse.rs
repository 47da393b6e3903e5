//! Time expression parsing
//!
//! Accepts the forms users type on the command line:
//! - `""` for now
//! - relative offsets such as `30s`, `15m`, `2h`, `7d` (subtracted from now)
//! - ISO-8601 timestamps, with or without an offset (naive values are UTC)

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

/// Units accepted as the trailing character of a relative expression
const RELATIVE_UNITS: [char; 4] = ['s', 'm', 'h', 'd'];

/// A time expression that could not be resolved
///
/// Every variant keeps the input verbatim for error reporting.
#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("invalid relative time {input:?}: {source}")]
    InvalidOffset {
        input: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("relative time {input:?} is out of range")]
    OffsetOutOfRange { input: String },

    #[error("the unit {unit:?} in {input:?} should be one of s, m, h, d")]
    UnknownUnit { input: String, unit: char },

    #[error("invalid timestamp {input:?}: {source}")]
    InvalidTimestamp {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl TimeParseError {
    /// The expression exactly as it was given
    pub fn input(&self) -> &str {
        match self {
            TimeParseError::InvalidOffset { input, .. }
            | TimeParseError::OffsetOutOfRange { input }
            | TimeParseError::UnknownUnit { input, .. }
            | TimeParseError::InvalidTimestamp { input, .. } => input,
        }
    }
}

/// Resolve a time expression against the current wall clock
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    parse_time_at(input, Utc::now())
}

/// Resolve a time expression against an explicit `now`
pub fn parse_time_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeParseError> {
    let Some(last) = input.chars().last() else {
        return Ok(now);
    };

    if RELATIVE_UNITS.contains(&last) {
        return parse_relative(input, now);
    }

    // A plain count with an unsupported suffix, e.g. "5x"
    if last.is_ascii_alphabetic() && last != 'Z' && last != 'z' {
        let prefix = &input[..input.len() - last.len_utf8()];
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(TimeParseError::UnknownUnit {
                input: input.to_string(),
                unit: last,
            });
        }
    }

    parse_absolute(input)
}

fn parse_relative(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeParseError> {
    let (amount, unit) = input.split_at(input.len() - 1);
    let value: i64 = amount
        .trim()
        .parse()
        .map_err(|source| TimeParseError::InvalidOffset {
            input: input.to_string(),
            source,
        })?;

    let delta = match unit {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        _ => None,
    };

    delta
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| TimeParseError::OffsetOutOfRange {
            input: input.to_string(),
        })
}

fn parse_absolute(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let rfc3339_err = match DateTime::parse_from_rfc3339(input) {
        Ok(ts) => return Ok(ts.with_timezone(&Utc)),
        Err(e) => e,
    };

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(TimeParseError::InvalidTimestamp {
        input: input.to_string(),
        source: rfc3339_err,
    })
}
