//! HTTP date parsing and formatting.
//!
//! Servers in the wild do not all emit IMF-fixdate. Parsing tries, in order:
//!
//! 1. IMF-fixdate, RFC 850 and asctime via [`httpdate`]
//! 2. RFC 2822 with zone abbreviations or numeric offsets (`... 05:16:28 PST`)
//! 3. GMT forms with single-digit fields (`... 2010 8:14:57 GMT`)
//!
//! Steps 2 and 3 ignore the weekday, so a date with a wrong weekday still parses.
//!
//! Freshness comparisons happen at whole-second granularity because HTTP
//! dates carry nothing finer.
//!
//! Only instants between the Unix epoch and the end of year 9999 are valid
//! HTTP dates. Parsing rejects anything outside that window and formatting
//! clamps into it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime};
use reqwest::header::HeaderValue;
use thiserror::Error;
use tracing::debug;

/// GMT layouts tried on the text after the weekday has been stripped.
const LEGACY_GMT_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S GMT", "%d %b %Y %H:%M:%S UTC"];

/// `Fri, 31 Dec 9999 23:59:59 GMT`, the last representable HTTP date.
const LATEST_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Failure to interpret a textual HTTP date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateParseError {
    /// The value was empty or whitespace.
    #[error("empty HTTP date")]
    Empty,

    /// No supported layout matched.
    #[error("unrecognized HTTP date: {value:?}")]
    Unrecognized {
        /// The rejected input.
        value: String,
    },

    /// The date parsed but lies before 1970 or after 9999.
    #[error("HTTP date out of range: {value:?}")]
    OutOfRange {
        /// The rejected input.
        value: String,
    },
}

fn latest_http_date() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(LATEST_HTTP_DATE_SECS)
}

/// Parses an HTTP date in any supported layout.
///
/// # Errors
///
/// Returns [`DateParseError`] when the text is blank, matches no layout, or
/// names an instant before 1970 or after 9999. A failed parse never defaults
/// to "now" or the epoch.
pub fn parse_http_date(text: &str) -> Result<SystemTime, DateParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DateParseError::Empty);
    }

    let parsed = parse_any_layout(text)?;
    if parsed < UNIX_EPOCH || parsed > latest_http_date() {
        return Err(DateParseError::OutOfRange {
            value: text.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_any_layout(text: &str) -> Result<SystemTime, DateParseError> {
    if let Ok(parsed) = httpdate::parse_http_date(text) {
        return Ok(parsed);
    }

    // Weekdays are redundant and sometimes wrong; the lenient layouts ignore them.
    let without_weekday = text
        .split_once(',')
        .map_or(text, |(_, rest)| rest.trim_start());

    if let Ok(parsed) = DateTime::parse_from_rfc2822(without_weekday) {
        return Ok(SystemTime::from(parsed));
    }

    LEGACY_GMT_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(without_weekday, layout).ok())
        .map(|naive| SystemTime::from(naive.and_utc()))
        .ok_or_else(|| DateParseError::Unrecognized {
            value: text.to_string(),
        })
}

/// Formats a timestamp as IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
///
/// Sub-second precision is dropped. Instants before 1970 format as the epoch
/// and instants after 9999 as the last second of that year.
#[must_use]
pub fn format_http_date(at: SystemTime) -> String {
    httpdate::fmt_http_date(at.clamp(UNIX_EPOCH, latest_http_date()))
}

/// Reads an optional header value as a timestamp.
///
/// Absent, non-ASCII or unparseable values all become `None`; a bad date is
/// treated as a missing one rather than as a failure.
#[must_use]
pub fn parse_header(value: Option<&HeaderValue>) -> Option<SystemTime> {
    let raw = value?;
    let Ok(text) = raw.to_str() else {
        debug!("ignoring non-ASCII date header");
        return None;
    };
    match parse_http_date(text) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            debug!(%error, "ignoring unparseable date header");
            None
        }
    }
}

/// Whole seconds relative to the Unix epoch, rounded toward negative infinity.
#[must_use]
pub fn unix_seconds(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// Drops the sub-second part of a timestamp.
#[must_use]
pub fn truncate_to_second(at: SystemTime) -> SystemTime {
    let secs = unix_seconds(at);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// True when both timestamps fall in the same whole second.
#[must_use]
pub fn same_second(a: SystemTime, b: SystemTime) -> bool {
    unix_seconds(a) == unix_seconds(b)
}
