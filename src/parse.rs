// src/parse.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

/// Dashboards print a lone dash instead of 0.
const ZERO_SENTINEL: &str = "-";

/// Plain digits, or digits grouped in threes by commas.
static COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(,\d{3})*|\d+)$").expect("count pattern should compile"));

/// Parse a count such as `"1,234"` or `"-"` (zero).
pub fn parse_count(text: &str) -> Result<u64, Error> {
    let t = text.trim();
    if t == ZERO_SENTINEL {
        return Ok(0);
    }
    if !COUNT.is_match(t) {
        return Err(Error::parse("count", text));
    }
    t.replace(',', "").parse().map_err(|_| Error::parse("count", text))
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%A, %B %d, %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y at %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
];

/// Parse a calendar date from ISO or common human-readable text.
///
/// Socrata-style `2020-05-01T00:00:00.000` values keep only their date.
pub fn parse_date(text: &str) -> Result<NaiveDate, Error> {
    let t = text.trim();

    if let Some(d) = parse_slash_date(t) {
        return Ok(d);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Ok(d);
        }
    }
    if let Ok(ts) = parse_timestamp(t) {
        return Ok(ts.date());
    }
    Err(Error::parse("date", text))
}

/// `M/D/YY` or `M/D/YYYY`; the year width picks the format so `5/1/20`
/// is never read as the year 20.
fn parse_slash_date(t: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = t.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let fmt = match parts[2].len() {
        2 => "%m/%d/%y",
        4 => "%m/%d/%Y",
        _ => return None,
    };
    NaiveDate::parse_from_str(t, fmt).ok()
}

/// Parse an upstream "last updated" marker into the wall-clock time the
/// upstream printed. Offsets, when present, are dropped after parsing.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, Error> {
    let t = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.naive_local());
    }
    // Socrata metadata uses a colon-less offset: 2020-05-29T15:30:25+0000
    if let Ok(dt) = DateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%z") {
        return Ok(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Ok(d.and_time(Default::default()));
        }
    }
    Err(Error::parse("timestamp", text))
}
