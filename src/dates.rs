//! Calendar date normalisation
//!
//! One policy for every date coming from outside the process:
//! accepted shapes are `YYYY-MM-DD`, `DD-MM-YYYY` and RFC 3339 timestamps.
//! Model-supplied dates are additionally clamped to the window
//! `[EARLIEST_ACCEPTED_YEAR-01-01, today]`, falling back to today.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// Dates before this year are treated as model hallucinations.
pub const EARLIEST_ACCEPTED_YEAR: i32 = 2024;

/// Output format for every date the API emits.
pub const ISO_DATE: &str = "%Y-%m-%d";

const DAY_FIRST_DATE: &str = "%d-%m-%Y";

/// Today's date according to the server clock (UTC).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse any accepted date shape into a calendar date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, ISO_DATE) {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, DAY_FIRST_DATE) {
        return Some(date);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
        return Some(timestamp.date_naive());
    }

    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|timestamp| timestamp.date())
}

/// Whether a parsed date falls inside the window accepted from the model.
pub fn is_plausible(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() >= EARLIEST_ACCEPTED_YEAR && date <= today
}

/// Normalise an optional raw date, replacing anything missing, unparsable,
/// too old or in the future with `today`.
pub fn sanitize_or_today(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    raw.and_then(parse_date)
        .filter(|date| is_plausible(*date, today))
        .unwrap_or(today)
}
