//! Date inference for parsed tables.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::table::{Cell, Table};

/// Column-name fragments that mark a date column.
pub const DATE_NAME_HINTS: &[&str] = &["date", "time", "timestamp", "created", "updated"];

/// Above this a number is a millisecond epoch.
pub const MILLIS_THRESHOLD: f64 = 1e12;

/// Above this (and at most [`MILLIS_THRESHOLD`]) a number is a second epoch.
pub const SECONDS_THRESHOLD: f64 = 1e9;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y"];

static DATE_LIKE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^\d{4}-\d{2}-\d{2}", r"^\d{2}/\d{2}/\d{4}", r"^\d{10,13}$"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

/// Whether a column name suggests dates.
#[must_use]
pub fn is_date_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DATE_NAME_HINTS.iter().any(|h| lower.contains(h))
}

/// Whether a string value looks like a date or epoch.
#[must_use]
pub fn looks_like_date(value: &str) -> bool {
    DATE_LIKE.iter().any(|re| re.is_match(value.trim()))
}

/// Converts an epoch number using the ms/s thresholds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn from_epoch(value: f64) -> Option<NaiveDateTime> {
    if value > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value as i64).map(|d| d.naive_utc())
    } else if value > SECONDS_THRESHOLD {
        DateTime::from_timestamp(value as i64, 0).map(|d| d.naive_utc())
    } else {
        None
    }
}

/// Parses a date string in any supported format.
///
/// RFC 3339 values with an offset are converted to UTC.
#[must_use]
pub fn parse_date_str(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if value.chars().all(|c| c.is_ascii_digit()) && (10..=13).contains(&value.len()) {
        return value.parse::<f64>().ok().and_then(from_epoch);
    }
    None
}

/// Converts one cell to a timestamp; anything unparseable becomes null.
#[must_use]
pub fn to_timestamp(cell: &Cell) -> Cell {
    let parsed = match cell {
        Cell::Timestamp(t) => Some(*t),
        Cell::Number(n) => from_epoch(*n),
        Cell::Text(s) => parse_date_str(s),
        _ => None,
    };
    parsed.map_or(Cell::Null, Cell::Timestamp)
}

/// Converts date columns in place.
///
/// A column is converted when its name contains a date hint, or when its
/// first non-null value is a string that looks like a date.
pub fn convert_date_columns(table: &mut Table) {
    let targets: Vec<String> = table
        .columns()
        .iter()
        .filter(|name| {
            is_date_name(name)
                || table
                    .column(name)
                    .find(|c| !c.is_null())
                    .and_then(Cell::as_str)
                    .is_some_and(looks_like_date)
        })
        .cloned()
        .collect();

    for name in targets {
        table.map_column(&name, to_timestamp);
    }
}
