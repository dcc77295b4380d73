#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Structural parsers that turn scraped payloads into a [`Table`].
//!
//! Each parser is stateless and handles one format: HTML tables
//! ([`html_table`]), JSON API bodies ([`json_table`]), data embedded in page
//! JavaScript ([`js_object`]) and CSV downloads ([`csv_table`]). They share
//! the [`Table`]/[`Cell`] model and the date inference in [`dates`].
//!
//! Nothing here touches the network; callers hand in the body text.

pub mod coerce;
pub mod csv_table;
pub mod dates;
pub mod html_table;
pub mod js_object;
pub mod json_table;
pub mod table;

pub use table::{Cell, Table};

/// Errors that can occur while parsing a payload.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The payload could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A table, selector or path segment was not found.
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The payload uses a format no parser handles.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Payload formats recognised by [`DataFormat::sniff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Html,
    Csv,
    Text,
    Binary,
}

impl DataFormat {
    /// Guesses the format from the body itself.
    ///
    /// Non-UTF-8 bodies are binary. Bodies starting with `{`/`[` that parse
    /// as JSON are JSON, `<` starts HTML, and text whose first two lines
    /// have the same number of commas (at least one) is CSV.
    #[must_use]
    pub fn sniff(body: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(body) else {
            return Self::Binary;
        };
        let trimmed = text.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
        {
            return Self::Json;
        }
        if trimmed.starts_with('<') {
            return Self::Html;
        }
        let mut lines = trimmed.lines();
        if let (Some(first), Some(second)) = (lines.next(), lines.next()) {
            let commas = first.matches(',').count();
            if commas > 0 && commas == second.matches(',').count() {
                return Self::Csv;
            }
        }
        Self::Text
    }

    /// File extension used when archiving a body of this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Csv | Self::Text => "txt",
            Self::Binary => "bin",
        }
    }
}
