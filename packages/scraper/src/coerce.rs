//! Text-to-value coercion for scraped cells.

use crate::table::Cell;

/// Parses a formatted number such as `$1,234.5`, `12%` or `3.2B`.
///
/// `$`, `,` and `%` are stripped. A trailing `K`, `M` or `B` (either
/// case) multiplies by 1e3, 1e6 or 1e9. Strings without a digit are never
/// numbers, so `nan` or `inf` stay text.
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%'))
        .collect();
    let cleaned = cleaned.trim();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last() {
        Some('K' | 'k') => (&cleaned[..cleaned.len() - 1], 1e3),
        Some('M' | 'm') => (&cleaned[..cleaned.len() - 1], 1e6),
        Some('B' | 'b') => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned, 1.0),
    };

    digits.trim().parse::<f64>().ok().map(|n| n * multiplier)
}

/// Whether `text` reads as a number under [`parse_number`].
#[must_use]
pub fn looks_numeric(text: &str) -> bool {
    parse_number(text).is_some()
}

/// Turns cleaned cell text into a [`Cell`]: empty becomes null, numbers
/// become [`Cell::Number`], anything else stays text.
#[must_use]
pub fn coerce_text(text: &str) -> Cell {
    if text.trim().is_empty() {
        return Cell::Null;
    }
    parse_number(text).map_or_else(|| Cell::Text(text.to_owned()), Cell::Number)
}

/// Collapses runs of whitespace, drops control characters and trims.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_owned()
}
