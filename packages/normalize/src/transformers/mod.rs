//! One transformer per source, plus the cell helpers they share.

pub mod coingecko;
pub mod coinglass;
pub mod dune;
pub mod invezz;
pub mod theblock;

use chrono::{NaiveDateTime, Utc};
use data_fetch_scraper::{Cell, Table, coerce, dates};

use crate::NormalizeError;

/// Numeric value of a cell. Formatted numeric text such as `1,200` counts.
#[must_use]
pub fn number(cell: &Cell) -> Option<f64> {
    cell.as_f64()
        .or_else(|| cell.as_str().and_then(coerce::parse_number))
}

/// Numeric value of `column` in `row`, if present.
#[must_use]
pub fn value_at(table: &Table, column: &str, row: usize) -> Option<f64> {
    table.get(row, column).and_then(number)
}

/// Columns whose non-null cells are all numbers, in table order.
#[must_use]
pub fn numeric_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|name| {
            let mut cells = table.column(name).filter(|c| !c.is_null()).peekable();
            cells.peek().is_some() && cells.all(|c| matches!(c, Cell::Number(_)))
        })
        .cloned()
        .collect()
}

pub(crate) const fn last_row(table: &Table) -> usize {
    table.len().saturating_sub(1)
}

/// Timestamp from the first of `candidates` present in the table, read
/// at `row`. Falls back to the current time when none is present.
pub(crate) fn timestamp_at(
    table: &Table,
    candidates: &[&str],
    row: usize,
) -> Result<NaiveDateTime, NormalizeError> {
    let Some(column) = candidates.iter().find(|c| table.has_column(c)) else {
        return Ok(Utc::now().naive_utc());
    };
    let cell = table.get(row, column).cloned().unwrap_or(Cell::Null);
    dates::to_timestamp(&cell)
        .as_timestamp()
        .ok_or_else(|| NormalizeError::Timestamp {
            column: (*column).to_owned(),
            value: cell.to_string(),
        })
}
