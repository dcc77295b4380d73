//! CSV bodies to [`Table`].

use crate::ScrapeError;
use crate::coerce::{clean_text, coerce_text};
use crate::dates::convert_date_columns;
use crate::table::{Table, unique_headers};

/// Parses a CSV body with a header row. Ragged rows are padded or
/// truncated to the header width.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the reader fails on malformed input.
pub fn extract(body: &str) -> Result<Table, ScrapeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(clean_text)
        .collect::<Vec<_>>();
    let mut table = Table::new(unique_headers(headers));

    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(coerce_text).collect());
    }
    convert_date_columns(&mut table);

    log::info!("Extracted CSV data with {} rows", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn parses_and_coerces() {
        let body = "date,close,volume\n2024-01-01,\"42,000.5\",1.2M\n2024-01-02,43000,\n";
        let table = extract(body).unwrap();
        assert_eq!(table.columns(), ["date", "close", "volume"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "close"), Some(&Cell::Number(42_000.5)));
        assert_eq!(table.get(0, "volume"), Some(&Cell::Number(1_200_000.0)));
        assert_eq!(table.get(1, "volume"), Some(&Cell::Null));
        assert!(matches!(table.get(0, "date"), Some(Cell::Timestamp(_))));
    }

    #[test]
    fn ragged_rows_are_padded() {
        let table = extract("a,b,a\n1\n1,2,3,4\n").unwrap();
        assert_eq!(table.columns(), ["a", "b", "a_1"]);
        assert_eq!(table.get(0, "b"), Some(&Cell::Null));
        assert_eq!(table.rows()[1].len(), 3);
    }
}
