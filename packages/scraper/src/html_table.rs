//! HTML `<table>` discovery and extraction.
//!
//! Headers come from `<thead>` when the table has one; otherwise from the
//! first all-`<th>` row, falling back to the first row. A `colspan` on a
//! header repeats its label with a `_continued` suffix; on a data cell it
//! inserts blank cells for the extra width. `rowspan` is not expanded.

use scraper::{ElementRef, Html, Selector};

use crate::coerce::{clean_text, coerce_text, looks_numeric};
use crate::table::{Cell, Table, unique_headers};
use crate::ScrapeError;

/// Header keywords that suggest a date column.
pub const DATE_HEADER_KEYWORDS: &[&str] = &["date", "time", "day", "month", "year"];

/// Header keywords that suggest financial data.
pub const FINANCIAL_HEADER_KEYWORDS: &[&str] =
    &["price", "open", "high", "low", "close", "volume", "market", "cap"];

/// OHLC header names; three or more present is a strong signal.
pub const OHLC_HEADERS: &[&str] = &["open", "high", "low", "close"];

/// Bonus for a date-like header.
pub const DATE_HEADER_BONUS: f64 = 0.5;
/// Bonus for any financial header.
pub const FINANCIAL_HEADER_BONUS: f64 = 0.5;
/// Bonus for three or more OHLC headers.
pub const OHLC_BONUS: f64 = 1.0;
/// Default minimum data rows for [`extract_best_table`].
pub const DEFAULT_MIN_ROWS: usize = 5;

/// Summary of one table found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub index: usize,
    /// CSS selector that should locate the table again.
    pub selector: String,
    pub headers: Vec<String>,
    /// Row count excluding the header row.
    pub num_rows: usize,
    pub num_cols: usize,
    pub sample_row: Vec<String>,
    pub has_numeric_data: bool,
}

/// How to pick the table to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelector {
    /// CSS selector for the `<table>`.
    Css(String),
    /// Zero-based index among all `<table>` elements.
    Index(usize),
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::Parse(format!("invalid CSS selector '{css}': {e}")))
}

fn cells(row: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    clean_text(&cell.text().collect::<String>())
}

fn colspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

fn is_header_row(row: ElementRef<'_>) -> bool {
    let mut saw_cell = false;
    for cell in cells(row) {
        saw_cell = true;
        if cell.value().name() != "th" {
            return false;
        }
    }
    saw_cell
}

/// Whether `row` belongs to `table` itself rather than a table nested in it.
fn owned_by(table: ElementRef<'_>, row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .is_some_and(|el| el.id() == table.id())
}

/// Rows of `table` matching `css`, skipping rows of nested tables.
fn own_rows<'a>(table: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>, ScrapeError> {
    let sel = selector(css)?;
    Ok(table.select(&sel).filter(|row| owned_by(table, *row)).collect())
}

fn rows_of(table: ElementRef<'_>) -> Result<Vec<ElementRef<'_>>, ScrapeError> {
    own_rows(table, "tr")
}

type SplitRows<'a> = (Option<ElementRef<'a>>, Vec<ElementRef<'a>>);

/// Splits a table into its header row and data rows.
fn split_rows(table: ElementRef<'_>) -> Result<SplitRows<'_>, ScrapeError> {
    let thead_rows: Vec<ElementRef<'_>> = own_rows(table, "thead tr")?;

    if let Some(header) = thead_rows.last().copied() {
        let tbody_rows: Vec<ElementRef<'_>> = own_rows(table, "tbody tr")?;
        let data = if tbody_rows.is_empty() {
            rows_of(table)?
                .into_iter()
                .filter(|r| !thead_rows.contains(r))
                .collect()
        } else {
            tbody_rows
        };
        return Ok((Some(header), data));
    }

    let rows = rows_of(table)?;
    let header_pos = rows
        .iter()
        .position(|r| is_header_row(*r))
        .or_else(|| (!rows.is_empty()).then_some(0));

    let Some(header_pos) = header_pos else {
        return Ok((None, Vec::new()));
    };
    let header = rows[header_pos];
    let data = rows
        .into_iter()
        .enumerate()
        .filter(|(i, r)| *i != header_pos && !is_header_row(*r))
        .map(|(_, r)| r)
        .collect();
    Ok((Some(header), data))
}

fn expand_headers(row: ElementRef<'_>) -> Vec<String> {
    let mut headers = Vec::new();
    for cell in cells(row) {
        let label = cell_text(cell);
        let span = colspan(cell);
        headers.push(label.clone());
        for _ in 1..span {
            headers.push(format!("{label}_continued"));
        }
    }
    headers
}

fn expand_data(row: ElementRef<'_>) -> Vec<Cell> {
    let mut values = Vec::new();
    for cell in cells(row) {
        values.push(coerce_text(&cell_text(cell)));
        for _ in 1..colspan(cell) {
            values.push(Cell::Null);
        }
    }
    values
}

fn table_elements(document: &Html) -> Result<Vec<ElementRef<'_>>, ScrapeError> {
    let sel = selector("table")?;
    Ok(document.select(&sel).collect())
}

/// Lists every table in `html` with a short summary.
///
/// # Errors
///
/// Only fails on internal selector errors.
pub fn find_tables(html: &str) -> Result<Vec<TableInfo>, ScrapeError> {
    let document = Html::parse_document(html);
    let tables = table_elements(&document)?;

    let mut infos = Vec::with_capacity(tables.len());
    for (index, table) in tables.into_iter().enumerate() {
        let rows = rows_of(table)?;

        let header_row = own_rows(table, "thead tr")?
            .last()
            .copied()
            .or_else(|| rows.first().copied());
        let headers: Vec<String> = header_row
            .map(|r| cells(r).map(cell_text).collect())
            .unwrap_or_default();

        let sample_row: Vec<String> = rows
            .get(1)
            .map(|r| cells(*r).map(cell_text).collect())
            .unwrap_or_default();
        let has_numeric_data = sample_row.iter().any(|c| looks_numeric(c));

        let element = table.value();
        let selector = if let Some(id) = element.id() {
            format!("#{id}")
        } else if let Some(class) = element
            .attr("class")
            .and_then(|c| c.split_whitespace().next())
        {
            format!("table.{class}")
        } else {
            format!("table:nth-of-type({})", index + 1)
        };

        infos.push(TableInfo {
            index,
            selector,
            num_cols: headers.len(),
            headers,
            num_rows: rows.len().saturating_sub(1),
            sample_row,
            has_numeric_data,
        });
    }

    log::info!("Found {} tables in HTML", infos.len());
    Ok(infos)
}

/// Extracts one table.
///
/// # Errors
///
/// Returns [`ScrapeError::Lookup`] if no table matches, or
/// [`ScrapeError::Parse`] for an invalid CSS selector.
pub fn extract(html: &str, which: &TableSelector) -> Result<Table, ScrapeError> {
    let document = Html::parse_document(html);

    let table = match which {
        TableSelector::Css(css) => document
            .select(&selector(css)?)
            .next()
            .ok_or_else(|| ScrapeError::Lookup(format!("Table not found with selector: {css}")))?,
        TableSelector::Index(index) => table_elements(&document)?
            .get(*index)
            .copied()
            .ok_or_else(|| ScrapeError::Lookup(format!("Table index {index} out of range")))?,
    };

    let (header, data_rows) = split_rows(table)?;
    let Some(header) = header else {
        return Ok(Table::default());
    };

    let mut out = Table::new(unique_headers(expand_headers(header)));
    for row in data_rows {
        let values = expand_data(row);
        if values.is_empty() {
            continue;
        }
        out.push_row(values);
    }

    log::info!(
        "Extracted table with {} rows and {} columns",
        out.len(),
        out.num_cols()
    );
    Ok(out)
}

/// Extracts every non-empty table, skipping ones that fail.
///
/// # Errors
///
/// Only fails on internal selector errors.
pub fn extract_all(html: &str) -> Result<Vec<Table>, ScrapeError> {
    let mut tables = Vec::new();
    for info in find_tables(html)? {
        match extract(html, &TableSelector::Index(info.index)) {
            Ok(table) if !table.is_empty() => tables.push(table),
            Ok(_) => {}
            Err(e) => log::warn!("Failed to extract table {}: {e}", info.index),
        }
    }
    Ok(tables)
}

/// Quality score for picking the most data-like table.
#[must_use]
pub fn table_score(info: &TableInfo) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let mut score = (info.num_rows as f64 / 100.0).min(1.0) + (info.num_cols as f64 / 10.0).min(0.5);

    let headers: Vec<String> = info.headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let joined = headers.join(" ");

    if DATE_HEADER_KEYWORDS.iter().any(|k| joined.contains(k)) {
        score += DATE_HEADER_BONUS;
    }
    if FINANCIAL_HEADER_KEYWORDS.iter().any(|k| joined.contains(k)) {
        score += FINANCIAL_HEADER_BONUS;
    }
    let ohlc = OHLC_HEADERS
        .iter()
        .filter(|k| headers.iter().any(|h| h.contains(*k)))
        .count();
    if ohlc >= 3 {
        score += OHLC_BONUS;
    }
    score
}

/// Extracts the highest-scoring table with at least `min_rows` data rows.
///
/// With `require_numeric`, tables whose sample row has no numeric-looking
/// cell are skipped.
///
/// # Errors
///
/// Propagates extraction errors for the chosen table.
pub fn extract_best_table(
    html: &str,
    min_rows: usize,
    require_numeric: bool,
) -> Result<Option<Table>, ScrapeError> {
    let best = find_tables(html)?
        .into_iter()
        .filter(|info| info.num_rows >= min_rows)
        .filter(|info| !require_numeric || info.has_numeric_data)
        .map(|info| (table_score(&info), info))
        .fold(None::<(f64, TableInfo)>, |best, (score, info)| match best {
            Some((best_score, _)) if best_score >= score => best,
            _ => Some((score, info)),
        });

    match best {
        Some((score, info)) => {
            log::debug!("Best table is #{} (score {score:.2})", info.index);
            extract(html, &TableSelector::Index(info.index)).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "<table><tr><th>Date</th><th>Value</th></tr>\
        <tr><td>2024-01-01</td><td>100</td></tr>\
        <tr><td>2024-01-02</td><td>200</td></tr></table>";

    #[test]
    fn extracts_simple_table() {
        let table = extract(SIMPLE, &TableSelector::Index(0)).unwrap();
        assert_eq!(table.columns(), ["Date", "Value"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "Value"), Some(&Cell::Number(100.0)));
        assert_eq!(table.get(1, "Value"), Some(&Cell::Number(200.0)));
        assert_eq!(
            table.get(0, "Date"),
            Some(&Cell::Text("2024-01-01".to_owned()))
        );
    }

    #[test]
    fn nested_table_rows_stay_with_their_table() {
        let html = "<table><tr><th>Date</th><th>Value</th></tr>\
            <tr><td>2024-01-01</td><td>100</td></tr>\
            <tr><td>2024-01-02</td><td><table><tr><td>a</td></tr><tr><td>b</td></tr>\
            <tr><td>c</td></tr></table></td></tr></table>";
        let table = extract(html, &TableSelector::Index(0)).unwrap();
        assert_eq!(table.columns(), ["Date", "Value"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "Value"), Some(&Cell::Number(100.0)));

        let infos = find_tables(html).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].num_rows, 2);
        assert_eq!(infos[0].headers, ["Date", "Value"]);
        assert_eq!(infos[1].num_rows, 2);

        let inner = extract(html, &TableSelector::Index(1)).unwrap();
        assert_eq!(inner.columns(), ["a"]);
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn colspan_header_is_expanded() {
        let html = "<table><thead><tr><th>Date</th><th colspan=\"2\">Price</th></tr></thead>\
            <tbody><tr><td>2024-01-01</td><td>1</td><td>2</td></tr>\
            <tr><td colspan=\"2\">n/a</td><td>3</td></tr></tbody></table>";
        let table = extract(html, &TableSelector::Index(0)).unwrap();
        assert_eq!(table.columns(), ["Date", "Price", "Price_continued"]);
        assert_eq!(table.get(0, "Price_continued"), Some(&Cell::Number(2.0)));
        assert_eq!(table.get(1, "Price"), Some(&Cell::Null));
        assert_eq!(table.get(1, "Price_continued"), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        let html = "<table><tr><th>col</th><th>col</th><th></th></tr>\
            <tr><td>1</td><td>2</td><td>3</td></tr></table>";
        let table = extract(html, &TableSelector::Index(0)).unwrap();
        assert_eq!(table.columns(), ["col", "col_1", "column"]);
    }

    #[test]
    fn selector_and_index_errors() {
        assert!(matches!(
            extract(SIMPLE, &TableSelector::Index(3)),
            Err(ScrapeError::Lookup(_))
        ));
        assert!(matches!(
            extract(SIMPLE, &TableSelector::Css("#missing".to_owned())),
            Err(ScrapeError::Lookup(_))
        ));
    }

    #[test]
    fn find_tables_builds_selectors() {
        let html = "<table id=\"prices\"><tr><th>a</th></tr><tr><td>$1</td></tr></table>\
            <table class=\"grid wide\"><tr><td>x</td></tr></table>\
            <table><tr><td>y</td></tr></table>";
        let infos = find_tables(html).unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].selector, "#prices");
        assert!(infos[0].has_numeric_data);
        assert_eq!(infos[0].num_rows, 1);
        assert_eq!(infos[1].selector, "table.grid");
        assert_eq!(infos[2].selector, "table:nth-of-type(3)");
    }

    fn rows(n: usize, cols: &str) -> String {
        let mut html = format!("<table><tr>{cols}</tr>");
        for i in 0..n {
            html.push_str(&format!("<tr><td>2024-01-{:02}</td><td>{i}</td><td>1</td><td>2</td><td>3</td></tr>", i + 1));
        }
        html.push_str("</table>");
        html
    }

    #[test]
    fn best_table_prefers_ohlc() {
        let plain = rows(6, "<th>a</th><th>b</th><th>c</th><th>d</th><th>e</th>");
        let ohlc = rows(6, "<th>Date</th><th>Open</th><th>High</th><th>Low</th><th>Close</th>");
        let html = format!("{plain}{ohlc}");
        let best = extract_best_table(&html, DEFAULT_MIN_ROWS, true).unwrap().unwrap();
        assert_eq!(best.columns()[1], "Open");
    }

    #[test]
    fn best_table_skips_small_tables() {
        assert!(extract_best_table(SIMPLE, DEFAULT_MIN_ROWS, true).unwrap().is_none());
        assert!(extract_best_table(SIMPLE, 1, true).unwrap().is_some());
    }

    #[test]
    fn score_counts_ohlc_bonus() {
        let info = TableInfo {
            index: 0,
            selector: String::new(),
            headers: vec!["Date".into(), "Open".into(), "High".into(), "Low".into()],
            num_rows: 50,
            num_cols: 4,
            sample_row: vec![],
            has_numeric_data: true,
        };
        // 0.5 rows + 0.4 cols + 0.5 date + 0.5 financial + 1.0 ohlc
        assert!((table_score(&info) - 2.9).abs() < 1e-9);
    }
}
