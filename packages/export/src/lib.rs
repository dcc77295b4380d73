#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Writes [`Table`]s to `.xlsx` workbooks.
//!
//! Each table becomes one sheet with a bold, shaded header row that stays
//! frozen while scrolling. Column widths follow the longest value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use data_fetch_scraper::{Cell, Table};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use thiserror::Error;

const MAX_COLUMN_WIDTH: usize = 50;
const MAX_SHEET_NAME: usize = 31;
const HEADER_FILL: u32 = 0x00E0_E0E0;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one table to `path` as a single-sheet workbook.
///
/// # Errors
///
/// Returns [`ExportError`] if the workbook cannot be built or saved.
pub fn export_table(table: &Table, path: &Path, sheet_name: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut workbook = Workbook::new();
    write_sheet(workbook.add_worksheet(), table, sheet_name)?;
    workbook.save(path)?;
    log::info!("Exported {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Writes every table to one workbook named
/// `{prefix}_{YYYYMMDD_HHMMSS}.xlsx` inside `dir`, returning its path.
///
/// # Errors
///
/// Returns [`ExportError`] if `dir` cannot be created or the workbook
/// cannot be built or saved.
pub fn export_sheets(
    sheets: &BTreeMap<String, Table>,
    dir: &Path,
    prefix: &str,
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{prefix}_{stamp}.xlsx"));

    let mut workbook = Workbook::new();
    let mut used: Vec<String> = Vec::new();
    for (name, table) in sheets {
        let mut sheet_name = sheet_name(name);
        if used.contains(&sheet_name) {
            let suffix = format!("_{}", used.len());
            let keep = MAX_SHEET_NAME - suffix.len();
            sheet_name = format!("{}{suffix}", sheet_name.chars().take(keep).collect::<String>());
        }
        write_sheet(workbook.add_worksheet(), table, &sheet_name)?;
        used.push(sheet_name);
    }
    if used.is_empty() {
        workbook.add_worksheet();
    }
    workbook.save(&path)?;
    log::info!("Exported {} sheets to {}", used.len(), path.display());
    Ok(path)
}

/// Excel-safe sheet name: no `[]:*?/\`, at most 31 characters.
#[must_use]
pub fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    if cleaned.is_empty() {
        "Sheet1".to_owned()
    } else {
        cleaned.to_owned()
    }
}

fn write_sheet(sheet: &mut Worksheet, table: &Table, name: &str) -> Result<(), ExportError> {
    sheet.set_name(name)?;
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL));

    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.chars().count()).collect();
    for (col, column) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, col_index(col)?, column, &header)?;
    }

    for (row, cells) in table.rows().iter().enumerate() {
        let row = u32::try_from(row + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in cells.iter().enumerate() {
            let len = write_cell(sheet, row, col_index(col)?, cell)?;
            widths[col] = widths[col].max(len);
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let width = (width + 2).min(MAX_COLUMN_WIDTH) as f64;
        sheet.set_column_width(col_index(col)?, width)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Writes one cell and returns its display length.
fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<usize, XlsxError> {
    match cell {
        Cell::Null => return Ok(0),
        Cell::Number(n) if n.is_finite() => {
            sheet.write_number(row, col, *n)?;
        }
        Cell::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        other => {
            sheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(cell.to_string().chars().count())
}

fn col_index(col: usize) -> Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let mut table = Table::new(vec!["date".to_owned(), "volume".to_owned(), "note".to_owned()]);
        table.push_row(vec![
            Cell::Text("2024-01-01".to_owned()),
            Cell::Number(1.5),
            Cell::Text("x".repeat(80)),
        ]);
        table.push_row(vec![Cell::Text("2024-01-02".to_owned()), Cell::Null, Cell::Bool(true)]);
        table
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sheet_name("coinglass/btc:overview"), "coinglass_btc_overview");
        assert_eq!(sheet_name(&"a".repeat(40)).len(), 31);
        assert_eq!(sheet_name("''"), "Sheet1");
    }

    #[test]
    fn writes_single_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.xlsx");
        export_table(&table(), &path, "data").unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn writes_one_sheet_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheets = BTreeMap::new();
        sheets.insert(format!("{}_one", "s".repeat(30)), table());
        sheets.insert(format!("{}_two", "s".repeat(30)), Table::default());

        let path = export_sheets(&sheets, dir.path(), "scrape").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_owned();
        assert!(name.starts_with("scrape_"));
        assert!(name.ends_with(".xlsx"));
        assert_eq!(name.len(), "scrape_20240101_120000.xlsx".len());
        assert!(path.exists());
    }
}
