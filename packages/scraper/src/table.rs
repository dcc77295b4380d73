//! In-memory tabular data produced by every parser.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

/// One typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// A nested object or list kept as-is. Cannot take part in
    /// duplicate-row detection.
    Json(Value),
}

impl Cell {
    /// Converts a JSON scalar, keeping nested values as [`Cell::Json`].
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Json(value.clone()),
        }
    }

    /// Like [`Cell::from_json`] but serializes nested values to a JSON
    /// string.
    #[must_use]
    pub fn from_json_flat(value: &Value) -> Self {
        match value {
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
            other => Self::from_json(other),
        }
    }

    /// `true` for [`Cell::Null`] and NaN numbers.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Numeric value, if this is a number.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Text value, if this is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp value, if this is a timestamp.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Whether the cell can be hashed for duplicate detection.
    #[must_use]
    pub const fn is_hashable(&self) -> bool {
        !matches!(self, Self::Json(_))
    }

    /// Stable key used for duplicate detection.
    #[must_use]
    pub fn hash_key(&self) -> Option<String> {
        match self {
            Self::Null => Some("\u{0}null".to_owned()),
            Self::Bool(b) => Some(format!("b:{b}")),
            Self::Number(n) => Some(format!("n:{n}")),
            Self::Text(s) => Some(format!("s:{s}")),
            Self::Timestamp(t) => Some(format!("t:{t}")),
            Self::Json(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Rows and named columns. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    #[must_use]
    pub const fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from row-shaped JSON objects.
    ///
    /// Columns are the union of keys in first-seen order; missing keys
    /// become nulls. With `flatten_nested`, nested values are stored as
    /// JSON strings.
    #[must_use]
    pub fn from_records(records: &[serde_json::Map<String, Value>], flatten_nested: bool) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self::new(columns);
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|col| {
                    record.get(col).map_or(Cell::Null, |v| {
                        if flatten_nested {
                            Cell::from_json_flat(v)
                        } else {
                            Cell::from_json(v)
                        }
                    })
                })
                .collect();
            table.rows.push(row);
        }
        table
    }

    /// Appends a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when there are no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.columns.len()
    }

    /// Position of `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether `name` is a column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterates the cells of column `name`.
    pub fn column(&self, name: &str) -> impl Iterator<Item = &Cell> {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Cell at (`row`, `name`).
    #[must_use]
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Replaces every cell of column `name` using `f`.
    pub fn map_column(&mut self, name: &str, mut f: impl FnMut(&Cell) -> Cell) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    /// Renames a column. Returns `false` if it does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                to.clone_into(&mut self.columns[idx]);
                true
            }
            None => false,
        }
    }

    /// Appends a column computed per row.
    pub fn add_column(&mut self, name: &str, mut f: impl FnMut(&[Cell]) -> Cell) {
        for row in &mut self.rows {
            let value = f(row);
            row.push(value);
        }
        self.columns.push(name.to_owned());
    }

    /// Builds a new table from the given columns, in order. Unknown names
    /// are skipped.
    #[must_use]
    pub fn select(&self, names: &[String]) -> Self {
        let indices: Vec<(String, usize)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (n.clone(), i)))
            .collect();
        Self {
            columns: indices.iter().map(|(n, _)| n.clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|(_, i)| row[*i].clone()).collect())
                .collect(),
        }
    }

    /// Row `idx` as a column-name map.
    #[must_use]
    pub fn record(&self, idx: usize) -> Option<BTreeMap<&str, &Cell>> {
        let row = self.rows.get(idx)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect(),
        )
    }

    /// Iterates rows as column-name maps.
    pub fn records(&self) -> impl Iterator<Item = BTreeMap<&str, &Cell>> {
        (0..self.rows.len()).filter_map(|i| self.record(i))
    }

    /// First `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

/// Makes header names unique: repeats get `_1`, `_2`, ... and blanks
/// become `column`.
#[must_use]
pub fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    headers
        .into_iter()
        .map(|h| {
            let h = if h.is_empty() { "column".to_owned() } else { h };
            match seen.get_mut(&h) {
                Some(count) => {
                    *count += 1;
                    format!("{h}_{count}")
                }
                None => {
                    seen.insert(h.clone(), 0);
                    h
                }
            }
        })
        .collect()
}
