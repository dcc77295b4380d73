//! JSON payload to [`Table`] conversion.
//!
//! Each structural hypothesis is a case in [`JsonLayout`], tried in a fixed
//! order: array of objects, parallel arrays, nested array of objects, flat
//! object. The first one that fits wins.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ScrapeError;
use crate::dates::convert_date_columns;
use crate::table::{Cell, Table};

/// The layout a JSON value was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonLayout {
    /// `[{...}, {...}]`
    RecordArray,
    /// `[[...], [...]]`, columns named by position.
    RowArrays,
    /// `[1, 2, 3]`, a single `value` column.
    ScalarArray,
    /// `{"a": [...], "b": [...]}` with equal lengths.
    ParallelArrays,
    /// `{"meta": ..., "rows": [{...}]}`
    NestedRecords,
    /// `{"a": 1, "b": 2}`, one row.
    FlatObject,
    /// Anything else; an empty table.
    Empty,
}

/// Options for [`extract`].
#[derive(Debug, Clone, Default)]
pub struct JsonOptions {
    /// Dot path to the data, e.g. `data.series` or `results.0.rows`.
    pub data_path: Option<String>,
    /// Output column -> input column or dotted path into a nested column.
    pub field_mappings: BTreeMap<String, String>,
}

/// Parses `body` and extracts a table.
///
/// # Errors
///
/// Returns [`ScrapeError::Json`] for malformed JSON and
/// [`ScrapeError::Lookup`] when `data_path` does not resolve.
pub fn extract_str(body: &str, options: &JsonOptions) -> Result<Table, ScrapeError> {
    let value: Value = serde_json::from_str(body)?;
    extract(&value, options)
}

/// Extracts a table from an already-parsed JSON value.
///
/// # Errors
///
/// Returns [`ScrapeError::Lookup`] when `data_path` does not resolve.
pub fn extract(value: &Value, options: &JsonOptions) -> Result<Table, ScrapeError> {
    let data = match options.data_path.as_deref() {
        Some(path) => navigate_path(value, path)?,
        None => value,
    };

    let (layout, mut table) = to_table(data);
    log::debug!("JSON layout: {layout:?}");

    if !options.field_mappings.is_empty() && !table.is_empty() {
        table = apply_mappings(&table, &options.field_mappings);
    }
    convert_date_columns(&mut table);

    log::info!("Extracted JSON data with {} rows", table.len());
    Ok(table)
}

/// Follows a dot path through objects and arrays.
///
/// Numeric segments index arrays. Empty segments are ignored.
///
/// # Errors
///
/// Returns [`ScrapeError::Lookup`] naming the first segment that fails.
pub fn navigate_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value, ScrapeError> {
    let mut current = value;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = if part.chars().all(|c| c.is_ascii_digit()) {
            let idx: usize = part
                .parse()
                .map_err(|_| ScrapeError::Lookup(format!("Array index {part} out of range")))?;
            match current {
                Value::Array(items) => items
                    .get(idx)
                    .ok_or_else(|| ScrapeError::Lookup(format!("Array index {idx} out of range")))?,
                _ => {
                    return Err(ScrapeError::Lookup(format!(
                        "Array index {idx} out of range"
                    )));
                }
            }
        } else {
            match current {
                Value::Object(map) => map.get(part).ok_or_else(|| {
                    ScrapeError::Lookup(format!("Key '{part}' not found in data"))
                })?,
                other => {
                    return Err(ScrapeError::Lookup(format!(
                        "Cannot navigate to '{part}' in {}",
                        type_name(other)
                    )));
                }
            }
        };
    }
    Ok(current)
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_record_array(items: &[Value]) -> bool {
    matches!(items.first(), Some(Value::Object(_)))
}

/// Classifies `data` without building a table.
#[must_use]
pub fn classify(data: &Value) -> JsonLayout {
    match data {
        Value::Array(items) => match items.first() {
            Some(Value::Object(_)) => JsonLayout::RecordArray,
            Some(Value::Array(_)) => JsonLayout::RowArrays,
            _ => JsonLayout::ScalarArray,
        },
        Value::Object(map) => {
            let arrays: Vec<&Vec<Value>> = map
                .values()
                .filter_map(|v| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .collect();

            let has_nested_records = arrays.iter().any(|a| is_record_array(a));
            let same_length = arrays.windows(2).all(|w| w[0].len() == w[1].len());

            if !arrays.is_empty() && same_length && !has_nested_records {
                JsonLayout::ParallelArrays
            } else if has_nested_records {
                JsonLayout::NestedRecords
            } else {
                JsonLayout::FlatObject
            }
        }
        _ => JsonLayout::Empty,
    }
}

fn objects(items: &[Value]) -> Vec<Map<String, Value>> {
    items
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

fn to_table(data: &Value) -> (JsonLayout, Table) {
    let layout = classify(data);
    let table = match (layout, data) {
        (JsonLayout::RecordArray, Value::Array(items)) => Table::from_records(&objects(items), true),
        (JsonLayout::RowArrays, Value::Array(items)) => {
            let width = items
                .iter()
                .filter_map(Value::as_array)
                .map(Vec::len)
                .max()
                .unwrap_or(0);
            let mut table = Table::new((0..width).map(|i| i.to_string()).collect());
            for row in items.iter().filter_map(Value::as_array) {
                table.push_row(row.iter().map(Cell::from_json_flat).collect());
            }
            table
        }
        (JsonLayout::ScalarArray, Value::Array(items)) => {
            let mut table = Table::new(vec!["value".to_owned()]);
            for item in items {
                table.push_row(vec![Cell::from_json_flat(item)]);
            }
            table
        }
        (JsonLayout::ParallelArrays, Value::Object(map)) => {
            let columns: Vec<(&String, &Vec<Value>)> = map
                .iter()
                .filter_map(|(k, v)| v.as_array().map(|a| (k, a)))
                .collect();
            let len = columns.first().map_or(0, |(_, a)| a.len());
            let mut table = Table::new(columns.iter().map(|(k, _)| (*k).clone()).collect());
            for i in 0..len {
                table.push_row(
                    columns
                        .iter()
                        .map(|(_, a)| Cell::from_json_flat(&a[i]))
                        .collect(),
                );
            }
            table
        }
        (JsonLayout::NestedRecords, Value::Object(map)) => map
            .values()
            .find_map(|v| v.as_array().filter(|a| is_record_array(a)))
            .map(|items| Table::from_records(&objects(items), true))
            .unwrap_or_default(),
        (JsonLayout::FlatObject, Value::Object(map)) => Table::from_records(&[map.clone()], true),
        _ => Table::default(),
    };
    (layout, table)
}

fn lookup_nested(cell: &Cell, parts: &[&str]) -> Cell {
    let parsed;
    let mut current: &Value = match cell {
        Cell::Json(v) => v,
        Cell::Text(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => return Cell::Null,
        },
        _ => return Cell::Null,
    };
    for part in parts {
        match current.get(*part) {
            Some(next) => current = next,
            None => return Cell::Null,
        }
    }
    Cell::from_json_flat(current)
}

/// Renames and selects columns. Unmapped columns are kept after the mapped
/// ones.
///
/// An input containing `.` reads from a nested object held in the column
/// named by its first segment.
#[must_use]
pub fn apply_mappings(table: &Table, mappings: &BTreeMap<String, String>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut extractors: Vec<Box<dyn Fn(&[Cell]) -> Cell + '_>> = Vec::new();

    for (output, input) in mappings {
        let mut parts = input.split('.');
        let head = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();
        let Some(idx) = table.column_index(head) else {
            continue;
        };
        columns.push(output.clone());
        if rest.is_empty() {
            extractors.push(Box::new(move |row: &[Cell]| row[idx].clone()));
        } else {
            extractors.push(Box::new(move |row: &[Cell]| lookup_nested(&row[idx], &rest)));
        }
    }

    let mapped_inputs: Vec<&str> = mappings.values().map(String::as_str).collect();
    for (idx, name) in table.columns().iter().enumerate() {
        if columns.contains(name) || mapped_inputs.contains(&name.as_str()) {
            continue;
        }
        columns.push(name.clone());
        extractors.push(Box::new(move |row: &[Cell]| row[idx].clone()));
    }

    let mut out = Table::new(columns);
    for row in table.rows() {
        out.push_row(extractors.iter().map(|f| f(row)).collect());
    }
    out
}

/// Summary returned by [`detect_structure`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureInfo {
    /// `list`, `dict` or the scalar type.
    pub kind: String,
    pub is_timeseries: bool,
    /// Keys (or `""` for the root) holding arrays of objects.
    pub data_paths: Vec<String>,
    pub field_names: Vec<String>,
    pub nested_fields: Vec<String>,
    pub row_count: usize,
}

/// Describes the top level of a JSON value.
#[must_use]
pub fn detect_structure(data: &Value) -> StructureInfo {
    let mut info = StructureInfo {
        kind: match data {
            Value::Array(_) => "list".to_owned(),
            Value::Object(_) => "dict".to_owned(),
            other => type_name(other).to_owned(),
        },
        ..StructureInfo::default()
    };

    match data {
        Value::Array(items) => {
            info.row_count = items.len();
            if let Some(Value::Object(first)) = items.first() {
                info.is_timeseries = true;
                info.field_names = first.keys().cloned().collect();
                info.data_paths.push(String::new());
            }
        }
        Value::Object(map) => {
            info.field_names = map.keys().cloned().collect();
            for (key, value) in map {
                if let Value::Array(items) = value
                    && let Some(Value::Object(first)) = items.first()
                {
                    info.data_paths.push(key.clone());
                    info.is_timeseries = true;
                    info.row_count = items.len();
                    info.nested_fields = first.keys().cloned().collect();
                }
            }
        }
        _ => {}
    }
    info
}

/// Kind of array found by [`find_data_arrays`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    ObjectArray,
    ValueArray,
}

/// One array located by [`find_data_arrays`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataArray {
    /// Dot path usable as [`JsonOptions::data_path`].
    pub path: String,
    pub kind: ArrayKind,
    pub count: usize,
    pub fields: Vec<String>,
}

/// Recursively lists arrays of objects or numbers under `data`.
#[must_use]
pub fn find_data_arrays(data: &Value) -> Vec<DataArray> {
    let mut found = Vec::new();
    walk_arrays(data, "", &mut found);
    found
}

fn walk_arrays(data: &Value, path: &str, found: &mut Vec<DataArray>) {
    match data {
        Value::Array(items) => match items.first() {
            Some(Value::Object(first)) => found.push(DataArray {
                path: path.to_owned(),
                kind: ArrayKind::ObjectArray,
                count: items.len(),
                fields: first.keys().cloned().collect(),
            }),
            Some(Value::Number(_)) => found.push(DataArray {
                path: path.to_owned(),
                kind: ArrayKind::ValueArray,
                count: items.len(),
                fields: Vec::new(),
            }),
            _ => {}
        },
        Value::Object(map) => {
            for (key, value) in map {
                let next = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk_arrays(value, &next, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn data_path_reaches_nested_series() {
        let body = r#"{"data":{"series":[{"date":"2024-01-01","value":100}]}}"#;
        let options = JsonOptions {
            data_path: Some("data.series".to_owned()),
            ..JsonOptions::default()
        };
        let table = extract_str(body, &options).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns(), ["date", "value"]);
        assert!(matches!(table.get(0, "date"), Some(Cell::Timestamp(_))));
        assert_eq!(table.get(0, "value"), Some(&Cell::Number(100.0)));
    }

    #[test]
    fn missing_path_segments_are_errors() {
        let value = json!({"data": {"series": [1]}});
        let err = navigate_path(&value, "data.missing").unwrap_err();
        assert_eq!(err.to_string(), "Lookup error: Key 'missing' not found in data");
        let err = navigate_path(&value, "data.series.4").unwrap_err();
        assert!(err.to_string().contains("Array index 4 out of range"));
        let err = navigate_path(&value, "data.series.0.x").unwrap_err();
        assert!(err.to_string().contains("Cannot navigate to 'x' in number"));
    }

    #[test]
    fn parallel_arrays_become_columns() {
        let value = json!({"dates": ["2024-01-01", "2024-01-02"], "values": [1, 2], "name": "x"});
        assert_eq!(classify(&value), JsonLayout::ParallelArrays);
        let table = extract(&value, &JsonOptions::default()).unwrap();
        assert_eq!(table.columns(), ["dates", "values"]);
        assert_eq!(table.len(), 2);
        assert!(matches!(table.get(1, "dates"), Some(Cell::Timestamp(_))));
    }

    #[test]
    fn nested_records_are_flattened() {
        let value = json!({"meta": {"n": 2}, "rows": [{"v": 1, "extra": {"a": 1}}, {"v": 2, "extra": [1]}]});
        assert_eq!(classify(&value), JsonLayout::NestedRecords);
        let table = extract(&value, &JsonOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "extra"), Some(&Cell::Text(r#"{"a":1}"#.to_owned())));
    }

    #[test]
    fn flat_object_is_single_row() {
        let value = json!({"price": 1.5, "tags": ["a"], "name": null});
        let table = extract(&value, &JsonOptions::default()).unwrap();
        assert_eq!(table.len(), 1);
        // one array present, so this is parallel arrays of length 1
        assert_eq!(classify(&value), JsonLayout::ParallelArrays);

        let value = json!({"price": 1.5, "name": "x"});
        assert_eq!(classify(&value), JsonLayout::FlatObject);
        let table = extract(&value, &JsonOptions::default()).unwrap();
        assert_eq!(table.columns(), ["price", "name"]);
    }

    #[test]
    fn scalar_and_row_arrays() {
        let table = extract(&json!([1, 2, 3]), &JsonOptions::default()).unwrap();
        assert_eq!(table.columns(), ["value"]);
        assert_eq!(table.len(), 3);

        let table = extract(&json!([[1, 2], [3, 4]]), &JsonOptions::default()).unwrap();
        assert_eq!(table.columns(), ["0", "1"]);
        assert_eq!(table.get(1, "1"), Some(&Cell::Number(4.0)));
    }

    #[test]
    fn epoch_columns_become_timestamps() {
        let value = json!([{"timestamp": 1_704_067_200_000_i64, "v": 1}, {"timestamp": 5, "v": 2}]);
        let table = extract(&value, &JsonOptions::default()).unwrap();
        assert!(matches!(table.get(0, "timestamp"), Some(Cell::Timestamp(_))));
        assert_eq!(table.get(1, "timestamp"), Some(&Cell::Null));
    }

    #[test]
    fn mappings_rename_and_keep_unmapped() {
        let value = json!([{"t": "2024-01-01", "stats": {"price": 10}, "other": 1}]);
        let mut mappings = BTreeMap::new();
        mappings.insert("date".to_owned(), "t".to_owned());
        mappings.insert("price".to_owned(), "stats.price".to_owned());
        let options = JsonOptions {
            data_path: None,
            field_mappings: mappings,
        };
        let table = extract(&value, &options).unwrap();
        assert_eq!(table.columns(), ["date", "price", "stats", "other"]);
        assert_eq!(table.get(0, "price"), Some(&Cell::Number(10.0)));
        assert!(matches!(table.get(0, "date"), Some(Cell::Timestamp(_))));
    }

    #[test]
    fn structure_and_array_discovery() {
        let value = json!({"a": {"b": [{"x": 1}], "c": [1.0, 2.0]}, "d": [{"y": 2}, {"y": 3}]});
        let info = detect_structure(&value);
        assert_eq!(info.kind, "dict");
        assert!(info.is_timeseries);
        assert_eq!(info.data_paths, vec!["d"]);
        assert_eq!(info.row_count, 2);

        let arrays = find_data_arrays(&value);
        let paths: Vec<&str> = arrays.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["a.b", "a.c", "d"]);
        assert_eq!(arrays[1].kind, ArrayKind::ValueArray);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            extract_str("{not json", &JsonOptions::default()),
            Err(ScrapeError::Json(_))
        ));
    }
}
