//! Shape classification for JSON response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// How a JSON payload is laid out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectedStructure {
    /// Top-level list of objects.
    Timeseries,
    /// Top-level list of anything else.
    Array,
    /// Flat object.
    Object,
    /// Object holding a list of objects.
    NestedTimeseries,
    /// Object holding lists of numbers.
    ValueArrays,
}

/// Result of [`analyze_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonShape {
    pub structure: DetectedStructure,
    pub field_names: Vec<String>,
    pub row_count_estimate: Option<usize>,
}

/// Classifies a parsed JSON body.
///
/// For objects, keys are visited in document order. A list of numbers
/// marks `value_arrays` and adds its key to the field names; the first
/// list of objects marks `nested_timeseries`, replaces the field names
/// with that element's keys, and ends the scan.
#[must_use]
pub fn analyze_json(data: &Value) -> Option<JsonShape> {
    match data {
        Value::Array(items) => {
            let (structure, field_names) = match items.first() {
                Some(Value::Object(first)) => (
                    DetectedStructure::Timeseries,
                    first.keys().cloned().collect(),
                ),
                _ => (DetectedStructure::Array, Vec::new()),
            };
            Some(JsonShape {
                structure,
                field_names,
                row_count_estimate: Some(items.len()),
            })
        }
        Value::Object(map) => {
            let mut shape: Option<JsonShape> = None;

            for (key, value) in map {
                let Value::Array(items) = value else {
                    continue;
                };
                match items.first() {
                    Some(Value::Object(first)) => {
                        shape = Some(JsonShape {
                            structure: DetectedStructure::NestedTimeseries,
                            field_names: first.keys().cloned().collect(),
                            row_count_estimate: Some(items.len()),
                        });
                        break;
                    }
                    Some(Value::Number(_)) => {
                        let entry = shape.get_or_insert_with(|| JsonShape {
                            structure: DetectedStructure::ValueArrays,
                            field_names: Vec::new(),
                            row_count_estimate: None,
                        });
                        entry.row_count_estimate = Some(items.len());
                        entry.field_names.push(key.clone());
                    }
                    _ => {}
                }
            }

            Some(shape.unwrap_or_else(|| JsonShape {
                structure: DetectedStructure::Object,
                field_names: map.keys().cloned().collect(),
                row_count_estimate: None,
            }))
        }
        _ => None,
    }
}
