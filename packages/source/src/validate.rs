//! Data quality checks.
//!
//! [`structural_warnings`] is the lightweight check attached to every
//! scrape. [`DataValidator`] is the fuller pipeline validator with errors,
//! warnings and statistics.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Utc};
use data_fetch_scraper::{Cell, Table};
use serde::Serialize;

/// Above this share of nulls a column is an error.
pub const NULL_ERROR_PCT: f64 = 50.0;

/// Above this share of nulls a column is a warning.
pub const NULL_WARNING_PCT: f64 = 10.0;

/// IQR fence multiplier.
pub const OUTLIER_IQR_FACTOR: f64 = 3.0;

/// Minimum sample before outliers are checked.
pub const OUTLIER_MIN_SAMPLES: usize = 10;

/// Outlier share that triggers a warning.
pub const OUTLIER_WARNING_PCT: f64 = 5.0;

/// Gaps wider than this multiple of the median spacing are reported.
pub const GAP_FACTOR: i32 = 2;

fn is_date_like_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("date") || lower.contains("time")
}

/// Counts rows that repeat an earlier row. `None` when some cell cannot be
/// hashed.
#[must_use]
pub fn duplicate_rows(table: &Table) -> Option<usize> {
    let mut seen = BTreeSet::new();
    let mut duplicates = 0;
    for row in table.rows() {
        let key: Vec<String> = row.iter().map(Cell::hash_key).collect::<Option<_>>()?;
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    Some(duplicates)
}

fn null_count(table: &Table, column: &str) -> usize {
    table.column(column).filter(|c| c.is_null()).count()
}

/// Advisory checks run on every scrape result. Never blocks success.
#[must_use]
pub fn structural_warnings(table: &Table) -> Vec<String> {
    let mut warnings = Vec::new();
    if table.is_empty() {
        warnings.push("DataFrame is empty or None".to_owned());
        return warnings;
    }

    if !table.columns().iter().any(|c| is_date_like_name(c)) {
        warnings.push("No date/time column found".to_owned());
    }

    match duplicate_rows(table) {
        Some(0) => {}
        Some(n) => warnings.push(format!("Found {n} duplicate rows")),
        None => {
            warnings.push("Cannot check for duplicates (contains unhashable types)".to_owned());
        }
    }

    for column in table.columns() {
        let nulls = null_count(table, column);
        if nulls > 0 {
            warnings.push(format!("Column '{column}' has {nulls} NaN values"));
        }
    }
    warnings
}

// ── Pipeline validator ─────────────────────────────────────────────

/// Min/max/mean/std of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRangeStats {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
    pub span_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStats {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub duplicate_count: usize,
    pub duplicate_dates: usize,
    pub null_counts: BTreeMap<String, usize>,
    pub date_range: Option<DateRangeStats>,
    pub numeric_stats: BTreeMap<String, NumericStats>,
    pub outliers: BTreeMap<String, usize>,
    pub date_gaps: usize,
}

/// Errors make a result invalid; warnings are advisory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            stats: ValidationStats::default(),
        }
    }
}

impl ValidationResult {
    pub fn add_error(&mut self, message: String) {
        self.errors.push(message);
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// User-supplied check returning issue messages.
pub type CustomValidator = Box<dyn Fn(&Table) -> Vec<String> + Send + Sync>;

/// Quality checks for financial time series.
pub struct DataValidator {
    strict_mode: bool,
    date_column: String,
    numeric_columns: Vec<String>,
    custom: Vec<CustomValidator>,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strict_mode: false,
            date_column: "date".to_owned(),
            numeric_columns: Vec::new(),
            custom: Vec::new(),
        }
    }

    /// Custom validator issues become errors instead of warnings.
    #[must_use]
    pub const fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    #[must_use]
    pub fn with_date_column(mut self, column: &str) -> Self {
        column.clone_into(&mut self.date_column);
        self
    }

    /// Limits numeric checks to these columns.
    #[must_use]
    pub fn with_numeric_columns(mut self, columns: Vec<String>) -> Self {
        self.numeric_columns = columns;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: CustomValidator) -> Self {
        self.custom.push(validator);
        self
    }

    /// Runs every check.
    #[must_use]
    pub fn validate(&self, table: &Table) -> ValidationResult {
        let mut result = ValidationResult::default();
        if table.is_empty() {
            result.add_error("DataFrame is empty or None".to_owned());
            return result;
        }

        result.stats.row_count = table.len();
        result.stats.column_count = table.num_cols();
        result.stats.columns = table.columns().to_vec();

        self.check_required_columns(table, &mut result);
        self.check_duplicates(table, &mut result);
        check_nulls(table, &mut result);
        let dates = self.dates(table);
        check_dates(&self.date_column, table, dates.as_deref(), &mut result);
        self.check_numeric(table, &mut result);
        check_outliers(table, &mut result);
        if let Some(dates) = &dates {
            check_gaps(dates, &mut result);
        }

        for validator in &self.custom {
            for issue in validator(table) {
                if self.strict_mode {
                    result.add_error(issue);
                } else {
                    result.add_warning(issue);
                }
            }
        }

        log::info!(
            "Validation complete: valid={}, errors={}, warnings={}",
            result.is_valid,
            result.errors.len(),
            result.warnings.len()
        );
        result
    }

    fn check_required_columns(&self, table: &Table, result: &mut ValidationResult) {
        if table.has_column(&self.date_column) {
            return;
        }
        let candidates: Vec<&String> = table
            .columns()
            .iter()
            .filter(|c| is_date_like_name(c))
            .collect();
        if candidates.is_empty() {
            result.add_warning(format!(
                "No date column found (expected '{}')",
                self.date_column
            ));
        } else {
            result.add_warning(format!(
                "Expected date column '{}' not found. Found candidates: {candidates:?}",
                self.date_column
            ));
        }
    }

    fn check_duplicates(&self, table: &Table, result: &mut ValidationResult) {
        match duplicate_rows(table) {
            Some(0) => {}
            Some(n) => {
                result.add_warning(format!("Found {n} duplicate rows"));
                result.stats.duplicate_count = n;
            }
            None => result.add_warning(
                "Cannot check for duplicates: DataFrame contains unhashable types".to_owned(),
            ),
        }

        if table.has_column(&self.date_column) {
            let mut seen = BTreeSet::new();
            let dups = table
                .column(&self.date_column)
                .filter(|c| !c.is_null())
                .filter_map(Cell::hash_key)
                .filter(|k| !seen.insert(k.clone()))
                .count();
            if dups > 0 {
                result.add_warning(format!("Found {dups} duplicate dates"));
                result.stats.duplicate_dates = dups;
            }
        }
    }

    /// Non-null dates of the date column, or `None` when the column is
    /// missing or holds unparseable values.
    fn dates(&self, table: &Table) -> Option<Vec<NaiveDateTime>> {
        if !table.has_column(&self.date_column) {
            return None;
        }
        table
            .column(&self.date_column)
            .filter(|c| !c.is_null())
            .map(|c| match c {
                Cell::Timestamp(t) => Some(*t),
                other => data_fetch_scraper::dates::to_timestamp(other).as_timestamp(),
            })
            .collect()
    }

    fn check_numeric(&self, table: &Table, result: &mut ValidationResult) {
        let columns: Vec<String> = if self.numeric_columns.is_empty() {
            numeric_columns(table)
        } else {
            self.numeric_columns.clone()
        };

        for column in columns.iter().filter(|c| table.has_column(c)) {
            let values = numeric_values(table, column);
            let negatives = values.iter().filter(|v| **v < 0.0).count();
            if negatives > 0 {
                result.add_warning(format!("Column '{column}' has {negatives} negative values"));
            }
            if let Some(stats) = numeric_stats(&values) {
                result.stats.numeric_stats.insert(column.clone(), stats);
            }
        }
    }
}

fn check_nulls(table: &Table, result: &mut ValidationResult) {
    #[allow(clippy::cast_precision_loss)]
    let rows = table.len() as f64;
    for column in table.columns() {
        let nulls = null_count(table, column);
        if nulls == 0 {
            continue;
        }
        result.stats.null_counts.insert(column.clone(), nulls);
        #[allow(clippy::cast_precision_loss)]
        let pct = nulls as f64 / rows * 100.0;
        if pct > NULL_ERROR_PCT {
            result.add_error(format!("Column '{column}' has {pct:.1}% null values"));
        } else if pct > NULL_WARNING_PCT {
            result.add_warning(format!(
                "Column '{column}' has {pct:.1}% null values ({nulls} rows)"
            ));
        }
    }
}

fn check_dates(
    date_column: &str,
    table: &Table,
    dates: Option<&[NaiveDateTime]>,
    result: &mut ValidationResult,
) {
    if !table.has_column(date_column) {
        return;
    }
    let Some(dates) = dates else {
        result.add_warning(format!("Column '{date_column}' cannot be parsed as datetime"));
        return;
    };
    let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) else {
        return;
    };
    result.stats.date_range = Some(DateRangeStats {
        min: *min,
        max: *max,
        span_days: (*max - *min).num_days(),
    });

    let now = Utc::now().naive_utc();
    let future = dates.iter().filter(|d| **d > now).count();
    if future > 0 {
        result.add_warning(format!("Found {future} future dates"));
    }

    let cutoff = NaiveDate::from_ymd_opt(2000, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    if let Some(cutoff) = cutoff {
        let old = dates.iter().filter(|d| **d < cutoff).count();
        if old > 0 {
            result.add_warning(format!("Found {old} dates before 2000"));
        }
    }
}

/// Columns whose non-null cells are all numbers.
fn numeric_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|c| {
            let mut non_null = table.column(c).filter(|cell| !cell.is_null()).peekable();
            non_null.peek().is_some() && non_null.all(|cell| cell.as_f64().is_some())
        })
        .cloned()
        .collect()
}

fn numeric_values(table: &Table, column: &str) -> Vec<f64> {
    table.column(column).filter_map(Cell::as_f64).collect()
}

#[allow(clippy::cast_precision_loss)]
fn numeric_stats(values: &[f64]) -> Option<NumericStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.len() > 1).then(|| {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    });
    Some(NumericStats {
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        std,
    })
}

/// Linear-interpolated quantile of sorted values.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn check_outliers(table: &Table, result: &mut ValidationResult) {
    for column in numeric_columns(table) {
        let mut values = numeric_values(table, &column);
        if values.len() < OUTLIER_MIN_SAMPLES {
            continue;
        }
        values.sort_by(f64::total_cmp);
        let q1 = quantile(&values, 0.25);
        let q3 = quantile(&values, 0.75);
        let iqr = q3 - q1;
        let (lower, upper) = (q1 - OUTLIER_IQR_FACTOR * iqr, q3 + OUTLIER_IQR_FACTOR * iqr);
        let outliers = values.iter().filter(|v| **v < lower || **v > upper).count();
        if outliers == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = outliers as f64 / values.len() as f64 * 100.0;
        if pct > OUTLIER_WARNING_PCT {
            result.add_warning(format!(
                "Column '{column}' has {outliers} potential outliers ({pct:.1}%)"
            ));
        }
        result.stats.outliers.insert(column, outliers);
    }
}

fn check_gaps(dates: &[NaiveDateTime], result: &mut ValidationResult) {
    let mut sorted = dates.to_vec();
    sorted.sort();
    if sorted.len() < 2 {
        return;
    }
    let mut diffs: Vec<TimeDelta> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    diffs.sort();
    let median = diffs[diffs.len() / 2];
    let gaps = diffs.iter().filter(|d| **d > median * GAP_FACTOR).count();
    if gaps > 0 {
        result.add_warning(format!(
            "Found {gaps} date gaps (>2x expected frequency)"
        ));
        result.stats.date_gaps = gaps;
    }
}

/// Validates with defaults (`date` column, non-strict).
#[must_use]
pub fn validate_financial_data(table: &Table, date_column: &str, strict: bool) -> ValidationResult {
    DataValidator::new()
        .with_date_column(date_column)
        .with_strict_mode(strict)
        .validate(table)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn day(d: u32) -> Cell {
        Cell::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn series(values: &[Option<f64>]) -> Table {
        let mut table = Table::new(vec!["date".to_owned(), "value".to_owned()]);
        for (i, v) in values.iter().enumerate() {
            let d = u32::try_from(i).unwrap() + 1;
            table.push_row(vec![day(d), v.map_or(Cell::Null, Cell::Number)]);
        }
        table
    }

    #[test]
    fn structural_warning_texts() {
        assert_eq!(structural_warnings(&Table::default()), vec!["DataFrame is empty or None"]);

        let mut table = Table::new(vec!["price".to_owned()]);
        table.push_row(vec![Cell::Number(1.0)]);
        table.push_row(vec![Cell::Number(1.0)]);
        table.push_row(vec![Cell::Null]);
        assert_eq!(
            structural_warnings(&table),
            vec![
                "No date/time column found",
                "Found 1 duplicate rows",
                "Column 'price' has 1 NaN values",
            ]
        );

        let mut nested = Table::new(vec!["date".to_owned(), "meta".to_owned()]);
        nested.push_row(vec![day(1), Cell::Json(json!({"a": 1}))]);
        assert_eq!(
            structural_warnings(&nested),
            vec!["Cannot check for duplicates (contains unhashable types)"]
        );
    }

    #[test]
    fn null_thresholds() {
        let sixty: Vec<Option<f64>> = (0..10).map(|i| (i >= 6).then_some(1.0)).collect();
        let result = DataValidator::new().validate(&series(&sixty));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e == "Column 'value' has 60.0% null values"));

        let mut fifteen: Vec<Option<f64>> = (0..20).map(|i| Some(f64::from(i))).collect();
        fifteen[0] = None;
        fifteen[1] = None;
        fifteen[2] = None;
        let result = DataValidator::new().validate(&series(&fifteen));
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result
            .warnings
            .iter()
            .any(|w| w == "Column 'value' has 15.0% null values (3 rows)"));
    }

    #[test]
    fn missing_date_column_lists_candidates() {
        let mut table = Table::new(vec!["timestamp".to_owned(), "v".to_owned()]);
        table.push_row(vec![day(1), Cell::Number(1.0)]);
        let result = DataValidator::new().validate(&table);
        assert!(result.warnings[0].starts_with("Expected date column 'date' not found"));
        assert!(result.warnings[0].contains("timestamp"));
    }

    #[test]
    fn detects_outliers_gaps_and_negatives() {
        let mut values: Vec<Option<f64>> = (0..20).map(|_| Some(10.0)).collect();
        values[5] = Some(1000.0);
        values[6] = Some(-5.0);
        let mut table = series(&values);
        // drop days 11..=20 spacing: shift last date far out
        table.map_column("date", |c| match c {
            Cell::Timestamp(t) if t.format("%d").to_string() == "20" => {
                Cell::Timestamp(*t + TimeDelta::days(30))
            }
            other => other.clone(),
        });

        let result = DataValidator::new().validate(&table);
        assert!(result.warnings.iter().any(|w| w == "Column 'value' has 1 negative values"));
        assert_eq!(result.stats.outliers.get("value"), Some(&2));
        assert!(result.warnings.iter().any(|w| w.starts_with("Column 'value' has 2 potential outliers")));
        assert_eq!(result.stats.date_gaps, 1);
        assert!(result.warnings.iter().any(|w| w == "Found 1 date gaps (>2x expected frequency)"));
        assert_eq!(result.stats.date_range.as_ref().unwrap().span_days, 49);
    }

    #[test]
    fn strict_mode_promotes_custom_issues() {
        let table = series(&[Some(1.0), Some(2.0)]);
        let check: CustomValidator = Box::new(|_| vec!["custom issue".to_owned()]);
        let lenient = DataValidator::new()
            .with_validator(Box::new(|_| vec!["custom issue".to_owned()]))
            .validate(&table);
        assert!(lenient.is_valid);
        assert!(lenient.warnings.contains(&"custom issue".to_owned()));

        let strict = DataValidator::new()
            .with_strict_mode(true)
            .with_validator(check)
            .validate(&table);
        assert!(!strict.is_valid);
        assert_eq!(strict.errors, vec!["custom issue"]);
    }

    #[test]
    fn old_dates_are_flagged() {
        let mut table = Table::new(vec!["date".to_owned(), "v".to_owned()]);
        table.push_row(vec![Cell::Text("1999-12-31".to_owned()), Cell::Number(1.0)]);
        table.push_row(vec![Cell::Text("2024-01-01".to_owned()), Cell::Number(2.0)]);
        let result = validate_financial_data(&table, "date", false);
        assert!(result.warnings.contains(&"Found 1 dates before 2000".to_owned()));
    }
}
