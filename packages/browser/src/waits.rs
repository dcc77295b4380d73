//! JavaScript checks used while waiting for a page to finish loading data.
//!
//! These are plain expression strings so they can be evaluated by any
//! driver and inspected in tests.

use std::time::Duration;

/// Interval between data-loaded checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Globals commonly populated once a page has its data.
pub const DATA_GLOBALS: &[&str] = &[
    "__INITIAL_STATE__",
    "__DATA__",
    "data",
    "chartData",
    "seriesData",
];

/// Class names sites set on containers once data is rendered.
pub const READY_CLASSES: &[&str] = &[
    "data-loaded",
    "loaded",
    "ready",
    "initialized",
    "table-loaded",
    "chart-ready",
    "data-ready",
];

/// Selectors for spinners and placeholders that must be gone.
pub const LOADING_INDICATORS: &[&str] = &[
    ".loading",
    ".spinner",
    ".loader",
    "[data-loading='true']",
    ".skeleton",
    ".placeholder",
];

/// Expression that is `true` when `name` is defined on `window`.
///
/// Accepts both `foo` and `window.foo`.
#[must_use]
pub fn js_variable_defined(name: &str) -> String {
    let name = name.strip_prefix("window.").unwrap_or(name);
    format!("typeof window.{name} !== 'undefined'")
}

/// Individual readiness checks, any one of which signals data.
#[must_use]
pub fn data_loaded_checks() -> Vec<String> {
    let mut checks: Vec<String> = DATA_GLOBALS.iter().map(|g| js_variable_defined(g)).collect();
    checks.push("document.querySelectorAll('table tbody tr').length > 0".to_owned());
    checks.push("document.querySelectorAll('table tr').length > 1".to_owned());
    checks.push("document.querySelectorAll('[data-chart], [data-series]').length > 0".to_owned());
    checks.extend(
        READY_CLASSES
            .iter()
            .map(|class| format!("document.querySelectorAll('.{class}').length > 0")),
    );
    checks
}

/// Expression that is `true` when no loading indicator is present.
#[must_use]
pub fn loading_indicators_gone() -> String {
    LOADING_INDICATORS
        .iter()
        .map(|sel| format!("document.querySelectorAll(\"{sel}\").length === 0"))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Single check combining every data check with the indicator check.
#[must_use]
pub fn data_loaded_check() -> String {
    let any_data = data_loaded_checks()
        .iter()
        .map(|c| format!("({c})"))
        .collect::<Vec<_>>()
        .join(" || ");
    format!(
        "(() => {{ try {{ return ({any_data}) && ({}); }} catch (e) {{ return false; }} }})()",
        loading_indicators_gone()
    )
}
