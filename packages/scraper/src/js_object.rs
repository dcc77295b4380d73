//! Extraction of data embedded in page JavaScript.
//!
//! Looks for assignments such as `window.__INITIAL_STATE__ = {...};`, then
//! for JSON `<script>` blocks, and converts the first value that parses into
//! a [`Table`]. The search is first-match: candidates are never compared.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::table::{Cell, Table};

/// Global variable names commonly used by site frameworks to ship state.
pub const KNOWN_VARIABLES: &[&str] = &[
    "__INITIAL_STATE__",
    "__DATA__",
    "__INITIAL_DATA__",
    "window.data",
    "window.chartData",
    "window.seriesData",
    "initialData",
    "chartData",
    "seriesData",
    "window.quoteData",
    "window.marketData",
    "window.stockData",
    "quoteData",
    "marketData",
    "stockData",
    "instrumentData",
    "tickerData",
    "priceData",
    "__REDUX_STATE__",
    "__APOLLO_STATE__",
    "window.__REACT_QUERY_STATE__",
    "window.__NEXT_DATA__",
    "__NEXT_DATA__",
    "bloombergData",
    "bbgData",
    "pageData",
    "componentData",
    "props",
    "state",
    "window.__PRELOADED_STATE__",
    "__PRELOADED_STATE__",
];

/// Object assignments searched inside `<script>` bodies.
const SCRIPT_OBJECT_NAMES: &[&str] = &[
    "data",
    "quoteData",
    "marketData",
    "stockData",
    "instrumentData",
    "tickerData",
    "__NEXT_DATA__",
    "__REDUX_STATE__",
    "__APOLLO_STATE__",
    "__INITIAL_STATE__",
    "__DATA__",
    "bloombergData",
    "bbgData",
];

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_$][\w$]*)\s*:").expect("valid regex")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

fn strip_namespace(name: &str) -> &str {
    name.trim_start_matches("window.").trim_start_matches("global.")
}

/// Returns the balanced `{...}` or `[...]` literal starting at `text[0]`.
fn balanced_literal(text: &str) -> Option<&str> {
    let open = text.chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a JS literal: strict JSON first, then a lenient pass that quotes
/// bare keys, swaps single quotes and drops trailing commas.
#[must_use]
pub fn parse_js_literal(literal: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(literal) {
        return Some(value);
    }
    let lenient = BARE_KEY.replace_all(literal, r#"$1"$2":"#);
    let lenient = lenient.replace('\'', "\"");
    let lenient = TRAILING_COMMA.replace_all(&lenient, "$1");
    serde_json::from_str(&lenient).ok()
}

fn assignment_patterns(name: &str) -> Vec<Regex> {
    let escaped = regex::escape(strip_namespace(name));
    [
        format!(r"(?:^|[^\w$]){escaped}\s*=\s*"),
        format!(r#""{escaped}"\s*:\s*"#),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// Finds `name = <literal>` (or `"name": <literal>`) in `text` and parses
/// the first literal that yields JSON.
fn find_assignment(text: &str, name: &str, allow_arrays: bool) -> Option<Value> {
    for pattern in assignment_patterns(name) {
        for m in pattern.find_iter(text) {
            let rest = &text[m.end()..];
            if !(rest.starts_with('{') || (allow_arrays && rest.starts_with('['))) {
                continue;
            }
            if let Some(value) = balanced_literal(rest).and_then(parse_js_literal) {
                return Some(value);
            }
        }
    }
    None
}

/// Value of one named JS variable, if it is assigned an object in `html`.
#[must_use]
pub fn extract_variable(html: &str, variable_name: &str) -> Option<Value> {
    find_assignment(html, variable_name, false)
}

fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn from_known_variables(html: &str) -> Option<Value> {
    KNOWN_VARIABLES
        .iter()
        .find_map(|name| extract_variable(html, name).filter(is_meaningful))
}

fn from_scripts(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").ok()?;
    let scripts: Vec<(Option<String>, Option<String>, String)> = document
        .select(&selector)
        .map(|s| {
            (
                s.value().attr("type").map(str::to_owned),
                s.value().id().map(str::to_ascii_lowercase),
                s.text().collect::<String>(),
            )
        })
        .filter(|(_, _, body)| !body.trim().is_empty())
        .collect();

    for (kind, _, body) in &scripts {
        if kind.as_deref() == Some("application/json")
            && let Ok(value) = serde_json::from_str::<Value>(body.trim())
        {
            log::debug!("Found JSON data in application/json script tag");
            return Some(value);
        }
    }

    for (_, id, body) in &scripts {
        if let Some(id) = id
            && (id.contains("data") || id.contains("__next"))
            && let Ok(value) = serde_json::from_str::<Value>(body.trim())
        {
            log::debug!("Found JSON data in script tag with id '{id}'");
            return Some(value);
        }
    }

    for (_, _, body) in &scripts {
        if let Some(value) = SCRIPT_OBJECT_NAMES
            .iter()
            .find_map(|name| find_assignment(body, name, false))
        {
            return Some(value);
        }
        if let Some(value) = find_assignment(body, "data", true) {
            return Some(value);
        }
    }
    None
}

/// Locates embedded data in `html`.
///
/// Order: the named variable, then [`KNOWN_VARIABLES`], then `<script>`
/// tags.
#[must_use]
pub fn find_data(html: &str, variable_name: Option<&str>) -> Option<Value> {
    variable_name
        .and_then(|name| extract_variable(html, name))
        .or_else(|| from_known_variables(html))
        .or_else(|| from_scripts(html))
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(inner, &name, out),
            Value::Array(_) => {
                out.insert(name, Value::String(value.to_string()));
            }
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

fn single_value_table(values: &[Value]) -> Table {
    let mut table = Table::new(vec!["value".to_owned()]);
    for value in values {
        table.push_row(vec![Cell::from_json_flat(value)]);
    }
    table
}

fn object_rows(items: &[Value]) -> Vec<Map<String, Value>> {
    items
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// Converts extracted JS data to a table.
#[must_use]
pub fn to_table(data: &Value) -> Table {
    match data {
        Value::Array(items) => match items.first() {
            Some(Value::Object(_)) => Table::from_records(&object_rows(items), true),
            _ => single_value_table(items),
        },
        Value::Object(map) => {
            let nested = map.iter().find_map(|(key, value)| {
                value
                    .as_array()
                    .filter(|items| matches!(items.first(), Some(Value::Object(_))))
                    .map(|items| (key, items))
            });
            if let Some((key, items)) = nested {
                let mut table = Table::from_records(&object_rows(items), true);
                let renamed: Vec<(String, String)> = table
                    .columns()
                    .iter()
                    .map(|c| (c.clone(), format!("{key}_{c}")))
                    .collect();
                for (from, to) in renamed {
                    table.rename_column(&from, &to);
                }
                return table;
            }
            let mut flat = Map::new();
            flatten_into(map, "", &mut flat);
            Table::from_records(&[flat], true)
        }
        scalar => single_value_table(std::slice::from_ref(scalar)),
    }
}

/// Extracts embedded JS data from `html` as a table. Returns an empty table
/// when nothing is found.
#[must_use]
pub fn extract(html: &str, variable_name: Option<&str>) -> Table {
    let Some(data) = find_data(html, variable_name) else {
        log::warn!("No JavaScript data found in HTML");
        return Table::default();
    };
    let table = to_table(&data);
    log::info!("Extracted JavaScript data with {} rows", table.len());
    table
}
