//! Endpoint templating, query strings and outgoing key casing.

use convert_case::{Case, Casing};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Names of the `:placeholder` segments of an endpoint, in order.
pub fn url_param_keys(endpoint: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut chars = endpoint.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ':' {
            continue;
        }
        let mut key = String::new();
        while let Some(next) = chars.peek().copied().filter(char::is_ascii_alphanumeric) {
            key.push(next);
            chars.next();
        }
        if !key.is_empty() {
            keys.push(key);
        }
    }
    keys
}

/// Substitute placeholders from `params` and append the rest as a query string.
///
/// Placeholders without a (non-null) parameter stay in the URL verbatim. `source` is
/// never sent.
pub fn fill_url(endpoint: &str, params: &Map<String, Value>, snake_keys: bool) -> String {
    let mut rest = params.clone();
    rest.remove("source");

    let mut url = String::with_capacity(endpoint.len());
    let mut chars = endpoint.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ':' {
            url.push(c);
            continue;
        }
        let mut key = String::new();
        while let Some(next) = chars.peek().copied().filter(char::is_ascii_alphanumeric) {
            key.push(next);
            chars.next();
        }
        match params.get(&key).filter(|v| !v.is_null()) {
            Some(value) if !key.is_empty() => {
                url.push_str(&scalar_text(value));
                rest.remove(&key);
            }
            _ => {
                url.push(':');
                url.push_str(&key);
            }
        }
    }

    url.push_str(&serialize_query_string(&rest, true, snake_keys));
    url
}

/// Serialize parameters as `?a=1&list[]=x&list[]=y`.
///
/// Nulls are skipped, strings trimmed, values form-url-encoded when `encode` is set.
/// Returns an empty string when nothing is left to send.
pub fn serialize_query_string(
    params: &Map<String, Value>,
    encode: bool,
    snake_keys: bool,
) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        let key = if snake_keys {
            key.to_case(Case::Snake)
        } else {
            key.clone()
        };
        match value {
            Value::Null => {}
            Value::Array(items) if !items.is_empty() => {
                for item in items {
                    pairs.push(format!("{}[]={}", key, query_value(item, encode)));
                }
            }
            other => pairs.push(format!("{}={}", key, query_value(other, encode))),
        }
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

/// Convert object keys to snake_case recursively, trimming string values.
pub fn snake_case_keys(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };

    let converted = map
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(items) => Value::Array(items.iter().map(snake_case_keys).collect()),
                Value::Object(_) => snake_case_keys(value),
                Value::String(s) => Value::String(clean_text(s)),
                other => other.clone(),
            };
            (key.to_case(Case::Snake), value)
        })
        .collect();
    Value::Object(converted)
}

fn query_value(value: &Value, encode: bool) -> String {
    let text = match value {
        Value::String(s) => clean_text(s),
        Value::Array(items) if items.is_empty() => String::new(),
        other => scalar_text(other),
    };
    if encode {
        form_urlencoded::byte_serialize(text.as_bytes()).collect()
    } else {
        text
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Strips a trailing literal `\t` some form widgets leave behind.
fn clean_text(text: &str) -> String {
    text.strip_suffix("\\t").unwrap_or(text).trim().to_string()
}
