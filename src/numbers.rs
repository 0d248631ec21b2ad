//! Lenient number parsing shared by the JSON and DOM paths
//!
//! Both follow "leading numeric prefix" semantics: `"49.99/mo"` is `49.99`,
//! `"abc"` is nothing. Non-finite results are rejected so NaN never escapes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("valid float regex")
});

static INT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+").expect("valid integer regex"));

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit regex"));

/// Decimal from the leading numeric prefix of `text`
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    FLOAT_PREFIX
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Integer from the leading numeric prefix of `text`
pub fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start();
    INT_PREFIX
        .find(text)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// First run of digits anywhere in `text`
pub fn first_integer(text: &str) -> Option<u32> {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Decimal from a JSON number or numeric string
pub fn json_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    }
}

/// Integer from a JSON number or numeric string, truncating fractions
pub fn json_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }
}
