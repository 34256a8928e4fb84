//! Coercion of loosely-typed scraped fields into numbers and display cells.
//!
//! Upstream fields arrive as strings, numbers, or `null` depending on the
//! endpoint and view. Everything here is pure.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Raw implied-volatility values at or below this are treated as fractions
/// (`0.23` → `23.00%`); above it they are taken as already percent-scaled.
///
/// Known approximation: upstream does not say which scale it uses, so a
/// genuine IV above 1000% would be misread. Carried forward as observed.
pub const IV_FRACTION_THRESHOLD: f64 = 10.0;

/// Placeholder strings upstream uses for "no value".
const MISSING_MARKERS: &[&str] = &["", "N/A", "na", "None"];

fn non_numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\d.\-]").expect("non-numeric regex is valid"))
}

/// Parse a display string such as `"1,250.50"` or `"$3.10"` into a number.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        return None;
    }
    let cleaned = non_numeric_re().replace_all(trimmed, "");
    if matches!(cleaned.as_ref(), "" | "-" | ".") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce a JSON field into a float. Absent, null, and placeholder values
/// yield `None`.
pub fn to_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Coerce a JSON field into an integer, rounding half to even.
pub fn to_int(value: Option<&Value>) -> Option<i64> {
    to_float(value).map(|v| v.round_ties_even() as i64)
}

/// Insert `,` every three digits of an unsigned digit string.
fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn group_signed(formatted: &str) -> String {
    let (sign, body) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let mut out = format!("{sign}{}", group_digits(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Two decimals with thousands separators: `1234.5` → `"1,234.50"`.
pub fn format_decimal(value: f64) -> String {
    group_signed(&format!("{value:.2}"))
}

/// Price cell. Missing prices render empty.
pub fn fmt_price(value: Option<f64>) -> String {
    value.map(format_decimal).unwrap_or_default()
}

/// Grouped integer cell: `12345` → `"12,345"`. Missing renders empty.
pub fn fmt_int(value: Option<i64>) -> String {
    value
        .map(|v| group_signed(&v.to_string()))
        .unwrap_or_default()
}

/// Implied volatility as delivered upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Volatility {
    Numeric(f64),
    /// Already formatted by upstream; displayed verbatim.
    Text(String),
}

impl Volatility {
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Number(n) => n.as_f64().map(Volatility::Numeric),
            Value::String(s) if !s.trim().is_empty() => Some(Volatility::Text(s.trim().to_string())),
            _ => None,
        }
    }
}

/// Percentage cell for implied volatility. See [`IV_FRACTION_THRESHOLD`].
pub fn fmt_iv(value: Option<&Volatility>) -> String {
    match value {
        None => String::new(),
        Some(Volatility::Text(s)) => s.clone(),
        Some(Volatility::Numeric(v)) if *v <= IV_FRACTION_THRESHOLD => format!("{:.2}%", v * 100.0),
        Some(Volatility::Numeric(v)) => format!("{v:.2}%"),
    }
}

/// Free-form cell (price change, trade time). Strings are kept verbatim,
/// numbers use their JSON rendering.
pub fn fmt_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
