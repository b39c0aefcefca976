//! Status code and status message sanitization.
//!
//! # Responsibilities
//! - Coerce loosely typed status codes (numbers, numeric strings) into `[100, 999]`
//! - Strip characters that may not appear in an HTTP reason phrase
//!
//! # Design Decisions
//! - Invalid input never fails; it falls back to the supplied default
//! - Only horizontal tab and visible ASCII survive in a status message

use serde_json::Value;

/// Lowest status code accepted on the wire.
pub const MIN_STATUS_CODE: u16 = 100;

/// Highest status code accepted on the wire.
pub const MAX_STATUS_CODE: u16 = 999;

/// Clamp an already numeric status code, falling back to `default` when out of range.
pub fn sanitize_status_code(code: u16, default: u16) -> u16 {
    if (MIN_STATUS_CODE..=MAX_STATUS_CODE).contains(&code) {
        code
    } else {
        default
    }
}

/// Interpret a JSON value as a status code.
///
/// Numbers are truncated to integers, strings are parsed the way `parseInt` would
/// (leading digits only). Anything unusable yields `default`.
pub fn sanitize_status_value(value: &Value, default: u16) -> u16 {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    };

    match parsed {
        Some(code) if (MIN_STATUS_CODE as i64..=MAX_STATUS_CODE as i64).contains(&code) => {
            code as u16
        }
        _ => default,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

/// Remove every character that is not a tab or visible ASCII.
pub fn sanitize_status_message(message: &str) -> String {
    message
        .chars()
        .filter(|&c| c == '\t' || (' '..='~').contains(&c))
        .collect()
}
