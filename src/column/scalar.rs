//! String, phone, numeric, boolean and JSON column behavior

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{OrmError, Result};
use crate::types::{Value, is_truthy};

// ============================================================================
// Strings (also Select and Uuid)
// ============================================================================

pub(super) fn string_from_backend(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

pub(super) fn string_to_backend(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Null | serde_json::Value::String(_) => value.clone(),
        other => serde_json::Value::String(other.to_string()),
    }
}

pub(super) fn string_input_error(value: &serde_json::Value) -> String {
    if value.is_string() {
        String::new()
    } else {
        "value should be a string".to_string()
    }
}

pub(super) fn select_input_error(name: &str, allowed: &[String], value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) if allowed.iter().any(|a| a == s) => String::new(),
        _ => format!("Invalid value for {}", name),
    }
}

// ============================================================================
// Phone numbers
// ============================================================================

static NON_DIGIT: LazyLock<std::result::Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"\D"));
static NON_PHONE_CHARACTER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[^\d \-()+]"));

const INVALID_PHONE: &str = "Invalid phone number";

/// Strip everything but digits
pub(super) fn phone_digits(value: &str) -> Result<String> {
    let re = NON_DIGIT.as_ref().map_err(|e| OrmError::invalid_data(e.to_string()))?;
    Ok(re.replace_all(value, "").into_owned())
}

pub(super) fn phone_to_backend(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value.as_str() {
        Some(number) if !number.is_empty() => Ok(phone_digits(number)?.into()),
        _ => Ok(value.clone()),
    }
}

/// Formatting characters are allowed; 10 to 15 digits are required, except for
/// a `like` search which may match part of a number
pub(super) fn phone_input_error(
    name: &str,
    usa_only: bool,
    value: &serde_json::Value,
    operator: Option<&str>,
) -> Result<String> {
    let Some(number) = value.as_str() else {
        return Ok(format!("Value must be a string for {}", name));
    };
    let re = NON_PHONE_CHARACTER
        .as_ref()
        .map_err(|e| OrmError::invalid_data(e.to_string()))?;
    if re.is_match(number) {
        return Ok(INVALID_PHONE.to_string());
    }

    let digits = phone_digits(number)?;
    let fuzzy = operator.is_some_and(|op| op.eq_ignore_ascii_case("like"));
    if digits.len() > 15 || (digits.len() < 10 && !fuzzy) {
        return Ok(INVALID_PHONE.to_string());
    }
    // US numbers: 10 digits, or 11 with a leading country code of 1
    if usa_only && (digits.len() > 11 || (digits.starts_with('1') && digits.len() != 11)) {
        return Ok(INVALID_PHONE.to_string());
    }
    Ok(String::new())
}

// ============================================================================
// Integers
// ============================================================================

fn parse_integer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub(super) fn integer_from_backend(name: &str, value: &serde_json::Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    parse_integer(value).map(Value::Integer).ok_or_else(|| {
        OrmError::invalid_data(format!(
            "Column '{}' expected an integer from the backend but found {}",
            name, value
        ))
    })
}

pub(super) fn integer_to_backend(name: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    parse_integer(value).map(serde_json::Value::from).ok_or_else(|| {
        OrmError::invalid_data(format!(
            "Column '{}' cannot send {} to the backend: it is not an integer",
            name, value
        ))
    })
}

/// Integers and integer strings pass; floats such as `25.0` do not
pub(super) fn integer_input_error(value: &serde_json::Value) -> String {
    let valid = match value {
        serde_json::Value::Number(n) => n.is_i64() || n.is_u64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    };
    if valid {
        String::new()
    } else {
        "value should be an integer".to_string()
    }
}

// ============================================================================
// Floats
// ============================================================================

fn parse_float(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(super) fn float_from_backend(name: &str, value: &serde_json::Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    parse_float(value).map(Value::Float).ok_or_else(|| {
        OrmError::invalid_data(format!(
            "Column '{}' expected a number from the backend but found {}",
            name, value
        ))
    })
}

pub(super) fn float_to_backend(name: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    parse_float(value)
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .ok_or_else(|| {
            OrmError::invalid_data(format!(
                "Column '{}' cannot send {} to the backend: it is not a number",
                name, value
            ))
        })
}

pub(super) fn float_input_error(value: &serde_json::Value) -> String {
    if value.is_number() || value.is_null() {
        String::new()
    } else {
        "value should be an integer or float".to_string()
    }
}

/// Numeric comparison that tolerates `5` vs `"5"`, falling back to equality
pub(super) fn numbers_match(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (parse_float(a), parse_float(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

// ============================================================================
// Booleans
// ============================================================================

/// `"0"`, `0`, `false`, `""` and null are false; everything else truthy is true
pub(super) fn boolean_from_backend(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) if s == "0" => false,
        other => is_truthy(other),
    }
}

pub(super) fn boolean_input_error(name: &str, value: &serde_json::Value) -> String {
    if value.is_boolean() {
        String::new()
    } else {
        format!("{} must be a boolean", name)
    }
}

// ============================================================================
// JSON
// ============================================================================

pub(super) fn json_from_backend(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Json(value.clone()),
        serde_json::Value::String(s) if !s.is_empty() => serde_json::from_str(s)
            .map(Value::Json)
            .unwrap_or(Value::Null),
        other if !is_truthy(other) => Value::Null,
        other => Value::Json(other.clone()),
    }
}

pub(super) fn json_to_backend(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Null | serde_json::Value::String(_) => Ok(value.clone()),
        other => Ok(serde_json::Value::String(serde_json::to_string(other)?)),
    }
}
