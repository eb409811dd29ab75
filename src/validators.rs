//! Column validators
//!
//! A [`Validator`] inspects the save data for one column and returns an error
//! message, or an empty string when the value is acceptable. Messages are user
//! facing: they end up in the map returned by
//! [`Entity::input_errors`](crate::entity::Entity::input_errors).
//!
//! Most validators skip absent or falsy values; combine them with
//! [`Required`] when a value must be present.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};

use crate::column::{ParsedDatetime, parse_datetime};
use crate::entity::Entity;
use crate::error::Result;
use crate::query::Condition;
use crate::types::{Record, condition_string, is_truthy};

/// A check run against a column's value in the save data
pub trait Validator: Send + Sync + Debug {
    /// Return an error message, or an empty string when the value passes
    fn check(&self, entity: &Entity, column_name: &str, data: &Record) -> Result<String>;

    /// Marks the column as unique (used for pivot lookups)
    fn is_unique(&self) -> bool {
        false
    }

    fn is_required(&self) -> bool {
        false
    }
}

// ============================================================================
// Presence and uniqueness
// ============================================================================

/// The column must have a value after the save
///
/// Whitespace-only strings count as empty. An existing record that already
/// holds a value passes when the save data leaves the column out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Validator for Required {
    fn check(&self, entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        match data.get(column_name) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => return Ok(String::new()),
            Some(serde_json::Value::String(_)) => {}
            Some(value) if is_truthy(value) => return Ok(String::new()),
            Some(_) => {}
            None => {
                if entity.exists() && entity.get_raw(column_name).is_some_and(is_truthy) {
                    return Ok(String::new());
                }
            }
        }
        Ok(format!("'{}' is required.", column_name))
    }

    fn is_required(&self) -> bool {
        true
    }
}

/// No other record may hold the same value
#[derive(Debug, Clone, Copy, Default)]
pub struct Unique;

impl Validator for Unique {
    fn check(&self, entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        let Some(new_value) = data.get(column_name) else {
            return Ok(String::new());
        };
        if let Some(current) = entity.get_raw(column_name).filter(|_| entity.exists()) {
            let unchanged = match entity.schema().get_column(column_name) {
                Some(column) => column.values_match(current, new_value),
                None => current == new_value,
            };
            if unchanged {
                return Ok(String::new());
            }
        }

        let matching = entity
            .models()
            .filter_condition(Condition::equals(column_name, condition_string(new_value)))?
            .count()?;
        if matching > 0 {
            return Ok(format!(
                "Invalid value for '{}': the given value already exists, and must be unique.",
                column_name
            ));
        }
        Ok(String::new())
    }

    fn is_unique(&self) -> bool {
        true
    }
}

// ============================================================================
// Length and value bounds
// ============================================================================

fn value_length(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::String(s) => s.chars().count(),
        serde_json::Value::Array(items) => items.len(),
        serde_json::Value::Object(map) => map.len(),
        other => condition_string(other).chars().count(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinimumLength(pub usize);

impl Validator for MinimumLength {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        match data.get(column_name).filter(|v| is_truthy(v)) {
            Some(value) if value_length(value) < self.0 => Ok(format!(
                "'{}' must be at least {} characters long.",
                column_name, self.0
            )),
            _ => Ok(String::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaximumLength(pub usize);

impl Validator for MaximumLength {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        match data.get(column_name).filter(|v| is_truthy(v)) {
            Some(value) if value_length(value) > self.0 => Ok(format!(
                "'{}' must be at most {} characters long.",
                column_name, self.0
            )),
            _ => Ok(String::new()),
        }
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinimumValue(pub f64);

impl Validator for MinimumValue {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        let Some(value) = data.get(column_name) else {
            return Ok(String::new());
        };
        match numeric(value) {
            None => Ok(format!("{} must be an integer or float", column_name)),
            Some(number) if number < self.0 => Ok(format!("'{}' must be at least {}.", column_name, self.0)),
            Some(_) => Ok(String::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaximumValue(pub f64);

impl Validator for MaximumValue {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        let Some(value) = data.get(column_name) else {
            return Ok(String::new());
        };
        match numeric(value) {
            None => Ok(format!("{} must be an integer or float", column_name)),
            Some(number) if number > self.0 => Ok(format!("'{}' must be at most {}.", column_name, self.0)),
            Some(_) => Ok(String::new()),
        }
    }
}

// ============================================================================
// Date comparisons
// ============================================================================

fn parse_date_value(value: &serde_json::Value) -> Option<ParsedDatetime> {
    value.as_str().and_then(parse_datetime)
}

/// Shared logic for column-to-column date ordering
fn compare_columns(
    entity: &Entity,
    column_name: &str,
    other_column_name: &str,
    data: &Record,
) -> Option<std::result::Result<(DateTime<Utc>, DateTime<Utc>), String>> {
    let mine = data.get(column_name).filter(|v| is_truthy(v))?;
    let other = data
        .get(other_column_name)
        .or_else(|| entity.get_raw(other_column_name))
        .filter(|v| is_truthy(v))?;

    let Some(mine) = parse_date_value(mine) else {
        return Some(Err(format!("'{}' was not a valid date.", column_name)));
    };
    let Some(other) = parse_date_value(other) else {
        return Some(Err(format!("'{}' was not a valid date.", other_column_name)));
    };
    Some(Ok((mine.to_utc(), other.to_utc())))
}

/// The date must come after another date column
#[derive(Debug, Clone)]
pub struct AfterColumn {
    pub other_column_name: String,
    pub allow_equal: bool,
}

impl AfterColumn {
    pub fn new(other_column_name: impl Into<String>, allow_equal: bool) -> Self {
        Self {
            other_column_name: other_column_name.into(),
            allow_equal,
        }
    }
}

impl Validator for AfterColumn {
    fn check(&self, entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        let (mine, other) = match compare_columns(entity, column_name, &self.other_column_name, data) {
            None => return Ok(String::new()),
            Some(Err(message)) => return Ok(message),
            Some(Ok(dates)) => dates,
        };
        if mine > other || (mine == other && self.allow_equal) {
            return Ok(String::new());
        }
        Ok(format!("'{}' must be after '{}'", column_name, self.other_column_name))
    }
}

/// The date must come before another date column
#[derive(Debug, Clone)]
pub struct BeforeColumn {
    pub other_column_name: String,
    pub allow_equal: bool,
}

impl BeforeColumn {
    pub fn new(other_column_name: impl Into<String>, allow_equal: bool) -> Self {
        Self {
            other_column_name: other_column_name.into(),
            allow_equal,
        }
    }
}

impl Validator for BeforeColumn {
    fn check(&self, entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        let (mine, other) = match compare_columns(entity, column_name, &self.other_column_name, data) {
            None => return Ok(String::new()),
            Some(Err(message)) => return Ok(message),
            Some(Ok(dates)) => dates,
        };
        if mine < other || (mine == other && self.allow_equal) {
            return Ok(String::new());
        }
        Ok(format!("'{}' must be before '{}'", column_name, self.other_column_name))
    }
}

/// Parse the column's date, treating naive values as UTC
///
/// `Ok(None)` means there is nothing to check.
fn date_to_check(column_name: &str, data: &Record) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let Some(value) = data.get(column_name).filter(|v| is_truthy(v)) else {
        return Ok(None);
    };
    parse_date_value(value)
        .map(|date| Some(date.to_utc()))
        .ok_or_else(|| format!("'{}' was not a valid date", column_name))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InThePast;

impl Validator for InThePast {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        match date_to_check(column_name, data) {
            Ok(Some(date)) if date >= Utc::now() => Ok(format!("'{}' must be in the past", column_name)),
            Ok(_) => Ok(String::new()),
            Err(message) => Ok(message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InTheFuture;

impl Validator for InTheFuture {
    fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
        match date_to_check(column_name, data) {
            Ok(Some(date)) if date <= Utc::now() => Ok(format!("'{}' must be in the future", column_name)),
            Ok(_) => Ok(String::new()),
            Err(message) => Ok(message),
        }
    }
}

/// Render a duration as e.g. `"1 day, 2 hours"`
///
/// # Example
/// ```
/// use chrono::Duration;
/// use strata::validators::human_friendly_delta;
///
/// assert_eq!(human_friendly_delta(Duration::hours(26)), "1 day, 2 hours");
/// assert_eq!(human_friendly_delta(Duration::minutes(1)), "1 minute");
/// ```
pub fn human_friendly_delta(delta: Duration) -> String {
    const UNITS: [(&str, i64); 5] = [
        ("year", 31_536_000),
        ("day", 86_400),
        ("hour", 3_600),
        ("minute", 60),
        ("second", 1),
    ];
    let mut remainder = delta.num_seconds();
    let mut parts = Vec::new();
    for (name, seconds) in UNITS {
        if seconds > remainder {
            continue;
        }
        let amount = remainder / seconds;
        remainder -= amount * seconds;
        let plural = if amount == 1 { "" } else { "s" };
        parts.push(format!("{} {}{}", amount, name, plural));
    }
    parts.join(", ")
}

macro_rules! delta_validator {
    ($(#[$doc:meta])* $name:ident, $fails:expr, $message:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name(pub Duration);

        impl Validator for $name {
            fn check(&self, _entity: &Entity, column_name: &str, data: &Record) -> Result<String> {
                let fails: fn(DateTime<Utc>, DateTime<Utc>, Duration) -> bool = $fails;
                match date_to_check(column_name, data) {
                    Ok(Some(date)) if fails(date, Utc::now(), self.0) => Ok(format!(
                        $message,
                        column_name,
                        human_friendly_delta(self.0)
                    )),
                    Ok(_) => Ok(String::new()),
                    Err(message) => Ok(message),
                }
            }
        }
    };
}

delta_validator!(
    /// The date must be at least the given duration before now
    InThePastAtLeast,
    |date, now, delta| date > now - delta,
    "'{}' must be at least {} in the past."
);

delta_validator!(
    /// The date must be no more than the given duration before now
    InThePastAtMost,
    |date, now, delta| date < now - delta,
    "'{}' must be at most {} in the past."
);

delta_validator!(
    /// The date must be at least the given duration after now
    InTheFutureAtLeast,
    |date, now, delta| date < now + delta,
    "'{}' must be at least {} in the future."
);

delta_validator!(
    /// The date must be no more than the given duration after now
    InTheFutureAtMost,
    |date, now, delta| date > now + delta,
    "'{}' must be at most {} in the future."
);
