//! Date, datetime and timestamp columns

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use tracing::warn;

use crate::error::{OrmError, Result};
use crate::types::{Value, is_truthy};

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A loosely parsed date string, with or without an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDatetime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedDatetime {
    pub fn is_aware(&self) -> bool {
        matches!(self, ParsedDatetime::Aware(_))
    }

    /// Wall-clock time as written
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            ParsedDatetime::Aware(dt) => dt.naive_local(),
            ParsedDatetime::Naive(dt) => *dt,
        }
    }

    /// Pin to an offset: naive values are assumed to be in `offset`, aware values are converted
    pub fn in_offset(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        match self {
            ParsedDatetime::Aware(dt) => dt.with_timezone(&offset),
            ParsedDatetime::Naive(dt) => offset
                .from_local_datetime(dt)
                .earliest()
                .unwrap_or_else(|| offset.from_utc_datetime(dt)),
        }
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        self.in_offset(Utc.fix()).with_timezone(&Utc)
    }
}

/// Parse the date formats backends and clients commonly send
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` with optional fractional seconds
/// and offset (space or `T` separated) and plain `YYYY-MM-DD`.
pub fn parse_datetime(value: &str) -> Option<ParsedDatetime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(ParsedDatetime::Aware(dt));
    }
    if let Some(dt) = AWARE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
    {
        return Some(ParsedDatetime::Aware(dt));
    }
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(ParsedDatetime::Naive(dt));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| ParsedDatetime::Naive(date.and_time(NaiveTime::MIN)))
}

fn is_empty_date(value: &serde_json::Value, sentinel: &str) -> bool {
    match value {
        serde_json::Value::String(s) => s.is_empty() || s == sentinel || s.contains("0000-00-00"),
        other => !is_truthy(other),
    }
}

/// Compare two raw date values, treating the backend's sentinel as null
pub(super) fn dates_match(a: &serde_json::Value, b: &serde_json::Value, sentinel: &str) -> bool {
    let parse = |value: &serde_json::Value| {
        if is_empty_date(value, sentinel) {
            None
        } else {
            value.as_str().and_then(parse_datetime)
        }
    };
    match (parse(a), parse(b)) {
        (None, None) => (is_empty_date(a, sentinel) && is_empty_date(b, sentinel)) || a == b,
        (Some(ParsedDatetime::Aware(x)), Some(ParsedDatetime::Aware(y))) => x == y,
        (Some(x), Some(y)) => x.naive_local() == y.naive_local(),
        _ => false,
    }
}

pub(super) fn date_input_error(value: &serde_json::Value) -> String {
    match value.as_str().and_then(parse_datetime) {
        Some(_) => String::new(),
        None => "given value did not appear to be a valid date".to_string(),
    }
}

pub(super) fn timestamp_input_error(name: &str, value: &serde_json::Value) -> String {
    let valid = match value {
        serde_json::Value::Number(n) => n.is_i64() || n.is_u64(),
        serde_json::Value::String(s) => !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    };
    if valid {
        String::new()
    } else {
        format!("'{}' must be an integer", name)
    }
}

fn not_a_string(name: &str, value: &serde_json::Value) -> OrmError {
    OrmError::invalid_data(format!(
        "Column '{}' expected a date string but found {}",
        name, value
    ))
}

// ============================================================================
// Date
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSettings {
    pub date_format: String,
    /// Value the backend stores instead of null
    pub backend_default: String,
}

impl Default for DateSettings {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            backend_default: "0000-00-00".to_string(),
        }
    }
}

impl DateSettings {
    pub(super) fn from_backend(&self, name: &str, value: &serde_json::Value) -> Value {
        if is_empty_date(value, &self.backend_default) {
            return Value::Null;
        }
        match value.as_str().and_then(parse_datetime) {
            Some(parsed) => Value::Date(parsed.naive_local().date()),
            None => {
                warn!(column = name, value = %value, "Unparseable date from backend");
                Value::Null
            }
        }
    }

    pub(super) fn to_backend(&self, name: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
        match value {
            serde_json::Value::Null => Ok(serde_json::Value::Null),
            serde_json::Value::String(s) => Ok(match parse_datetime(s) {
                Some(parsed) => serde_json::Value::String(
                    parsed.naive_local().date().format(&self.date_format).to_string(),
                ),
                None => value.clone(),
            }),
            other => Err(not_a_string(name, other)),
        }
    }
}

// ============================================================================
// Datetime
// ============================================================================

/// Which save stamps the current time into a datetime column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTimestamp {
    /// Only when the record is created
    Created,
    /// On every save
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeSettings {
    pub date_format: String,
    pub backend_default: String,
    pub timezone_aware: bool,
    /// Filled from the registry config when left unset
    pub timezone: Option<FixedOffset>,
    pub auto: Option<AutoTimestamp>,
}

impl Default for DatetimeSettings {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            backend_default: "0000-00-00 00:00:00".to_string(),
            timezone_aware: true,
            timezone: None,
            auto: None,
        }
    }
}

impl DatetimeSettings {
    fn offset(&self) -> FixedOffset {
        self.timezone.unwrap_or_else(|| Utc.fix())
    }

    pub(super) fn from_backend(&self, name: &str, value: &serde_json::Value) -> Value {
        if is_empty_date(value, &self.backend_default) {
            return Value::Null;
        }
        let Some(parsed) = value.as_str().and_then(parse_datetime) else {
            warn!(column = name, value = %value, "Unparseable datetime from backend");
            return Value::Null;
        };
        if self.timezone_aware {
            Value::DateTime(parsed.in_offset(self.offset()))
        } else {
            Value::NaiveDateTime(parsed.naive_local())
        }
    }

    pub(super) fn to_backend(&self, name: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
        match value {
            serde_json::Value::Null => Ok(serde_json::Value::Null),
            serde_json::Value::String(s) => Ok(match parse_datetime(s) {
                Some(parsed) => {
                    let formatted = if self.timezone_aware {
                        parsed.in_offset(self.offset()).format(&self.date_format).to_string()
                    } else {
                        parsed.naive_local().format(&self.date_format).to_string()
                    };
                    serde_json::Value::String(formatted)
                }
                None => value.clone(),
            }),
            other => Err(not_a_string(name, other)),
        }
    }

    pub(super) fn input_error(&self, value: &serde_json::Value) -> String {
        match value.as_str().and_then(parse_datetime) {
            None => "given value did not appear to be a valid date".to_string(),
            Some(parsed) if self.timezone_aware && !parsed.is_aware() => {
                "date is missing timezone information".to_string()
            }
            Some(_) => String::new(),
        }
    }

    /// The current time as the raw string an auto-timestamp column saves
    pub(super) fn now(&self) -> serde_json::Value {
        let now = Utc::now();
        let stamped = if self.timezone_aware {
            now.with_timezone(&self.offset()).to_rfc3339()
        } else {
            now.to_rfc3339()
        };
        serde_json::Value::String(stamped)
    }
}

// ============================================================================
// Timestamp
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampSettings {
    /// Values are stored in milliseconds rather than seconds
    pub include_microseconds: bool,
}

impl TimestampSettings {
    pub(super) fn from_backend(&self, name: &str, value: &serde_json::Value) -> Result<Value> {
        if !is_truthy(value) {
            return Ok(Value::Null);
        }
        let raw = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) if s.chars().all(|c| c.is_ascii_digit()) => s.parse().ok(),
            _ => None,
        };
        let Some(mut seconds) = raw else {
            return Err(OrmError::invalid_data(format!(
                "Column '{}' expected a unix timestamp from the backend but found {}",
                name, value
            )));
        };
        if self.include_microseconds {
            seconds /= 1000.0;
        }
        // floor keeps the fraction non-negative for times before the epoch
        let mut whole = seconds.floor() as i64;
        let mut nanos = ((seconds - seconds.floor()) * 1e9).round() as u32;
        if nanos >= 1_000_000_000 {
            whole += 1;
            nanos = 0;
        }
        DateTime::<Utc>::from_timestamp(whole, nanos)
            .map(|dt| Value::DateTime(dt.fixed_offset()))
            .ok_or_else(|| {
                OrmError::invalid_data(format!("Column '{}' timestamp {} is out of range", name, value))
            })
    }

    pub(super) fn to_backend(&self, name: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
        match value {
            serde_json::Value::Null => Ok(serde_json::Value::Null),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            serde_json::Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s
                .parse::<i64>()
                .map(serde_json::Value::from)
                .map_err(|e| OrmError::invalid_data(format!("Column '{}': {}", name, e))),
            serde_json::Value::String(s) => match parse_datetime(s) {
                Some(parsed) => {
                    let utc = parsed.to_utc();
                    let stamp = if self.include_microseconds {
                        utc.timestamp_millis()
                    } else {
                        utc.timestamp()
                    };
                    Ok(serde_json::Value::from(stamp))
                }
                None => Err(OrmError::invalid_data(format!(
                    "Column '{}' cannot convert '{}' into a unix timestamp",
                    name, s
                ))),
            },
            other => Err(OrmError::invalid_data(format!(
                "Column '{}' cannot convert {} into a unix timestamp",
                name, other
            ))),
        }
    }
}
