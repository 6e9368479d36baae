use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{FeedError, FeedResult};

const NANOS_THRESHOLD: f64 = 1e17;
const MICROS_THRESHOLD: f64 = 1e14;
const MILLIS_THRESHOLD: f64 = 1e11;

#[must_use]
pub fn datetime_to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Normalizes a raw epoch number to seconds by magnitude.
///
/// Sources disagree on units; anything above 1e17 is read as nanoseconds,
/// above 1e14 as microseconds, above 1e11 as milliseconds.
#[must_use]
pub fn normalize_epoch_seconds(raw: f64) -> f64 {
    let magnitude = raw.abs();
    if magnitude >= NANOS_THRESHOLD {
        raw / 1e9
    } else if magnitude >= MICROS_THRESHOLD {
        raw / 1e6
    } else if magnitude >= MILLIS_THRESHOLD {
        raw / 1e3
    } else {
        raw
    }
}

/// Parses a timestamp given as a number, a numeric string or RFC 3339 text.
pub fn parse_timestamp_text(text: &str) -> FeedResult<f64> {
    let trimmed = text.trim();
    if let Ok(raw) = trimmed.parse::<f64>() {
        return finite_seconds(normalize_epoch_seconds(raw));
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .map_err(|e| FeedError::Parse(format!("invalid timestamp `{trimmed}`: {e}")))?;
    Ok(datetime_to_unix_seconds(parsed.with_timezone(&Utc)))
}

pub fn timestamp_from_json(value: &Value) -> FeedResult<f64> {
    match value {
        Value::Number(number) => {
            let raw = number
                .as_f64()
                .ok_or_else(|| FeedError::Parse("timestamp is not representable".to_owned()))?;
            finite_seconds(normalize_epoch_seconds(raw))
        }
        Value::String(text) => parse_timestamp_text(text),
        other => Err(FeedError::Parse(format!(
            "timestamp must be a number or string, got {}",
            json_kind(other)
        ))),
    }
}

/// Reads a numeric reading; numeric strings are accepted, other kinds are not.
pub fn value_from_json(value: &Value) -> FeedResult<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(FeedError::Parse("value must be finite".to_owned())),
        None => Err(FeedError::Parse(format!(
            "value must be numeric, got {}",
            json_kind(value)
        ))),
    }
}

fn finite_seconds(seconds: f64) -> FeedResult<f64> {
    if seconds.is_finite() {
        Ok(seconds)
    } else {
        Err(FeedError::Parse("timestamp must be finite".to_owned()))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
