//! Wire formats shared by every transport.
//!
//! Serial lines carry either a JSON record or `channel_id,value,timestamp`
//! text. Message payloads and replay records are JSON objects, flat
//! (`{"channel_id": .., "value": .., "timestamp": ..}`) or bundled
//! (`{"ts": .., "telemetry": {"temp": 21.5, ..}}`), or an array of those.

use serde_json::{Map, Value};

use crate::core::primitives::{json_kind, parse_timestamp_text, timestamp_from_json, value_from_json};
use crate::core::{ChannelId, Sample};
use crate::error::{FeedError, FeedResult};

/// Longest accepted serial line, in bytes, excluding the terminator.
pub const MAX_LINE_LEN: usize = 4096;

const CHANNEL_KEYS: [&str; 3] = ["channel_id", "channel", "id"];
const TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "ts", "t"];
const BUNDLE_KEYS: [&str; 2] = ["telemetry", "data"];

/// Splits a byte stream into newline-terminated text lines.
///
/// Partial lines are kept across calls. A line longer than the limit is
/// discarded up to its terminator and reported once as a parse error.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line: usize,
    overflowed: bool,
}

impl LineFramer {
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line: max_line.max(1),
            overflowed: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<FeedResult<String>> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if self.overflowed {
                    self.overflowed = false;
                    lines.push(Err(FeedError::Parse(format!(
                        "line exceeds {} bytes",
                        self.max_line
                    ))));
                    continue;
                }
                let mut raw = std::mem::take(&mut self.pending);
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                if raw.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                lines.push(
                    String::from_utf8(raw)
                        .map_err(|_| FeedError::Parse("line is not valid UTF-8".to_owned())),
                );
            } else if self.overflowed {
                continue;
            } else if self.pending.len() >= self.max_line {
                self.pending.clear();
                self.overflowed = true;
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Drops any partially received line.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.overflowed = false;
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

/// Parses one serial line.
pub fn parse_line(line: &str) -> FeedResult<Vec<Sample>> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        parse_json_text(trimmed)
    } else {
        parse_delimited(trimmed).map(|sample| vec![sample])
    }
}

/// Parses `channel_id,value,timestamp`.
pub fn parse_delimited(line: &str) -> FeedResult<Sample> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [channel, value, timestamp] = fields.as_slice() else {
        return Err(FeedError::Parse(format!(
            "expected `channel_id,value,timestamp`, got {} field(s)",
            fields.len()
        )));
    };

    let channel = parse_channel(channel)?;
    let value = value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FeedError::Parse(format!("invalid value `{value}`")))?;
    let timestamp = parse_timestamp_text(timestamp)?;
    build_sample(channel, timestamp, value)
}

/// Parses a pub/sub message body.
///
/// Single-frame messages may carry a `"topic "` prefix before the JSON.
pub fn parse_payload(payload: &[u8]) -> FeedResult<Vec<Sample>> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| FeedError::Parse("payload is not valid UTF-8".to_owned()))?
        .trim();
    if text.starts_with('{') || text.starts_with('[') {
        return parse_json_text(text);
    }
    match text.split_once(char::is_whitespace) {
        Some((_topic, body)) if body.trim_start().starts_with(['{', '[']) => {
            parse_json_text(body.trim_start())
        }
        _ => Err(FeedError::Parse("payload is not a JSON record".to_owned())),
    }
}

fn parse_json_text(text: &str) -> FeedResult<Vec<Sample>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| FeedError::Parse(format!("invalid JSON record: {e}")))?;
    decode_value(&value, None)
}

/// Decodes a record or an array of records.
///
/// `fallback_timestamp` stands in for records that carry none; without it a
/// missing timestamp is a parse error. Arrays are all-or-nothing.
pub fn decode_value(value: &Value, fallback_timestamp: Option<f64>) -> FeedResult<Vec<Sample>> {
    match value {
        Value::Object(record) => decode_record(record, fallback_timestamp),
        Value::Array(records) => {
            let mut samples = Vec::with_capacity(records.len());
            for record in records {
                let Value::Object(record) = record else {
                    return Err(FeedError::Parse(format!(
                        "record array entries must be objects, got {}",
                        json_kind(record)
                    )));
                };
                samples.extend(decode_record(record, fallback_timestamp)?);
            }
            Ok(samples)
        }
        other => Err(FeedError::Parse(format!(
            "record must be an object or array, got {}",
            json_kind(other)
        ))),
    }
}

/// Reads the record-level timestamp, if the record has one.
pub fn record_timestamp(value: &Value) -> FeedResult<Option<f64>> {
    let Value::Object(record) = value else {
        return Ok(None);
    };
    lookup(record, &TIMESTAMP_KEYS)
        .map(timestamp_from_json)
        .transpose()
}

fn decode_record(record: &Map<String, Value>, fallback_timestamp: Option<f64>) -> FeedResult<Vec<Sample>> {
    let timestamp = match lookup(record, &TIMESTAMP_KEYS) {
        Some(raw) => timestamp_from_json(raw)?,
        None => fallback_timestamp
            .ok_or_else(|| FeedError::Parse("record has no timestamp".to_owned()))?,
    };

    if let Some(bundle) = lookup(record, &BUNDLE_KEYS) {
        let Value::Object(readings) = bundle else {
            return Err(FeedError::Parse(format!(
                "bundled readings must be an object, got {}",
                json_kind(bundle)
            )));
        };
        return decode_bundle(readings, timestamp);
    }

    let channel = match lookup(record, &CHANNEL_KEYS) {
        Some(Value::String(raw)) => parse_channel(raw)?,
        Some(other) => {
            return Err(FeedError::Parse(format!(
                "channel id must be a string, got {}",
                json_kind(other)
            )));
        }
        None => return Err(FeedError::Parse("record has no channel id".to_owned())),
    };
    let value = record
        .get("value")
        .ok_or_else(|| FeedError::Parse("record has no value".to_owned()))
        .and_then(value_from_json)?;
    Ok(vec![build_sample(channel, timestamp, value)?])
}

fn decode_bundle(readings: &Map<String, Value>, timestamp: f64) -> FeedResult<Vec<Sample>> {
    let mut samples = Vec::with_capacity(readings.len());
    for (key, reading) in readings {
        let Some(value) = reading.as_f64().filter(|v| v.is_finite()) else {
            continue;
        };
        let Ok(channel) = ChannelId::new(key) else {
            continue;
        };
        samples.push(build_sample(channel, timestamp, value)?);
    }
    if samples.is_empty() {
        return Err(FeedError::Parse(
            "bundled record has no numeric readings".to_owned(),
        ));
    }
    Ok(samples)
}

fn lookup<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| record.get(*key))
}

fn parse_channel(raw: &str) -> FeedResult<ChannelId> {
    ChannelId::new(raw).map_err(|e| FeedError::Parse(e.to_string()))
}

fn build_sample(channel: ChannelId, timestamp: f64, value: f64) -> FeedResult<Sample> {
    Sample::new(channel, timestamp, value).map_err(|e| FeedError::Parse(e.to_string()))
}
