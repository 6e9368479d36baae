use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FeedError, FeedResult};

const MAX_CHANNEL_ID_LEN: usize = 128;

/// Identifier of a logical data stream within a session.
///
/// Cloning is a reference-count bump, so every buffered sample can carry
/// its channel without a per-sample allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    pub fn new(raw: &str) -> FeedResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FeedError::InvalidSample(
                "channel id must not be empty".to_owned(),
            ));
        }
        if trimmed.len() > MAX_CHANNEL_ID_LEN {
            return Err(FeedError::InvalidSample(format!(
                "channel id exceeds {MAX_CHANNEL_ID_LEN} bytes"
            )));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({:?})", &*self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// One timestamped numeric reading for a channel.
///
/// Fields are private: a sample cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    timestamp: f64,
    channel_id: ChannelId,
    value: f64,
}

impl Sample {
    pub fn new(channel_id: ChannelId, timestamp: f64, value: f64) -> FeedResult<Self> {
        if !timestamp.is_finite() {
            return Err(FeedError::InvalidSample(format!(
                "timestamp must be finite on channel `{channel_id}`"
            )));
        }
        if !value.is_finite() {
            return Err(FeedError::InvalidSample(format!(
                "value must be finite on channel `{channel_id}`"
            )));
        }
        Ok(Self {
            timestamp,
            channel_id,
            value,
        })
    }

    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns a copy shifted in time, used by looping replays.
    #[must_use]
    pub(crate) fn shifted(&self, offset: f64) -> Self {
        Self {
            timestamp: self.timestamp + offset,
            channel_id: self.channel_id.clone(),
            value: self.value,
        }
    }
}
