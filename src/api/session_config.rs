use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ChannelId;
use crate::error::{FeedError, FeedResult};
use crate::source::{BackoffPolicy, SourceConfig};

use super::validation::validate_session_config;
use super::{ProfileOverrides, RenderProfile};

/// Display metadata for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: ChannelId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl ChannelSpec {
    #[must_use]
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            label: None,
            unit: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Session bootstrap configuration.
///
/// Serializable so hosts can keep dashboards in JSON files. The render mode
/// is the `embedded` flag; it is read once when the controller is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub profile_overrides: ProfileOverrides,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    /// Per-channel capacity of the worker-to-controller queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Plot only the trailing span instead of the whole buffer.
    #[serde(default)]
    pub history_span_ms: Option<u64>,
    /// Lower point target for small displays; must not exceed `max_points`.
    #[serde(default)]
    pub display_points: Option<usize>,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            embedded: false,
            profile_overrides: ProfileOverrides::default(),
            sources: Vec::new(),
            channels: Vec::new(),
            queue_capacity: default_queue_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            backoff: BackoffPolicy::default(),
            history_span_ms: None,
            display_points: None,
        }
    }

    #[must_use]
    pub fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    #[must_use]
    pub fn with_profile_overrides(mut self, overrides: ProfileOverrides) -> Self {
        self.profile_overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: ChannelSpec) -> Self {
        self.channels.push(channel);
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = as_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = as_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_history_span(mut self, span: Duration) -> Self {
        self.history_span_ms = Some(as_millis(span));
        self
    }

    #[must_use]
    pub fn with_display_points(mut self, points: usize) -> Self {
        self.display_points = Some(points);
        self
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    #[must_use]
    pub fn history_span(&self) -> Option<Duration> {
        self.history_span_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> FeedResult<()> {
        validate_session_config(self)
    }

    /// Resolves and validates the render profile this session will run with.
    pub fn resolve_profile(&self) -> FeedResult<RenderProfile> {
        RenderProfile::select(self.embedded, self.profile_overrides)
    }

    /// Serializes config to pretty JSON.
    pub fn to_json_pretty(&self) -> FeedResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FeedError::Configuration(format!("failed to serialize config: {e}")))
    }

    /// Deserializes config from JSON.
    pub fn from_json_str(input: &str) -> FeedResult<Self> {
        serde_json::from_str(input)
            .map_err(|e| FeedError::Configuration(format!("failed to parse config: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FeedError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_drain_timeout_ms() -> u64 {
    500
}
