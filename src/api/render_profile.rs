use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

use super::duration_ms;
use super::validation::validate_render_profile;

const NORMAL_MAX_POINTS: usize = 10_000;
const NORMAL_UPDATE_INTERVAL: Duration = Duration::from_millis(50);
const EMBEDDED_MAX_POINTS: usize = 2_000;
const EMBEDDED_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Image/line scaling quality requested from the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Nearest-neighbour style scaling, cheap on small CPUs.
    Fast,
    /// Smoothed scaling.
    Quality,
}

/// Host capability class, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Normal,
    Embedded,
}

impl OperatingMode {
    #[must_use]
    pub fn from_embedded(embedded: bool) -> Self {
        if embedded {
            Self::Embedded
        } else {
            Self::Normal
        }
    }

    /// Parses a boolean-ish flag value such as an `EMBEDDED=1` setting.
    ///
    /// Accepts `1/true/yes/on` and `0/false/no/off` (case-insensitive); an
    /// empty string means normal mode.
    pub fn from_flag_value(raw: &str) -> FeedResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Self::Embedded),
            "" | "0" | "false" | "no" | "off" => Ok(Self::Normal),
            other => Err(FeedError::Configuration(format!(
                "unrecognized embedded flag value `{other}`"
            ))),
        }
    }

    #[must_use]
    pub fn is_embedded(self) -> bool {
        matches!(self, Self::Embedded)
    }
}

/// Optional numeric limits layered over a preset.
///
/// Style flags are fixed per mode and cannot be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub max_points: Option<usize>,
    #[serde(default)]
    pub update_interval_ms: Option<u64>,
}

impl ProfileOverrides {
    #[must_use]
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = Some(max_points);
        self
    }

    #[must_use]
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_points.is_none() && self.update_interval_ms.is_none()
    }
}

/// Bundle of rendering limits active for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderProfile {
    pub mode: OperatingMode,
    pub max_points: usize,
    #[serde(with = "duration_ms")]
    pub update_interval: Duration,
    pub markers_enabled: bool,
    pub gl_enabled: bool,
    pub scaling_mode: ScalingMode,
}

impl RenderProfile {
    #[must_use]
    pub fn normal() -> Self {
        Self {
            mode: OperatingMode::Normal,
            max_points: NORMAL_MAX_POINTS,
            update_interval: NORMAL_UPDATE_INTERVAL,
            markers_enabled: true,
            gl_enabled: true,
            scaling_mode: ScalingMode::Quality,
        }
    }

    #[must_use]
    pub fn embedded() -> Self {
        Self {
            mode: OperatingMode::Embedded,
            max_points: EMBEDDED_MAX_POINTS,
            update_interval: EMBEDDED_UPDATE_INTERVAL,
            markers_enabled: false,
            gl_enabled: false,
            scaling_mode: ScalingMode::Fast,
        }
    }

    #[must_use]
    pub fn for_mode(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Normal => Self::normal(),
            OperatingMode::Embedded => Self::embedded(),
        }
    }

    /// Picks the preset for `embedded`, applies overrides and validates.
    pub fn select(embedded: bool, overrides: ProfileOverrides) -> FeedResult<Self> {
        Self::for_mode(OperatingMode::from_embedded(embedded)).with_overrides(overrides)
    }

    pub fn with_overrides(mut self, overrides: ProfileOverrides) -> FeedResult<Self> {
        if let Some(max_points) = overrides.max_points {
            self.max_points = max_points;
        }
        if let Some(interval_ms) = overrides.update_interval_ms {
            self.update_interval = Duration::from_millis(interval_ms);
        }
        validate_render_profile(self)
    }

    pub fn validate(&self) -> FeedResult<()> {
        validate_render_profile(*self).map(|_| ())
    }

    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.mode.is_embedded()
    }
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self::normal()
    }
}
