use std::sync::Arc;

use serde::Serialize;

use crate::api::{RenderProfile, ScalingMode};
use crate::core::ChannelId;
use crate::error::{FeedError, FeedResult};

/// One plotted point: `x` is the sample timestamp in seconds, `y` its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FramePoint {
    pub x: f64,
    pub y: f64,
}

impl FramePoint {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Style flags copied from the active render profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameStyle {
    pub markers_enabled: bool,
    pub gl_enabled: bool,
    pub scaling_mode: ScalingMode,
}

impl FrameStyle {
    #[must_use]
    pub fn from_profile(profile: &RenderProfile) -> Self {
        Self {
            markers_enabled: profile.markers_enabled,
            gl_enabled: profile.gl_enabled,
            scaling_mode: profile.scaling_mode,
        }
    }
}

/// Display-ready series for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub channel: ChannelId,
    pub label: Option<Arc<str>>,
    pub unit: Option<Arc<str>>,
    pub points: Vec<FramePoint>,
    pub style: FrameStyle,
    pub stale: bool,
}

impl RenderFrame {
    #[must_use]
    pub fn new(channel: ChannelId, style: FrameStyle) -> Self {
        Self {
            channel,
            label: None,
            unit: None,
            points: Vec::new(),
            style,
            stale: false,
        }
    }

    #[must_use]
    pub fn with_points(mut self, points: Vec<FramePoint>) -> Self {
        self.points = points;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: Option<Arc<str>>) -> Self {
        self.label = label;
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Option<Arc<str>>) -> Self {
        self.unit = unit;
        self
    }

    /// Marks the frame as coming from a source that is no longer delivering.
    #[must_use]
    pub fn marked_stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn validate(&self) -> FeedResult<()> {
        let mut previous_x = f64::NEG_INFINITY;
        for point in &self.points {
            if !point.x.is_finite() || !point.y.is_finite() {
                return Err(FeedError::Surface(format!(
                    "frame for `{}` contains a non-finite point",
                    self.channel
                )));
            }
            if point.x < previous_x {
                return Err(FeedError::Surface(format!(
                    "frame for `{}` is not ordered by time",
                    self.channel
                )));
            }
            previous_x = point.x;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn last_point(&self) -> Option<FramePoint> {
        self.points.last().copied()
    }
}

/// Everything emitted by one controller tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameBatch {
    pub sequence: u64,
    pub frames: Vec<RenderFrame>,
}

impl FrameBatch {
    #[must_use]
    pub fn new(sequence: u64, frames: Vec<RenderFrame>) -> Self {
        Self { sequence, frames }
    }

    #[must_use]
    pub fn frame(&self, channel: &str) -> Option<&RenderFrame> {
        self.frames
            .iter()
            .find(|frame| frame.channel.as_str() == channel)
    }

    pub fn stale_channels(&self) -> impl Iterator<Item = &ChannelId> + '_ {
        self.frames
            .iter()
            .filter(|frame| frame.stale)
            .map(|frame| &frame.channel)
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.frames.iter().map(RenderFrame::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn validate(&self) -> FeedResult<()> {
        for frame in &self.frames {
            frame.validate()?;
        }
        Ok(())
    }
}
