use std::time::Duration;

#[cfg(feature = "parallel-frames")]
use rayon::prelude::*;

use crate::core::{ChannelId, StreamBuffer, WindowSpec, decimate};
use crate::error::{FeedError, FeedResult};
use crate::render::{FramePoint, FrameStyle, RenderFrame};

use super::validation::validate_display_points;
use super::{ChannelMeta, RenderProfile, SessionConfig};

/// Borrowed inputs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub channel: &'a ChannelId,
    pub buffer: &'a StreamBuffer,
    pub meta: &'a ChannelMeta,
}

/// Turns a channel buffer into a display-ready frame.
///
/// Pure: the same buffer always yields the same frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPipeline {
    style: FrameStyle,
    max_points: usize,
    target_points: usize,
    history_span: Option<Duration>,
}

impl ChartPipeline {
    #[must_use]
    pub fn new(profile: &RenderProfile) -> Self {
        Self {
            style: FrameStyle::from_profile(profile),
            max_points: profile.max_points,
            target_points: profile.max_points,
            history_span: None,
        }
    }

    pub fn from_config(profile: &RenderProfile, config: &SessionConfig) -> FeedResult<Self> {
        let mut pipeline = Self::new(profile);
        if let Some(points) = config.display_points {
            pipeline = pipeline.with_display_points(points)?;
        }
        if let Some(span) = config.history_span() {
            pipeline = pipeline.with_history_span(span)?;
        }
        Ok(pipeline)
    }

    /// Lowers the per-frame point target below the profile's `max_points`.
    pub fn with_display_points(mut self, points: usize) -> FeedResult<Self> {
        self.target_points = validate_display_points(points, self.max_points)?;
        Ok(self)
    }

    /// Plots only samples within `span` of the newest one.
    pub fn with_history_span(mut self, span: Duration) -> FeedResult<Self> {
        if span.is_zero() {
            return Err(FeedError::Configuration(
                "history span must be > 0".to_owned(),
            ));
        }
        self.history_span = Some(span);
        Ok(self)
    }

    #[must_use]
    pub fn target_points(&self) -> usize {
        self.target_points
    }

    #[must_use]
    pub fn style(&self) -> FrameStyle {
        self.style
    }

    #[must_use]
    pub fn window_spec(&self) -> WindowSpec {
        match self.history_span {
            Some(span) => WindowSpec::Trailing(span),
            None => WindowSpec::Latest(self.max_points),
        }
    }

    pub fn build_frame(
        &self,
        channel: &ChannelId,
        buffer: &StreamBuffer,
        meta: &ChannelMeta,
    ) -> FeedResult<RenderFrame> {
        if buffer.channel() != channel {
            return Err(FeedError::ChannelMismatch {
                expected: channel.to_string(),
                actual: buffer.channel().to_string(),
            });
        }
        let window = buffer.window(self.window_spec());
        let points = decimate(&window, self.target_points)?
            .iter()
            .map(|sample| FramePoint::new(sample.timestamp(), sample.value()))
            .collect();
        Ok(RenderFrame::new(channel.clone(), self.style)
            .with_points(points)
            .with_label(meta.label.clone())
            .with_unit(meta.unit.clone()))
    }

    /// Builds one frame per input, in input order.
    pub fn build_frames(&self, inputs: &[FrameInput<'_>]) -> Vec<FeedResult<RenderFrame>> {
        #[cfg(feature = "parallel-frames")]
        {
            inputs
                .par_iter()
                .map(|input| self.build_frame(input.channel, input.buffer, input.meta))
                .collect()
        }

        #[cfg(not(feature = "parallel-frames"))]
        {
            inputs
                .iter()
                .map(|input| self.build_frame(input.channel, input.buffer, input.meta))
                .collect()
        }
    }
}
