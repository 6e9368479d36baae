mod channel_registry;
mod chart_pipeline;
mod duration_ms;
mod live_feed_controller;
mod render_profile;
mod session_config;
mod validation;

pub use channel_registry::ChannelMeta;
pub use chart_pipeline::{ChartPipeline, FrameInput};
pub use live_feed_controller::{
    ChannelStatus, FeedStats, LiveFeedController, ShutdownHandle, SourceStatus, TickReport,
};
pub use render_profile::{OperatingMode, ProfileOverrides, RenderProfile, ScalingMode};
pub use session_config::{ChannelSpec, SessionConfig};
