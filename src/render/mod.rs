mod channel_surface;
mod frame;
mod null_surface;

pub use channel_surface::ChannelSurface;
pub use frame::{FrameBatch, FramePoint, FrameStyle, RenderFrame};
pub use null_surface::NullSurface;

use serde::{Deserialize, Serialize};

use crate::api::RenderProfile;
use crate::error::FeedResult;

/// Drawing capability handed to the surface once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingBackend {
    /// GPU-accelerated line drawing.
    Accelerated,
    /// CPU rasterization only.
    Software,
}

impl DrawingBackend {
    #[must_use]
    pub fn for_profile(profile: &RenderProfile) -> Self {
        if profile.gl_enabled {
            Self::Accelerated
        } else {
            Self::Software
        }
    }
}

/// Contract implemented by whatever displays frame batches.
///
/// Surfaces receive fully materialized batches; the core never touches
/// pixels. `attach` is called exactly once, before the first `present`.
pub trait RenderSurface {
    fn attach(&mut self, backend: DrawingBackend) -> FeedResult<()> {
        let _ = backend;
        Ok(())
    }

    fn present(&mut self, batch: &FrameBatch) -> FeedResult<()>;
}

impl<S: RenderSurface + ?Sized> RenderSurface for Box<S> {
    fn attach(&mut self, backend: DrawingBackend) -> FeedResult<()> {
        (**self).attach(backend)
    }

    fn present(&mut self, batch: &FrameBatch) -> FeedResult<()> {
        (**self).present(batch)
    }
}
