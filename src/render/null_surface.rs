use crate::error::FeedResult;
use crate::render::{DrawingBackend, FrameBatch, RenderSurface};

/// Headless surface used by tests and benchmarks.
///
/// It still validates every batch so invalid frames are caught without a
/// real display attached.
#[derive(Debug, Default)]
pub struct NullSurface {
    pub backend: Option<DrawingBackend>,
    pub presented: u64,
    pub last_sequence: Option<u64>,
    pub last_frame_count: usize,
    pub last_point_count: usize,
}

impl RenderSurface for NullSurface {
    fn attach(&mut self, backend: DrawingBackend) -> FeedResult<()> {
        self.backend = Some(backend);
        Ok(())
    }

    fn present(&mut self, batch: &FrameBatch) -> FeedResult<()> {
        batch.validate()?;
        self.presented += 1;
        self.last_sequence = Some(batch.sequence);
        self.last_frame_count = batch.frames.len();
        self.last_point_count = batch.point_count();
        Ok(())
    }
}
