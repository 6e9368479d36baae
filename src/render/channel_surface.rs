use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::render::{DrawingBackend, FrameBatch, RenderSurface};

/// Forwards batches to another thread over a bounded channel.
///
/// A lagging consumer loses batches instead of stalling the cadence loop.
#[derive(Debug)]
pub struct ChannelSurface {
    tx: Sender<FrameBatch>,
    backend: Option<DrawingBackend>,
    dropped: u64,
}

impl ChannelSurface {
    /// Returns the surface and the receiving end for the display thread.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<FrameBatch>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let surface = Self {
            tx,
            backend: None,
            dropped: 0,
        };
        (surface, rx)
    }

    #[must_use]
    pub fn backend(&self) -> Option<DrawingBackend> {
        self.backend
    }

    #[must_use]
    pub fn dropped_batches(&self) -> u64 {
        self.dropped
    }
}

impl RenderSurface for ChannelSurface {
    fn attach(&mut self, backend: DrawingBackend) -> FeedResult<()> {
        self.backend = Some(backend);
        Ok(())
    }

    fn present(&mut self, batch: &FrameBatch) -> FeedResult<()> {
        match self.tx.try_send(batch.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(
                    sequence = batch.sequence,
                    dropped_total = self.dropped,
                    "display lagging, batch dropped"
                );
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(FeedError::Surface(
                "display receiver disconnected".to_owned(),
            )),
        }
    }
}
