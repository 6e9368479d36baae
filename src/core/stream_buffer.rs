use std::collections::VecDeque;

use tracing::trace;

use crate::core::windowing::{latest_window_start, trailing_window_start};
use crate::core::{ChannelId, Sample, WindowSpec};
use crate::error::{FeedError, FeedResult};

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The buffer was full and its oldest sample was dropped.
    Evicted,
}

/// Bounded, per-channel rolling store of samples.
///
/// Invariants:
/// - `len() <= capacity()` after every operation
/// - samples are stored in non-decreasing timestamp order
/// - capacity is fixed at construction
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    channel: ChannelId,
    samples: VecDeque<Sample>,
    capacity: usize,
    evicted: u64,
    rejected: u64,
}

impl StreamBuffer {
    pub fn new(channel: ChannelId, capacity: usize) -> FeedResult<Self> {
        if capacity == 0 {
            return Err(FeedError::Configuration(format!(
                "buffer capacity for channel `{channel}` must be > 0"
            )));
        }
        Ok(Self {
            channel,
            samples: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
            rejected: 0,
        })
    }

    /// Appends one sample, evicting the oldest when full.
    ///
    /// Samples older than the newest buffered sample are rejected rather
    /// than reordered. Equal timestamps are accepted.
    pub fn append(&mut self, sample: Sample) -> FeedResult<AppendOutcome> {
        if sample.channel_id() != &self.channel {
            self.rejected += 1;
            return Err(FeedError::ChannelMismatch {
                expected: self.channel.to_string(),
                actual: sample.channel_id().to_string(),
            });
        }
        if let Some(newest) = self.samples.back() {
            if sample.timestamp() < newest.timestamp() {
                self.rejected += 1;
                return Err(FeedError::OutOfOrder {
                    channel: self.channel.to_string(),
                    newest: newest.timestamp(),
                    incoming: sample.timestamp(),
                });
            }
        }

        let mut outcome = AppendOutcome::Appended;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
            outcome = AppendOutcome::Evicted;
            trace!(
                channel = %self.channel,
                evicted_total = self.evicted,
                "buffer full, evicted oldest sample"
            );
        }
        self.samples.push_back(sample);
        Ok(outcome)
    }

    /// Returns a copy of the requested trailing window in timestamp order.
    #[must_use]
    pub fn window(&self, spec: WindowSpec) -> Vec<Sample> {
        let start = match spec {
            WindowSpec::Latest(count) => latest_window_start(self.samples.len(), count),
            WindowSpec::Trailing(span) => trailing_window_start(&self.samples, span),
        };
        self.samples.range(start..).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    #[must_use]
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    #[must_use]
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Time covered by the buffered samples, in seconds.
    #[must_use]
    pub fn time_span(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0.0,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
    }
}
