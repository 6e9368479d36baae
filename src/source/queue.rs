use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::core::{ChannelId, Sample};

/// Bounded lock-free hand-off between a worker and the controller.
///
/// When full, the oldest queued sample is overwritten so a slow consumer
/// only ever loses stale data.
#[derive(Debug)]
pub struct SampleQueue {
    queue: ArrayQueue<Sample>,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl SampleQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues a sample; returns `true` when an older sample was dropped.
    pub fn push(&self, sample: Sample) -> bool {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(sample).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Removes up to `max` samples in arrival order.
    pub fn drain(&self, max: usize) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(self.queue.len().min(max));
        while samples.len() < max {
            match self.queue.pop() {
                Some(sample) => samples.push(sample),
                None => break,
            }
        }
        samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[must_use]
    pub fn pushed_count(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Per-channel queues written by one source.
///
/// Queues are created on first sight of a channel, in arrival order.
#[derive(Debug, Clone)]
pub struct ChannelQueues {
    capacity: usize,
    queues: Arc<RwLock<IndexMap<ChannelId, Arc<SampleQueue>>>>,
}

impl ChannelQueues {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub fn publish(&self, sample: Sample) -> bool {
        if let Some(queue) = self.queues.read().get(sample.channel_id()) {
            return queue.push(sample);
        }
        let queue = {
            let mut queues = self.queues.write();
            Arc::clone(
                queues
                    .entry(sample.channel_id().clone())
                    .or_insert_with(|| Arc::new(SampleQueue::new(self.capacity))),
            )
        };
        queue.push(sample)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<(ChannelId, Arc<SampleQueue>)> {
        self.queues
            .read()
            .iter()
            .map(|(channel, queue)| (channel.clone(), Arc::clone(queue)))
            .collect()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queues.read().values().map(|queue| queue.len()).sum()
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.queues
            .read()
            .values()
            .map(|queue| queue.dropped_count())
            .sum()
    }

    /// Empties every queue and returns how many samples were discarded.
    pub fn discard_all(&self) -> usize {
        self.queues
            .read()
            .values()
            .map(|queue| queue.drain(usize::MAX).len())
            .sum()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.queues.read().len()
    }
}
