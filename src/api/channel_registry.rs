use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::{ChannelId, StreamBuffer};
use crate::error::FeedResult;
use crate::render::RenderFrame;

use super::ChannelSpec;

/// Label and unit attached to every frame of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMeta {
    pub label: Option<Arc<str>>,
    pub unit: Option<Arc<str>>,
}

impl ChannelMeta {
    #[must_use]
    pub fn from_spec(spec: &ChannelSpec) -> Self {
        Self {
            label: spec.label.as_deref().map(Arc::from),
            unit: spec.unit.as_deref().map(Arc::from),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ChannelEntry {
    pub(crate) buffer: StreamBuffer,
    /// Index of the source that first produced this channel.
    pub(crate) owner: usize,
    pub(crate) meta: ChannelMeta,
    pub(crate) last_frame: Option<RenderFrame>,
    pub(crate) foreign_rejected: u64,
}

/// Channels known to a session, in discovery order.
#[derive(Debug)]
pub(crate) struct ChannelRegistry {
    capacity: usize,
    catalog: IndexMap<ChannelId, ChannelMeta>,
    entries: IndexMap<ChannelId, ChannelEntry>,
}

impl ChannelRegistry {
    pub(crate) fn new(capacity: usize, specs: &[ChannelSpec]) -> Self {
        let catalog = specs
            .iter()
            .map(|spec| (spec.id.clone(), ChannelMeta::from_spec(spec)))
            .collect();
        Self {
            capacity,
            catalog,
            entries: IndexMap::new(),
        }
    }

    /// Returns the entry for `channel`, registering it for `owner` on first sight.
    pub(crate) fn entry_or_register(
        &mut self,
        channel: &ChannelId,
        owner: usize,
    ) -> FeedResult<&mut ChannelEntry> {
        if !self.entries.contains_key(channel) {
            let entry = ChannelEntry {
                buffer: StreamBuffer::new(channel.clone(), self.capacity)?,
                owner,
                meta: self.catalog.get(channel).cloned().unwrap_or_default(),
                last_frame: None,
                foreign_rejected: 0,
            };
            debug!(channel = %channel, owner, "channel registered");
            self.entries.insert(channel.clone(), entry);
        }
        Ok(&mut self.entries[channel])
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ChannelId, &ChannelEntry)> + '_ {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&ChannelId, &mut ChannelEntry)> + '_ {
        self.entries.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear_buffers(&mut self) {
        for entry in self.entries.values_mut() {
            entry.buffer.clear();
            entry.last_frame = None;
        }
    }
}
