use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::buffer::ShortTermMemoryBuffer;
use crate::models::chat::ConversationView;
use crate::models::{ConversationId, Turn};

/// What the store observed when asked to drop a conversation's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRelease {
    Removed,
    NotFound,
    /// Removal did not take effect; memory is still reachable. Release
    /// callbacks report it so the registry keeps the entry.
    StillPresent,
}

impl MemoryRelease {
    pub fn had_memory(&self) -> bool {
        matches!(self, Self::Removed)
    }
}

/// Thread-safe conversation id -> short-term memory map.
/// Per-key atomicity comes from DashMap's sharded locks.
pub struct ConversationStore {
    buffers: DashMap<ConversationId, Arc<ShortTermMemoryBuffer>>,
    max_turn_pairs: Option<usize>,
}

impl ConversationStore {
    pub fn new(max_turn_pairs: Option<usize>) -> Self {
        info!(?max_turn_pairs, "Initializing conversation store");
        Self {
            buffers: DashMap::new(),
            max_turn_pairs,
        }
    }

    /// Sole creation path. Concurrent callers for the same id share one buffer.
    pub fn get_or_create(&self, id: &ConversationId) -> Arc<ShortTermMemoryBuffer> {
        self.buffers
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(conversation_id = %id, "Creating short-term memory buffer");
                Arc::new(ShortTermMemoryBuffer::new(self.max_turn_pairs))
            })
            .value()
            .clone()
    }

    pub fn get(&self, id: &ConversationId) -> Option<Arc<ShortTermMemoryBuffer>> {
        self.buffers.get(id).map(|entry| entry.value().clone())
    }

    /// Returns false when the conversation has no buffer.
    pub fn append(&self, id: &ConversationId, turn: Turn) -> bool {
        match self.buffers.get(id) {
            Some(buffer) => {
                buffer.append(turn);
                true
            }
            None => false,
        }
    }

    /// Ordered copy of the recorded turns; empty for unknown ids.
    pub fn snapshot(&self, id: &ConversationId) -> Vec<Turn> {
        self.buffers
            .get(id)
            .map(|buffer| buffer.snapshot())
            .unwrap_or_default()
    }

    pub fn remove(&self, id: &ConversationId) -> bool {
        self.buffers.remove(id).is_some()
    }

    pub fn exists(&self, id: &ConversationId) -> bool {
        self.buffers.contains_key(id)
    }

    /// Check and remove under one shard lock. A buffer created by a later
    /// `get_or_create` is new memory, not a failed removal.
    pub fn release(&self, id: &ConversationId) -> MemoryRelease {
        match self.buffers.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                occupied.remove();
                MemoryRelease::Removed
            }
            Entry::Vacant(_) => MemoryRelease::NotFound,
        }
    }

    /// Record an exchange only while `buffer` is still the one stored for
    /// `id`. The shard guard is held across the write, so a concurrent
    /// removal lands either fully before or fully after it.
    pub fn record_if_current(
        &self,
        id: &ConversationId,
        buffer: &Arc<ShortTermMemoryBuffer>,
        human: impl Into<String>,
        assistant: impl Into<String>,
    ) -> bool {
        match self.buffers.get(id) {
            Some(current) if Arc::ptr_eq(current.value(), buffer) => {
                current.record_exchange(human, assistant);
                true
            }
            _ => false,
        }
    }

    /// Drop the buffer only if nothing has been written to it for `threshold`.
    pub fn remove_if_idle(&self, id: &ConversationId, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.buffers
            .remove_if(id, |_, buffer| buffer.is_idle(now, threshold))
            .is_some()
    }

    pub fn ids(&self) -> Vec<ConversationId> {
        self.buffers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn views(&self) -> Vec<ConversationView> {
        let mut views: Vec<_> = self
            .buffers
            .iter()
            .map(|entry| ConversationView {
                conversation_id: entry.key().clone(),
                turns: entry.value().len(),
            })
            .collect();
        views.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        views
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(None)
    }
}
