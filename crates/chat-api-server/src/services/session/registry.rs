use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{Admission, ConsistencyViolation, Eviction, SessionEntry, SessionError};
use crate::models::ConversationId;
use crate::services::conversation::MemoryRelease;

/// Live conversations and their last activity.
///
/// `live` counts reserved slots and is never lower than `entries.len()`, so
/// reserving a slot before inserting keeps the registry within `capacity`
/// without a global lock.
pub struct SessionRegistry {
    entries: DashMap<ConversationId, SessionEntry>,
    live: AtomicUsize,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Initializing session registry");
        Self {
            entries: DashMap::new(),
            live: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn admit(&self, id: &ConversationId) -> Result<Admission, SessionError> {
        self.admit_at(id, Utc::now())
    }

    pub fn admit_at(&self, id: &ConversationId, now: DateTime<Utc>) -> Result<Admission, SessionError> {
        self.admit_with(id, now, false)
    }

    /// Admit `id` and pin it for one turn under the same entry lock.
    pub fn admit_pinned(&self, id: &ConversationId) -> Result<Admission, SessionError> {
        self.admit_with(id, Utc::now(), true)
    }

    /// The only path that grows the registry.
    fn admit_with(&self, id: &ConversationId, now: DateTime<Utc>, pin: bool) -> Result<Admission, SessionError> {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_activity = now;
                if pin {
                    entry.active_turns += 1;
                }
                Ok(Admission::AlreadyLive)
            }
            Entry::Vacant(vacant) => {
                if !self.reserve_slot() {
                    return Err(SessionError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                let mut entry = SessionEntry::new(id.clone(), now);
                if pin {
                    entry.active_turns = 1;
                }
                vacant.insert(entry);
                Ok(Admission::Admitted)
            }
        }
    }

    pub fn touch(&self, id: &ConversationId) -> bool {
        self.touch_at(id, Utc::now())
    }

    /// Unknown ids are a no-op.
    pub fn touch_at(&self, id: &ConversationId, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn pin(&self, id: &ConversationId) -> bool {
        self.pin_at(id, Utc::now())
    }

    /// Mark a turn in flight and refresh activity. A pinned entry is never
    /// idle. Returns false for unknown ids.
    pub fn pin_at(&self, id: &ConversationId, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.active_turns += 1;
                entry.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&self, id: &ConversationId) -> bool {
        self.unpin_at(id, Utc::now())
    }

    /// End of a turn: counts as activity. No-op once the id was cleared.
    pub fn unpin_at(&self, id: &ConversationId, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.active_turns = entry.active_turns.saturating_sub(1);
                entry.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: &ConversationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn last_activity(&self, id: &ConversationId) -> Option<DateTime<Utc>> {
        self.entries.get(id).map(|entry| entry.last_activity)
    }

    /// Drop the entry without looking at short-term memory.
    pub fn forget(&self, id: &ConversationId) -> bool {
        if self.entries.remove(id).is_some() {
            self.release_slot();
            debug!(conversation_id = %id, "Session forgotten");
            true
        } else {
            false
        }
    }

    /// Evict `id` if idle, releasing its memory while the entry is locked.
    ///
    /// When `release` reports the memory is still present the entry is kept
    /// and a violation is returned.
    pub fn evict_if_idle<F>(
        &self,
        id: &ConversationId,
        now: DateTime<Utc>,
        threshold: Duration,
        release: F,
    ) -> Result<Eviction, SessionError>
    where
        F: FnOnce() -> MemoryRelease,
    {
        let Entry::Occupied(occupied) = self.entries.entry(id.clone()) else {
            return Ok(Eviction::Unknown);
        };
        if !occupied.get().is_idle(now, threshold) {
            return Ok(Eviction::Retained);
        }

        match release() {
            MemoryRelease::StillPresent => Err(ConsistencyViolation::memory_not_released(id).into()),
            released => {
                occupied.remove();
                self.release_slot();
                Ok(Eviction::Evicted(released))
            }
        }
    }

    /// Forget `id` (if present) after releasing its memory under the entry lock.
    pub fn forget_with<F>(&self, id: &ConversationId, release: F) -> Result<MemoryRelease, SessionError>
    where
        F: FnOnce() -> MemoryRelease,
    {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(occupied) => match release() {
                MemoryRelease::StillPresent => {
                    Err(ConsistencyViolation::memory_not_released(id).into())
                }
                released => {
                    occupied.remove();
                    self.release_slot();
                    Ok(released)
                }
            },
            Entry::Vacant(_) => match release() {
                MemoryRelease::StillPresent => {
                    Err(ConsistencyViolation::memory_not_released(id).into())
                }
                released => Ok(released),
            },
        }
    }

    pub fn entries(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        entries
    }

    pub fn ids(&self) -> Vec<ConversationId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve_slot(&self) -> bool {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn id(s: &str) -> ConversationId {
        ConversationId::from(s)
    }

    #[test]
    fn test_capacity_scenario() {
        let registry = SessionRegistry::new(2);

        assert_eq!(registry.admit(&id("A")).unwrap(), Admission::Admitted);
        assert_eq!(registry.admit(&id("B")).unwrap(), Admission::Admitted);
        assert_eq!(
            registry.admit(&id("C")).unwrap_err(),
            SessionError::CapacityExceeded { capacity: 2 }
        );

        assert!(registry.forget(&id("A")));
        assert_eq!(registry.admit(&id("C")).unwrap(), Admission::Admitted);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_readmitting_live_id_is_not_an_error() {
        let registry = SessionRegistry::new(1);
        let t0 = Utc::now();

        registry.admit_at(&id("A"), t0).unwrap();
        let again = registry.admit_at(&id("A"), t0 + TimeDelta::seconds(5)).unwrap();

        assert_eq!(again, Admission::AlreadyLive);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.last_activity(&id("A")), Some(t0 + TimeDelta::seconds(5)));
    }

    #[test]
    fn test_touch_unknown_is_noop() {
        let registry = SessionRegistry::new(1);
        assert!(!registry.touch(&id("ghost")));
        assert!(!registry.is_live(&id("ghost")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_if_idle_boundary() {
        let registry = SessionRegistry::new(3);
        let t0 = Utc::now();
        let threshold = Duration::from_secs(60);
        registry.admit_at(&id("X"), t0).unwrap();

        let early = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(59), threshold, || {
                MemoryRelease::Removed
            })
            .unwrap();
        assert_eq!(early, Eviction::Retained);
        assert!(registry.is_live(&id("X")));

        let late = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(61), threshold, || {
                MemoryRelease::Removed
            })
            .unwrap();
        assert_eq!(late, Eviction::Evicted(MemoryRelease::Removed));
        assert!(!registry.is_live(&id("X")));
    }

    #[test]
    fn test_evict_without_memory_still_forgets() {
        let registry = SessionRegistry::new(1);
        let t0 = Utc::now();
        registry.admit_at(&id("X"), t0).unwrap();

        let outcome = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(120), Duration::from_secs(60), || {
                MemoryRelease::NotFound
            })
            .unwrap();

        assert_eq!(outcome, Eviction::Evicted(MemoryRelease::NotFound));
        assert!(registry.admit(&id("Y")).is_ok());
    }

    #[test]
    fn test_memory_still_present_keeps_entry() {
        let registry = SessionRegistry::new(1);
        let t0 = Utc::now();
        registry.admit_at(&id("X"), t0).unwrap();

        let err = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(120), Duration::from_secs(60), || {
                MemoryRelease::StillPresent
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::ConsistencyViolation(_)));
        assert!(registry.is_live(&id("X")));
        // Slot still held.
        assert!(registry.admit(&id("Y")).is_err());
    }

    #[test]
    fn test_release_not_called_when_retained_or_unknown() {
        let registry = SessionRegistry::new(1);
        let t0 = Utc::now();
        registry.admit_at(&id("X"), t0).unwrap();

        let retained = registry
            .evict_if_idle(&id("X"), t0, Duration::from_secs(60), || {
                panic!("release must not run for a fresh session")
            })
            .unwrap();
        assert_eq!(retained, Eviction::Retained);

        let unknown = registry
            .evict_if_idle(&id("nope"), t0, Duration::ZERO, || {
                panic!("release must not run for an unknown id")
            })
            .unwrap();
        assert_eq!(unknown, Eviction::Unknown);
    }

    #[test]
    fn test_pinned_session_survives_idle_check() {
        let registry = SessionRegistry::new(1);
        let t0 = Utc::now();
        let threshold = Duration::from_secs(60);
        registry.admit_at(&id("X"), t0 - TimeDelta::seconds(59)).unwrap();

        assert!(registry.pin_at(&id("X"), t0));
        let during = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(600), threshold, || {
                panic!("release must not run while a turn is in flight")
            })
            .unwrap();
        assert_eq!(during, Eviction::Retained);

        assert!(registry.unpin_at(&id("X"), t0 + TimeDelta::seconds(10)));
        assert_eq!(registry.last_activity(&id("X")), Some(t0 + TimeDelta::seconds(10)));
        let after = registry
            .evict_if_idle(&id("X"), t0 + TimeDelta::seconds(70), threshold, || {
                MemoryRelease::Removed
            })
            .unwrap();
        assert_eq!(after, Eviction::Evicted(MemoryRelease::Removed));
    }

    #[test]
    fn test_pin_unknown_is_noop() {
        let registry = SessionRegistry::new(1);
        assert!(!registry.pin(&id("ghost")));
        assert!(!registry.unpin(&id("ghost")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_admit_pinned_holds_entry_until_unpinned() {
        let registry = SessionRegistry::new(1);
        assert_eq!(registry.admit_pinned(&id("X")).unwrap(), Admission::Admitted);
        assert_eq!(registry.admit_pinned(&id("X")).unwrap(), Admission::AlreadyLive);

        let far = Utc::now() + TimeDelta::seconds(3600);
        let idle = Duration::from_secs(60);
        assert_eq!(
            registry.evict_if_idle(&id("X"), far, idle, || MemoryRelease::Removed).unwrap(),
            Eviction::Retained
        );

        registry.unpin(&id("X"));
        assert_eq!(
            registry.evict_if_idle(&id("X"), far, idle, || MemoryRelease::Removed).unwrap(),
            Eviction::Retained
        );
        registry.unpin(&id("X"));
        assert!(registry
            .evict_if_idle(&id("X"), far, idle, || MemoryRelease::Removed)
            .unwrap()
            .is_evicted());
    }

    #[test]
    fn test_forget_with_reports_release() {
        let registry = SessionRegistry::new(2);
        registry.admit(&id("A")).unwrap();

        assert_eq!(
            registry.forget_with(&id("A"), || MemoryRelease::Removed).unwrap(),
            MemoryRelease::Removed
        );
        assert!(!registry.is_live(&id("A")));
        assert_eq!(
            registry.forget_with(&id("A"), || MemoryRelease::NotFound).unwrap(),
            MemoryRelease::NotFound
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_never_exceeds_capacity() {
        let registry = Arc::new(SessionRegistry::new(3));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.admit(&ConversationId::new(format!("c{i}"))) })
            })
            .collect();

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Admission::Admitted) => admitted += 1,
                Err(SessionError::CapacityExceeded { .. }) => rejected += 1,
                other => panic!("unexpected admission result: {other:?}"),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(rejected, 29);
        assert_eq!(registry.len(), 3);
    }
}
