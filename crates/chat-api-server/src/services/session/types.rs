use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::ConversationId;
use crate::services::conversation::MemoryRelease;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Server at capacity ({capacity} live sessions)")]
    CapacityExceeded { capacity: usize },

    #[error("Model chain failure: {0}")]
    ChainFailure(String),

    #[error("{0}")]
    ConsistencyViolation(ConsistencyViolation),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Short-term memory survived a removal attempt; the registry entry was kept.
    MemoryNotReleased,
    /// Short-term memory exists for an id the registry does not track.
    OrphanedMemory,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryNotReleased => f.write_str("memory_not_released"),
            Self::OrphanedMemory => f.write_str("orphaned_memory"),
        }
    }
}

/// Registry and conversation store disagree about whether an id is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyViolation {
    pub conversation_id: ConversationId,
    pub kind: ViolationKind,
    pub detail: String,
}

impl ConsistencyViolation {
    pub fn memory_not_released(id: &ConversationId) -> Self {
        Self {
            conversation_id: id.clone(),
            kind: ViolationKind::MemoryNotReleased,
            detail: "short-term memory still present after removal, registry entry retained"
                .to_string(),
        }
    }

    pub fn orphaned_memory(id: &ConversationId) -> Self {
        Self {
            conversation_id: id.clone(),
            kind: ViolationKind::OrphanedMemory,
            detail: "short-term memory present without a registry entry".to_string(),
        }
    }
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Consistency violation ({}) for conversation {}: {}",
            self.kind, self.conversation_id, self.detail
        )
    }
}

impl From<ConsistencyViolation> for SessionError {
    fn from(violation: ConsistencyViolation) -> Self {
        SessionError::ConsistencyViolation(violation)
    }
}

/// Registry record for one live conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEntry {
    pub conversation_id: ConversationId,
    pub last_activity: DateTime<Utc>,
    /// Turns currently running for this id.
    #[serde(skip)]
    pub active_turns: usize,
}

impl SessionEntry {
    pub fn new(conversation_id: ConversationId, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            last_activity: now,
            active_turns: 0,
        }
    }

    /// `now - last_activity >= threshold` with no turn in flight.
    /// A clock that went backwards is never idle.
    pub fn is_idle(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.active_turns > 0 {
            return false;
        }
        (now - self.last_activity)
            .to_std()
            .map(|idle| idle >= threshold)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Id was already live; nothing was added.
    AlreadyLive,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::AlreadyLive => "already_live",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Removed from both stores. Carries what the conversation store reported.
    Evicted(MemoryRelease),
    Retained,
    /// Id not in the registry (already forgotten).
    Unknown,
}

impl Eviction {
    pub fn is_evicted(&self) -> bool {
        matches!(self, Self::Evicted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Had short-term state and it was removed.
    Cleared,
    /// There was no short-term state to remove.
    NothingToClear,
}

impl ClearOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cleared => "cleared",
            Self::NothingToClear => "nothing_to_clear",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Cleared => 1,
            Self::NothingToClear => 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: Vec<ConversationId>,
    pub retained: usize,
    pub orphans_reclaimed: usize,
    pub violations: Vec<ConsistencyViolation>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_idle_threshold_is_inclusive() {
        let t0 = Utc::now();
        let entry = SessionEntry::new(ConversationId::from("x"), t0);
        let threshold = Duration::from_secs(60);

        assert!(!entry.is_idle(t0 + TimeDelta::seconds(59), threshold));
        assert!(entry.is_idle(t0 + TimeDelta::seconds(60), threshold));
        assert!(entry.is_idle(t0 + TimeDelta::seconds(61), threshold));
    }

    #[test]
    fn test_clock_skew_is_not_idle() {
        let t0 = Utc::now();
        let entry = SessionEntry::new(ConversationId::from("x"), t0);
        assert!(!entry.is_idle(t0 - TimeDelta::seconds(5), Duration::ZERO));
    }

    #[test]
    fn test_entry_with_turn_in_flight_is_never_idle() {
        let t0 = Utc::now();
        let mut entry = SessionEntry::new(ConversationId::from("x"), t0);
        entry.active_turns = 1;
        assert!(!entry.is_idle(t0 + TimeDelta::seconds(3600), Duration::from_secs(60)));

        entry.active_turns = 0;
        assert!(entry.is_idle(t0 + TimeDelta::seconds(3600), Duration::from_secs(60)));
    }

    #[test]
    fn test_violation_display_names_id_and_kind() {
        let v = ConsistencyViolation::memory_not_released(&ConversationId::from("abc"));
        let text = SessionError::from(v).to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("memory_not_released"));
    }
}
