use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::admission::AdmissionController;
use super::lease::TurnLease;
use super::metrics::{MetricsSnapshot, SessionMetrics};
use super::registry::SessionRegistry;
use super::types::{
    Admission, ClearOutcome, ConsistencyViolation, Eviction, SessionError, SweepReport,
};
use crate::config::SessionConfig;
use crate::models::chat::{ConversationView, SessionView};
use crate::models::ConversationId;
use crate::services::conversation::{ConversationStore, MemoryRelease};
use crate::services::event_bus::{EventBus, SessionEvent};

/// Read-only dump for `/active-sessions`.
#[derive(Debug, Serialize)]
pub struct SessionsSnapshot {
    pub capacity: usize,
    pub live: usize,
    pub sessions: Vec<SessionView>,
    pub conversations: Vec<ConversationView>,
    pub metrics: MetricsSnapshot,
}

/// Owns the registry and the conversation store and keeps them in step.
///
/// Every path that removes an id from both goes through the registry entry
/// lock, with the store released inside it (lock order: registry, then store).
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    store: Arc<ConversationStore>,
    admission: AdmissionController,
    metrics: Arc<SessionMetrics>,
    events: Arc<EventBus>,
    idle_threshold: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, events: Arc<EventBus>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.capacity));
        let store = Arc::new(ConversationStore::new(config.max_turn_pairs));
        let metrics = Arc::new(SessionMetrics::new());
        let admission = AdmissionController::new(registry.clone(), metrics.clone(), events.clone());

        Self {
            registry,
            store,
            admission,
            metrics,
            events,
            idle_threshold: config.idle_threshold(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    pub fn try_admit(&self, id: &ConversationId) -> Result<Admission, SessionError> {
        self.admission.try_admit(id)
    }

    pub fn touch(&self, id: &ConversationId) -> bool {
        self.registry.touch(id)
    }

    /// Pin `id` so idle eviction leaves it alone until the lease drops.
    ///
    /// With `admit_missing`, an id that is not live goes through admission
    /// and counts against capacity. Otherwise it is `UnknownConversation`.
    pub fn begin_turn(&self, id: &ConversationId, admit_missing: bool) -> Result<TurnLease, SessionError> {
        if !self.registry.pin(id) {
            if !admit_missing {
                return Err(SessionError::UnknownConversation(id.clone()));
            }
            debug!(conversation_id = %id, "Admitting unknown conversation on turn");
            self.admission.try_admit_pinned(id)?;
        }
        Ok(TurnLease::new(self.registry.clone(), id.clone()))
    }

    pub fn is_live(&self, id: &ConversationId) -> bool {
        self.registry.is_live(id)
    }

    /// Remove `id` from both stores. Unknown ids are a successful no-op.
    pub fn clear(&self, id: &ConversationId) -> Result<ClearOutcome, SessionError> {
        let store = &self.store;
        match self.registry.forget_with(id, || store.release(id)) {
            Ok(released) => {
                let outcome = if released.had_memory() {
                    ClearOutcome::Cleared
                } else {
                    ClearOutcome::NothingToClear
                };
                self.metrics.inc_cleared();
                self.events.publish(SessionEvent::Cleared {
                    conversation_id: id.clone(),
                    had_memory: released.had_memory(),
                });
                info!(conversation_id = %id, outcome = outcome.as_str(), "Session cleared");
                Ok(outcome)
            }
            Err(SessionError::ConsistencyViolation(violation)) => {
                self.report_violation(&violation);
                Err(SessionError::ConsistencyViolation(violation))
            }
            Err(e) => Err(e),
        }
    }

    pub fn evict_if_idle(&self, id: &ConversationId, now: DateTime<Utc>) -> Result<Eviction, SessionError> {
        let store = &self.store;
        let result = self
            .registry
            .evict_if_idle(id, now, self.idle_threshold, || store.release(id));

        match &result {
            Ok(Eviction::Evicted(released)) => {
                self.metrics.inc_evicted();
                self.events.publish(SessionEvent::Evicted {
                    conversation_id: id.clone(),
                    had_memory: released.had_memory(),
                });
                if *released == MemoryRelease::NotFound {
                    info!(conversation_id = %id, "Idle session evicted, it had no short-term memory");
                } else {
                    info!(conversation_id = %id, "Idle session evicted");
                }
            }
            Err(SessionError::ConsistencyViolation(violation)) => self.report_violation(violation),
            _ => {}
        }
        result
    }

    /// One pass over every live id, then over memory the registry does not know.
    /// A failure on one id never stops the pass.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let ids = self.registry.ids();
        let mut report = SweepReport {
            scanned: ids.len(),
            ..Default::default()
        };

        for id in ids {
            match self.evict_if_idle(&id, now) {
                Ok(Eviction::Evicted(_)) => report.evicted.push(id),
                Ok(Eviction::Retained) => report.retained += 1,
                // Cleared by another request since the snapshot.
                Ok(Eviction::Unknown) => {}
                Err(SessionError::ConsistencyViolation(violation)) => report.violations.push(violation),
                Err(e) => warn!(conversation_id = %id, error = %e, "Unexpected sweep error"),
            }
        }

        for id in self.store.ids() {
            if self.registry.is_live(&id) {
                continue;
            }
            let violation = ConsistencyViolation::orphaned_memory(&id);
            self.report_violation(&violation);
            report.violations.push(violation);

            if self.store.remove_if_idle(&id, now, self.idle_threshold) {
                report.orphans_reclaimed += 1;
                info!(conversation_id = %id, "Reclaimed orphaned short-term memory");
            }
        }

        self.metrics.inc_sweeps();
        self.events.publish(SessionEvent::SweepCompleted {
            scanned: report.scanned,
            evicted: report.evicted.len(),
            violations: report.violations.len(),
        });
        report
    }

    pub fn snapshot(&self) -> SessionsSnapshot {
        let sessions = self
            .registry
            .entries()
            .into_iter()
            .map(|entry| SessionView {
                conversation_id: entry.conversation_id,
                last_activity: entry.last_activity,
            })
            .collect::<Vec<_>>();

        SessionsSnapshot {
            capacity: self.registry.capacity(),
            live: sessions.len(),
            sessions,
            conversations: self.store.views(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn report_violation(&self, violation: &ConsistencyViolation) {
        error!(
            conversation_id = %violation.conversation_id,
            kind = %violation.kind,
            detail = %violation.detail,
            "Session consistency violation"
        );
        self.metrics.inc_violations();
        self.events.publish(SessionEvent::ConsistencyViolation {
            conversation_id: violation.conversation_id.clone(),
            kind: violation.kind,
            detail: violation.detail.clone(),
        });
    }
}
