use std::sync::Arc;
use tracing::{info, warn};

use super::metrics::SessionMetrics;
use super::registry::SessionRegistry;
use super::types::{Admission, SessionError};
use crate::models::ConversationId;
use crate::services::event_bus::{EventBus, SessionEvent};

/// Gate in front of `SessionRegistry::admit` that records the decision.
pub struct AdmissionController {
    registry: Arc<SessionRegistry>,
    metrics: Arc<SessionMetrics>,
    events: Arc<EventBus>,
}

impl AdmissionController {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<SessionMetrics>, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            metrics,
            events,
        }
    }

    pub fn try_admit(&self, id: &ConversationId) -> Result<Admission, SessionError> {
        self.record(id, self.registry.admit(id))
    }

    /// Admit and pin `id` for a turn that is about to run.
    pub fn try_admit_pinned(&self, id: &ConversationId) -> Result<Admission, SessionError> {
        self.record(id, self.registry.admit_pinned(id))
    }

    fn record(
        &self,
        id: &ConversationId,
        result: Result<Admission, SessionError>,
    ) -> Result<Admission, SessionError> {
        match result {
            Ok(Admission::Admitted) => {
                self.metrics.inc_admitted();
                self.events.publish(SessionEvent::Admitted {
                    conversation_id: id.clone(),
                });
                info!(
                    conversation_id = %id,
                    live = self.registry.len(),
                    capacity = self.registry.capacity(),
                    "Session admitted"
                );
                Ok(Admission::Admitted)
            }
            Ok(Admission::AlreadyLive) => {
                info!(conversation_id = %id, "Session already live");
                Ok(Admission::AlreadyLive)
            }
            Err(SessionError::CapacityExceeded { capacity }) => {
                self.metrics.inc_rejected();
                self.events.publish(SessionEvent::Rejected {
                    conversation_id: id.clone(),
                    capacity,
                });
                warn!(conversation_id = %id, capacity, "Session rejected, server at capacity");
                Err(SessionError::CapacityExceeded { capacity })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(capacity: usize) -> (AdmissionController, Arc<SessionMetrics>, Arc<EventBus>) {
        let metrics = Arc::new(SessionMetrics::new());
        let events = Arc::new(EventBus::new(16));
        let controller = AdmissionController::new(
            Arc::new(SessionRegistry::new(capacity)),
            metrics.clone(),
            events.clone(),
        );
        (controller, metrics, events)
    }

    #[tokio::test]
    async fn test_rejection_is_counted_and_published() {
        let (controller, metrics, events) = controller(1);
        let mut rx = events.subscribe();

        controller.try_admit(&ConversationId::from("A")).unwrap();
        let err = controller.try_admit(&ConversationId::from("B")).unwrap_err();
        assert_eq!(err, SessionError::CapacityExceeded { capacity: 1 });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.admitted_total, 1);
        assert_eq!(snapshot.rejected_total, 1);

        let first = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        let second = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "admitted");
        assert_eq!(second["type"], "rejected");
        assert_eq!(second["payload"]["capacity"], 1);
    }

    #[test]
    fn test_already_live_is_success_but_not_counted() {
        let (controller, metrics, _events) = controller(1);
        let id = ConversationId::from("A");

        assert_eq!(controller.try_admit(&id).unwrap(), Admission::Admitted);
        assert_eq!(controller.try_admit(&id).unwrap(), Admission::AlreadyLive);
        assert_eq!(metrics.snapshot().admitted_total, 1);
    }
}
