use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::ConversationId;
use crate::services::session::ViolationKind;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Admitted { conversation_id: ConversationId },
    Rejected { conversation_id: ConversationId, capacity: usize },
    TurnRecorded { conversation_id: ConversationId, turns: usize },
    TurnFailed { conversation_id: ConversationId, reason: String },
    Evicted { conversation_id: ConversationId, had_memory: bool },
    Cleared { conversation_id: ConversationId, had_memory: bool },
    ConsistencyViolation {
        conversation_id: ConversationId,
        kind: ViolationKind,
        detail: String,
    },
    SweepCompleted { scanned: usize, evicted: usize, violations: usize },
}

impl SessionEvent {
    /// Same string as the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::Rejected { .. } => "rejected",
            Self::TurnRecorded { .. } => "turn_recorded",
            Self::TurnFailed { .. } => "turn_failed",
            Self::Evicted { .. } => "evicted",
            Self::Cleared { .. } => "cleared",
            Self::ConsistencyViolation { .. } => "consistency_violation",
            Self::SweepCompleted { .. } => "sweep_completed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

pub struct EventBus {
    tx: broadcast::Sender<TimedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        let timed = TimedEvent {
            at: Utc::now(),
            event,
        };
        // No subscribers is the normal case outside of /events.
        if self.tx.send(timed).is_err() {
            trace!("Session event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::Admitted {
            conversation_id: ConversationId::from("a"),
        });

        let received = rx.recv().await.unwrap();
        let json = serde_json::to_value(&received).unwrap();
        assert_eq!(json["type"], "admitted");
        assert_eq!(json["type"], received.event.kind());
        assert_eq!(json["payload"]["conversation_id"], "a");
        assert!(json["at"].is_string());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(SessionEvent::SweepCompleted {
            scanned: 0,
            evicted: 0,
            violations: 0,
        });
    }
}
