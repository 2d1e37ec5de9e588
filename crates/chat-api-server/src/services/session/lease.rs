use std::sync::Arc;
use tracing::debug;

use super::registry::SessionRegistry;
use crate::models::ConversationId;

/// Pins a live session for the duration of one turn.
///
/// While held, idle eviction skips the id. Dropping it unpins and counts as
/// activity, whatever the turn's outcome.
pub struct TurnLease {
    registry: Arc<SessionRegistry>,
    id: ConversationId,
}

impl TurnLease {
    pub(super) fn new(registry: Arc<SessionRegistry>, id: ConversationId) -> Self {
        Self { registry, id }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.id
    }
}

impl Drop for TurnLease {
    fn drop(&mut self) {
        if !self.registry.unpin(&self.id) {
            debug!(conversation_id = %self.id, "Session cleared while its turn was running");
        }
    }
}
