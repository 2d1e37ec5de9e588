use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::buffer::ShortTermMemoryBuffer;
use super::composer::{MemoryComposer, MergedContext, Passage};
use crate::models::ConversationId;
use crate::services::event_bus::SessionEvent;
use crate::services::session::{SessionError, SessionManager};

/// External model invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelChain: Send + Sync {
    async fn invoke(&self, context: &MergedContext, input: &str) -> Result<String>;
}

/// Shared, read-only retrieval over the knowledge base.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LongTermContextProvider: Send + Sync {
    /// At most `context_size()` passages, best match first.
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>>;

    fn context_size(&self) -> usize;
}

pub struct ChatOrchestrator {
    sessions: Arc<SessionManager>,
    long_term: Arc<dyn LongTermContextProvider>,
    chain: Arc<dyn ModelChain>,
    chain_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        long_term: Arc<dyn LongTermContextProvider>,
        chain: Arc<dyn ModelChain>,
        chain_timeout: Duration,
    ) -> Self {
        info!(
            k = long_term.context_size(),
            timeout_ms = chain_timeout.as_millis() as u64,
            "Chat orchestrator ready"
        );
        Self {
            sessions,
            long_term,
            chain,
            chain_timeout,
        }
    }

    /// Run one turn for `id`.
    ///
    /// Does not check admission: an id unknown to both stores gets a fresh
    /// buffer here. Callers hold a `TurnLease` so eviction cannot detach the
    /// buffer mid-turn. Turns for the same id are serialized in arrival order.
    /// The buffer is only written after the chain succeeds, so a failure or
    /// timeout leaves it exactly as it was. If the conversation was cleared
    /// while the chain ran, the turn fails instead of writing to memory that
    /// is no longer reachable.
    pub async fn handle_turn(&self, id: &ConversationId, input: &str) -> Result<String, SessionError> {
        let buffer = self.sessions.store().get_or_create(id);
        let _turn = buffer.begin_turn().await;
        let started = Instant::now();

        let response = match tokio::time::timeout(self.chain_timeout, self.run_chain(&buffer, input)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.fail_turn(id, format!("{e:#}"))),
            Err(_) => {
                return Err(self.fail_turn(
                    id,
                    format!("model chain timed out after {}ms", self.chain_timeout.as_millis()),
                ))
            }
        };

        if !self
            .sessions
            .store()
            .record_if_current(id, &buffer, input, response.clone())
        {
            return Err(self.fail_turn(
                id,
                "conversation was removed while the turn was running".to_string(),
            ));
        }
        if !self.sessions.touch(id) {
            debug!(conversation_id = %id, "Turn recorded for an id the registry does not track");
        }

        let turns = buffer.len();
        self.sessions.metrics().inc_turns();
        self.sessions.events().publish(SessionEvent::TurnRecorded {
            conversation_id: id.clone(),
            turns,
        });
        info!(
            conversation_id = %id,
            turns,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn recorded"
        );

        Ok(response)
    }

    async fn run_chain(&self, buffer: &ShortTermMemoryBuffer, input: &str) -> Result<String> {
        let passages = self
            .long_term
            .retrieve(input)
            .await
            .context("long-term retrieval failed")?;
        let context = MemoryComposer::merge(buffer.snapshot(), passages);

        debug!(
            history = context.short_term.len(),
            passages = context.long_term.len(),
            "Invoking model chain"
        );
        self.chain.invoke(&context, input).await
    }

    fn fail_turn(&self, id: &ConversationId, reason: String) -> SessionError {
        warn!(conversation_id = %id, %reason, "Chat turn failed");
        self.sessions.metrics().inc_chain_failures();
        self.sessions.events().publish(SessionEvent::TurnFailed {
            conversation_id: id.clone(),
            reason: reason.clone(),
        });
        SessionError::ChainFailure(reason)
    }
}
