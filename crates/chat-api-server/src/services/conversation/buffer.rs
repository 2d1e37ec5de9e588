use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::Turn;

/// Append-only turn log for a single conversation.
pub struct ShortTermMemoryBuffer {
    turns: RwLock<Vec<Turn>>,
    last_write: RwLock<DateTime<Utc>>,
    /// Sliding-window cap in human/assistant pairs. `None` = unbounded.
    max_turn_pairs: Option<usize>,
    /// FIFO gate so turns for one conversation are processed in call order.
    turn_gate: Mutex<()>,
}

impl ShortTermMemoryBuffer {
    pub fn new(max_turn_pairs: Option<usize>) -> Self {
        Self {
            turns: RwLock::new(Vec::new()),
            last_write: RwLock::new(Utc::now()),
            max_turn_pairs,
            turn_gate: Mutex::new(()),
        }
    }

    /// Wait for exclusive use of this conversation for one turn.
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_gate.lock().await
    }

    pub fn append(&self, turn: Turn) {
        let mut turns = self.turns.write();
        turns.push(turn);
        self.enforce_window(&mut turns);
        *self.last_write.write() = Utc::now();
    }

    /// Record a human message and its reply as one atomic step.
    pub fn record_exchange(&self, human: impl Into<String>, assistant: impl Into<String>) {
        let mut turns = self.turns.write();
        turns.push(Turn::human(human));
        turns.push(Turn::assistant(assistant));
        self.enforce_window(&mut turns);
        *self.last_write.write() = Utc::now();
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    pub fn clear(&self) {
        self.turns.write().clear();
        *self.last_write.write() = Utc::now();
    }

    pub fn last_write(&self) -> DateTime<Utc> {
        *self.last_write.read()
    }

    pub fn is_idle(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        (now - self.last_write())
            .to_std()
            .map(|idle| idle >= threshold)
            .unwrap_or(false)
    }

    fn enforce_window(&self, turns: &mut Vec<Turn>) {
        let Some(max_pairs) = self.max_turn_pairs else {
            return;
        };
        let max_turns = max_pairs.max(1) * 2;
        if turns.len() > max_turns {
            let excess = turns.len() - max_turns;
            turns.drain(..excess);
        }
    }
}

impl Default for ShortTermMemoryBuffer {
    fn default() -> Self {
        Self::new(None)
    }
}
