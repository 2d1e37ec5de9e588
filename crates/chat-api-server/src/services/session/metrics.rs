use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SessionMetrics {
    started_at: DateTime<Utc>,
    pub admitted_total: AtomicU64,
    pub rejected_total: AtomicU64,
    pub evicted_total: AtomicU64,
    pub cleared_total: AtomicU64,
    pub turns_total: AtomicU64,
    pub chain_failures_total: AtomicU64,
    pub consistency_violations_total: AtomicU64,
    pub sweeps_total: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            admitted_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            cleared_total: AtomicU64::new(0),
            turns_total: AtomicU64::new(0),
            chain_failures_total: AtomicU64::new(0),
            consistency_violations_total: AtomicU64::new(0),
            sweeps_total: AtomicU64::new(0),
        }
    }

    pub fn inc_admitted(&self) {
        self.admitted_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_evicted(&self) {
        self.evicted_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_cleared(&self) {
        self.cleared_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_turns(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_chain_failures(&self) {
        self.chain_failures_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_violations(&self) {
        self.consistency_violations_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_sweeps(&self) {
        self.sweeps_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            admitted_total: self.admitted_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            cleared_total: self.cleared_total.load(Ordering::Relaxed),
            turns_total: self.turns_total.load(Ordering::Relaxed),
            chain_failures_total: self.chain_failures_total.load(Ordering::Relaxed),
            consistency_violations_total: self
                .consistency_violations_total
                .load(Ordering::Relaxed),
            sweeps_total: self.sweeps_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub admitted_total: u64,
    pub rejected_total: u64,
    pub evicted_total: u64,
    pub cleared_total: u64,
    pub turns_total: u64,
    pub chain_failures_total: u64,
    pub consistency_violations_total: u64,
    pub sweeps_total: u64,
}
