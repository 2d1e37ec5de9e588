use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::manager::SessionManager;

/// Background task that evicts idle sessions on a fixed period.
pub struct EvictionSweeper {
    manager: Arc<SessionManager>,
    period: Duration,
}

impl EvictionSweeper {
    pub fn new(manager: Arc<SessionManager>, period: Duration) -> Self {
        Self { manager, period }
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                period_ms = self.period.as_millis() as u64,
                idle_threshold_secs = self.manager.idle_threshold().as_secs(),
                "Eviction sweeper started"
            );

            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_once(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Eviction sweeper stopped");
        })
    }

    fn run_once(&self) {
        let report = self.manager.sweep(Utc::now());

        if report.is_clean() {
            debug!(
                scanned = report.scanned,
                evicted = report.evicted.len(),
                retained = report.retained,
                "Sweep completed"
            );
        } else {
            warn!(
                scanned = report.scanned,
                evicted = report.evicted.len(),
                retained = report.retained,
                orphans_reclaimed = report.orphans_reclaimed,
                violations = report.violations.len(),
                "Sweep completed with consistency violations"
            );
        }
    }
}
