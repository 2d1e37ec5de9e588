//! Session lifecycle: admission, activity tracking, idle eviction.

mod admission;
mod lease;
mod manager;
mod metrics;
mod registry;
mod sweeper;
pub mod types;

pub use admission::AdmissionController;
pub use lease::TurnLease;
pub use manager::{SessionManager, SessionsSnapshot};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use registry::SessionRegistry;
pub use sweeper::EvictionSweeper;
pub use types::{
    Admission, ClearOutcome, ConsistencyViolation, Eviction, SessionEntry, SessionError,
    SweepReport, ViolationKind,
};
