//! Process-wide synchronization state
//!
//! The single `SyncCoordinator` owns the in-progress/pending flags and the
//! retry timer; the indicator renders what it reports.

pub mod indicator;
pub mod sync_coordinator;

pub use indicator::{ConvergenceIndicator, ConvergenceStatus, StatusIndicator};
pub use sync_coordinator::{RequestOutcome, SyncCoordinator, SyncScope, SyncStats};
