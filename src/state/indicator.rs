//! Sync status indicator
//!
//! Side effects only: the coordinator reports transitions, the indicator
//! shows them. A `Converged` status clears itself after the display time.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConvergenceStatus {
    /// Nothing to show
    Hidden,
    Syncing,
    Converged,
    /// Retries exhausted
    Unresolved { attempts: u32 },
}

pub trait ConvergenceIndicator: Send + Sync {
    fn report(&self, status: ConvergenceStatus);
}

/// Indicator backed by a watch channel, for any front-end that wants to render it
pub struct StatusIndicator {
    tx: watch::Sender<ConvergenceStatus>,
    display_time: Duration,
    // Bumped on every report so a stale auto-clear does not hide a newer status
    generation: Arc<AtomicU64>,
}

impl StatusIndicator {
    pub fn new(display_time: Duration) -> Self {
        let (tx, _rx) = watch::channel(ConvergenceStatus::Hidden);
        Self {
            tx,
            display_time,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConvergenceStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConvergenceStatus {
        *self.tx.borrow()
    }

    fn schedule_clear(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let tx = self.tx.clone();
        let current = self.generation.clone();
        let display_time = self.display_time;

        handle.spawn(async move {
            tokio::time::sleep(display_time).await;
            if current.load(Ordering::SeqCst) == generation {
                tx.send_replace(ConvergenceStatus::Hidden);
            }
        });
    }
}

impl ConvergenceIndicator for StatusIndicator {
    fn report(&self, status: ConvergenceStatus) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match status {
            ConvergenceStatus::Unresolved { attempts } => {
                warn!("Settings did not converge after {} retries", attempts)
            }
            ConvergenceStatus::Converged => info!("Settings in sync"),
            ConvergenceStatus::Syncing | ConvergenceStatus::Hidden => {}
        }

        self.tx.send_replace(status);

        if status == ConvergenceStatus::Converged {
            self.schedule_clear(generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_converged_clears_after_display_time() {
        let indicator = StatusIndicator::new(Duration::from_millis(2000));

        indicator.report(ConvergenceStatus::Syncing);
        assert_eq!(indicator.current(), ConvergenceStatus::Syncing);

        indicator.report(ConvergenceStatus::Converged);
        assert_eq!(indicator.current(), ConvergenceStatus::Converged);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(indicator.current(), ConvergenceStatus::Hidden);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_newer_status_survives_stale_clear() {
        let indicator = StatusIndicator::new(Duration::from_millis(2000));

        indicator.report(ConvergenceStatus::Converged);
        tokio::time::sleep(Duration::from_millis(500)).await;
        indicator.report(ConvergenceStatus::Syncing);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(indicator.current(), ConvergenceStatus::Syncing);
    }

    #[test]
    fn test_unresolved_is_sticky_without_runtime() {
        let indicator = StatusIndicator::new(Duration::from_millis(10));
        indicator.report(ConvergenceStatus::Unresolved { attempts: 6 });
        assert_eq!(
            indicator.current(),
            ConvergenceStatus::Unresolved { attempts: 6 }
        );
    }
}
