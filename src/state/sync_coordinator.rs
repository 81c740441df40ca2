//! Single-flight synchronization coordinator
//!
//! A pass loads the current document, broadcasts the requested fields to
//! every collaborator, then reads them back. At most one pass runs at any
//! instant. Requests that arrive while a pass is running collapse into one
//! pending follow-up whose scope is the union of what was asked for.
//!
//! When a pass ends without every collaborator converging, a full retry is
//! scheduled with exponential backoff. Retries are capped; once exhausted the
//! coordinator reports an unresolved status instead of retrying forever. Any
//! external request cancels a pending retry, since the pass it starts
//! verifies again anyway.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::services::broadcaster::{BroadcastSummary, CollaboratorBroadcaster};
use crate::services::collaborators::CollaboratorRegistry;
use crate::services::event_bus::EventBus;
use crate::services::settings_store::SettingsStore;
use crate::services::verifier::{ConvergenceReport, ConvergenceVerifier};
use crate::state::indicator::{ConvergenceIndicator, ConvergenceStatus};
use crate::types::events::SettingsEvent;
use crate::types::SettingsField;

/// Which fields a pass synchronizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    All,
    Fields(BTreeSet<SettingsField>),
}

impl SyncScope {
    pub fn field(field: SettingsField) -> Self {
        Self::Fields(BTreeSet::from([field]))
    }

    pub fn fields(&self) -> Vec<SettingsField> {
        match self {
            Self::All => SettingsField::ALL.to_vec(),
            Self::Fields(fields) => fields.iter().copied().collect(),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Widen this scope to also cover `other`
    pub fn merge(&mut self, other: SyncScope) {
        match (&mut *self, other) {
            (Self::All, _) => {}
            (_, Self::All) => *self = Self::All,
            (Self::Fields(mine), Self::Fields(theirs)) => mine.extend(theirs),
        }
    }
}

/// What happened to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new pass was started
    Started,
    /// A pass was already running; folded into its follow-up
    Coalesced,
}

/// One unit of work for the driver loop
#[derive(Debug, Clone)]
struct PassJob {
    scope: SyncScope,
    /// 0 for externally requested passes, n for the n-th retry
    attempt: u32,
}

/// Process-wide sync state. `pending_requested` is only ever true while
/// `in_progress` is true.
#[derive(Debug, Default)]
struct SyncState {
    in_progress: bool,
    pending_requested: bool,
    pending_scope: Option<SyncScope>,
    pending_attempt: u32,
    retry: Option<JoinHandle<()>>,
}

/// How a pass that has no follow-up ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    Converged,
    Retrying,
    Unresolved,
}

/// Resets the sync state if a pass unwinds before it settles
struct PassGuard<'a> {
    coordinator: &'a SyncCoordinator,
    armed: bool,
}

impl<'a> PassGuard<'a> {
    fn new(coordinator: &'a SyncCoordinator) -> Self {
        Self {
            coordinator,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.abandon_pass();
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncStats {
    passes: AtomicU64,
    retries_scheduled: AtomicU64,
    unresolved: AtomicU64,
}

impl SyncStats {
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::SeqCst)
    }

    pub fn unresolved(&self) -> u64 {
        self.unresolved.load(Ordering::SeqCst)
    }
}

pub struct SyncCoordinator {
    store: Arc<SettingsStore>,
    broadcaster: CollaboratorBroadcaster,
    verifier: ConvergenceVerifier,
    events: Arc<EventBus>,
    indicator: Arc<dyn ConvergenceIndicator>,
    config: EngineConfig,
    state: Mutex<SyncState>,
    idle_tx: watch::Sender<bool>,
    last_reports: Mutex<Vec<ConvergenceReport>>,
    stats: SyncStats,
    weak_self: Weak<SyncCoordinator>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<SettingsStore>,
        registry: Arc<CollaboratorRegistry>,
        events: Arc<EventBus>,
        indicator: Arc<dyn ConvergenceIndicator>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (idle_tx, _idle_rx) = watch::channel(true);

        Arc::new_cyclic(|weak_self| Self {
            store,
            broadcaster: CollaboratorBroadcaster::new(registry.clone()),
            verifier: ConvergenceVerifier::new(registry),
            events,
            indicator,
            config,
            state: Mutex::new(SyncState::default()),
            idle_tx,
            last_reports: Mutex::new(Vec::new()),
            stats: SyncStats::default(),
            weak_self: weak_self.clone(),
        })
    }

    /// Synchronize every field to every collaborator
    pub fn force_sync(&self) -> RequestOutcome {
        self.request(SyncScope::All)
    }

    /// Synchronize `scope`. Cancels any pending convergence retry.
    pub fn request(&self, scope: SyncScope) -> RequestOutcome {
        self.begin(PassJob { scope, attempt: 0 }, true)
    }

    pub fn is_in_progress(&self) -> bool {
        self.lock_state().in_progress
    }

    pub fn has_pending_retry(&self) -> bool {
        self.lock_state()
            .retry
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Reports from the most recent pass
    pub fn last_reports(&self) -> Vec<ConvergenceReport> {
        self.last_reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolve once no pass is running (a scheduled retry does not count)
    pub async fn wait_until_idle(&self) {
        let mut rx = self.idle_tx.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry check-and-set. The whole decision happens under one lock so two
    /// callers can never both observe `in_progress == false`.
    fn begin(&self, job: PassJob, external: bool) -> RequestOutcome {
        let mut state = self.lock_state();

        if external {
            if let Some(retry) = state.retry.take() {
                if !retry.is_finished() {
                    debug!("Cancelling pending convergence retry");
                }
                retry.abort();
            }
        }

        if state.in_progress {
            state.pending_attempt = if state.pending_requested {
                state.pending_attempt.min(job.attempt)
            } else {
                job.attempt
            };
            state.pending_requested = true;
            match state.pending_scope.as_mut() {
                Some(scope) => scope.merge(job.scope),
                None => state.pending_scope = Some(job.scope),
            }
            debug!("Sync already running, follow-up pass requested");
            return RequestOutcome::Coalesced;
        }

        state.in_progress = true;
        self.idle_tx.send_replace(false);
        drop(state);

        self.launch(job);
        RequestOutcome::Started
    }

    fn launch(&self, job: PassJob) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let Some(this) = self.weak_self.upgrade() else {
                    return;
                };
                handle.spawn(async move { this.drive(job).await });
            }
            Err(_) => {
                // No runtime (e.g. called from plain sync code): run inline
                let mut guard = PassGuard::new(self);
                let mut next = Some(job);
                while let Some(job) = next {
                    let reports = self.run_pass(&job);
                    next = self.finish_pass(&job, &reports);
                }
                guard.disarm();
            }
        }
    }

    /// Driver loop: run a pass, then either pick up the follow-up or go idle.
    /// Follow-ups are iterations of this loop, never nested calls.
    async fn drive(self: Arc<Self>, mut job: PassJob) {
        let mut guard = PassGuard::new(&self);
        loop {
            let reports = self.run_pass(&job);
            match self.finish_pass(&job, &reports) {
                Some(next) => {
                    tokio::task::yield_now().await;
                    job = next;
                }
                None => break,
            }
        }
        guard.disarm();
    }

    /// Reset after a pass unwound. Requests folded into it are dropped; the
    /// next request starts a fresh pass.
    fn abandon_pass(&self) {
        error!("Sync pass aborted by a panic, resetting sync state");
        let mut state = self.lock_state();
        state.in_progress = false;
        state.pending_requested = false;
        state.pending_scope = None;
        state.pending_attempt = 0;
        self.idle_tx.send_replace(true);
    }

    /// One full pass: snapshot -> broadcast -> verify
    fn run_pass(&self, job: &PassJob) -> Vec<ConvergenceReport> {
        self.indicator.report(ConvergenceStatus::Syncing);

        let doc = self.store.snapshot();
        let fields = job.scope.fields();

        if job.attempt > 0 {
            info!("Convergence retry {} syncing {:?}", job.attempt, fields);
        } else {
            info!("Syncing {:?}", fields);
        }

        let mut summary = BroadcastSummary::default();
        for field in &fields {
            summary.merge(self.broadcaster.broadcast(*field, &doc));
        }

        if job.scope.is_full() {
            self.broadcaster.request_reload();
        }
        self.broadcaster.refresh_views(&fields);

        // Every broadcast above has returned before anything is read back
        let reports = self.verifier.verify_all(&fields, &doc);

        self.stats.passes.fetch_add(1, Ordering::SeqCst);
        info!(
            "Sync pass complete: {} delivered, {} skipped, {} failed",
            summary.delivered, summary.skipped, summary.failed
        );

        if job.scope.is_full() {
            self.events.publish(SettingsEvent::ForceSynchronizationCompleted {
                settings: doc,
                timestamp: Utc::now(),
            });
        }

        *self.last_reports.lock().unwrap_or_else(|e| e.into_inner()) = reports.clone();
        reports
    }

    /// Settle state after a pass. Returns the follow-up job, if one was requested.
    ///
    /// Only the state transition happens under the lock; the indicator and
    /// listeners are told afterwards so they may call back into the coordinator.
    fn finish_pass(&self, job: &PassJob, reports: &[ConvergenceReport]) -> Option<PassJob> {
        let unconverged: Vec<SettingsField> = reports
            .iter()
            .filter(|r| !r.converged)
            .map(|r| r.field)
            .collect();

        let outcome = {
            let mut state = self.lock_state();

            if state.pending_requested {
                state.pending_requested = false;
                let scope = state.pending_scope.take().unwrap_or(SyncScope::All);
                let attempt = std::mem::take(&mut state.pending_attempt);
                debug!("Starting follow-up sync pass");
                return Some(PassJob { scope, attempt });
            }

            let outcome = if unconverged.is_empty() {
                PassOutcome::Converged
            } else if job.attempt + 1 > self.config.max_retry_attempts {
                PassOutcome::Unresolved
            } else {
                state.retry = self.schedule_retry(job.attempt + 1);
                PassOutcome::Retrying
            };

            state.in_progress = false;
            self.idle_tx.send_replace(true);
            outcome
        };

        match outcome {
            PassOutcome::Converged => self.indicator.report(ConvergenceStatus::Converged),
            PassOutcome::Retrying => {}
            PassOutcome::Unresolved => {
                warn!(
                    "Giving up on {:?} after {} retries",
                    unconverged, job.attempt
                );
                self.stats.unresolved.fetch_add(1, Ordering::SeqCst);
                self.indicator.report(ConvergenceStatus::Unresolved {
                    attempts: job.attempt,
                });
                self.events.publish(SettingsEvent::ConvergenceUnresolved {
                    fields: unconverged,
                    attempts: job.attempt,
                });
            }
        }

        None
    }

    fn schedule_retry(&self, attempt: u32) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available, convergence retry {} skipped", attempt);
                return None;
            }
        };

        let delay = self.config.retry_delay(attempt);
        let weak = self.weak_self.clone();
        info!(
            "Collaborators not converged, retry {} of {} in {:?}",
            attempt, self.config.max_retry_attempts, delay
        );
        self.stats.retries_scheduled.fetch_add(1, Ordering::SeqCst);

        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(this) = weak.upgrade() {
                this.begin(
                    PassJob {
                        scope: SyncScope::All,
                        attempt,
                    },
                    false,
                );
            }
        }))
    }
}
