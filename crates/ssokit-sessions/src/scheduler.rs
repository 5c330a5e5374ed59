//! Background token-refresh scheduler.
//!
//! The [`RefreshScheduler`] owns a background loop that periodically scans
//! the session registry, selects sessions past their refresh threshold,
//! and refreshes them through the [`SessionManager`]. Entries are
//! processed independently: one session's failure never blocks or aborts
//! the scan of others. Manual entry points ([`RefreshScheduler::refresh_now`],
//! [`RefreshScheduler::refresh_all_pending`]) share the manager's
//! per-session single-flight, so a scheduled tick and a manual refresh
//! racing on the same session make exactly one backend call.
//!
//! The loop lifecycle is explicit: the embedding application calls
//! [`start`](RefreshScheduler::start) and [`stop`](RefreshScheduler::stop);
//! no hosting framework is assumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{SessionEvent, SessionEventData};
use crate::manager::{RefreshOutcome, SessionManager};
use crate::registry::{RegistryEntry, SessionRegistry};
use crate::types::Session;

/// Snapshot of scheduler statistics.
///
/// The refresh counters are monotonic for the scheduler's lifetime; they
/// are never reset.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    /// Sessions currently registered (including inert ones without a
    /// refresh token).
    pub registered_session_count: usize,
    /// Total successful refreshes performed.
    pub successful_refresh_count: u64,
    /// Total failed refresh attempts.
    pub failed_refresh_count: u64,
    /// When the loop last scanned the registry.
    pub last_check_at: Option<OffsetDateTime>,
    /// When the next scan is expected.
    pub next_check_at: Option<OffsetDateTime>,
}

/// Background scheduler that keeps registered sessions' tokens fresh.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
    /// Loop task state; `Some` while running.
    loop_handle: std::sync::Mutex<Option<LoopHandle>>,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

struct SchedulerInner {
    manager: Arc<SessionManager>,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
    successful_refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    last_check_at: std::sync::RwLock<Option<OffsetDateTime>>,
    next_check_at: std::sync::RwLock<Option<OffsetDateTime>>,
}

impl RefreshScheduler {
    /// Creates a scheduler over a session manager.
    ///
    /// The scheduler scans the manager's registry and uses the manager's
    /// refresh path, so registrations made by the manager (at creation and
    /// after refresh) are visible without extra wiring.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let registry = Arc::clone(manager.registry());
        let config = manager.config().clone();
        Self {
            inner: Arc::new(SchedulerInner {
                manager,
                registry,
                config,
                successful_refreshes: AtomicU64::new(0),
                failed_refreshes: AtomicU64::new(0),
                last_check_at: std::sync::RwLock::new(None),
                next_check_at: std::sync::RwLock::new(None),
            }),
            loop_handle: std::sync::Mutex::new(None),
        }
    }

    /// Starts the background loop.
    ///
    /// Idempotent: starting an already-running scheduler is a no-op.
    pub fn start(&self) {
        let mut handle = self.loop_handle.lock().expect("scheduler lock poisoned");
        if let Some(existing) = handle.as_ref() {
            if !existing.task.is_finished() {
                debug!("Refresh scheduler already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_loop(inner, shutdown_rx));

        *handle = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });

        info!(
            tick_interval = ?self.inner.config.tick_interval,
            "Refresh scheduler started"
        );
    }

    /// Stops the background loop.
    ///
    /// Signals the loop to stop scheduling new work and waits for the
    /// in-flight pass to drain, up to the configured grace period; on
    /// overrun the loop task is aborted. Stopping a stopped scheduler is a
    /// no-op.
    pub async fn stop(&self) {
        let handle = {
            let mut guard = self.loop_handle.lock().expect("scheduler lock poisoned");
            guard.take()
        };
        let Some(handle) = handle else {
            return;
        };

        // Ignore send errors: the loop may have already exited
        let _ = handle.shutdown.send(true);

        let mut task = handle.task;
        match tokio::time::timeout(self.inner.config.shutdown_grace, &mut task).await {
            Ok(_) => info!("Refresh scheduler stopped"),
            Err(_) => {
                warn!(
                    grace = ?self.inner.config.shutdown_grace,
                    "Refresh scheduler did not drain within grace period; aborting"
                );
                task.abort();
            }
        }
    }

    /// Returns whether the background loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .expect("scheduler lock poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Registers a session for automatic refresh.
    ///
    /// Sessions without a refresh token are accepted deliberately; they
    /// sit inert and are never selected by the scan, so callers need not
    /// branch on token presence.
    pub fn register_for_refresh(&self, session: &Session) {
        self.inner.registry.upsert(RegistryEntry::for_session(
            session,
            self.inner.config.refresh_threshold,
        ));
    }

    /// Removes a session from automatic refresh.
    ///
    /// Returns whether an entry existed.
    pub fn unregister_from_refresh(&self, session_id: &str) -> bool {
        self.inner.registry.remove(session_id)
    }

    /// Recomputes a session's refresh due time from its current expiry.
    ///
    /// Called after creation and every successful refresh (the manager
    /// does this itself; this entry point covers externally mutated
    /// sessions).
    pub fn update_registration(&self, session: &Session) {
        self.register_for_refresh(session);
    }

    /// Returns whether a session is registered.
    #[must_use]
    pub fn is_registered(&self, session_id: &str) -> bool {
        self.inner.registry.contains(session_id)
    }

    /// Refreshes one session immediately, outside the tick cycle.
    ///
    /// Returns `None` if the session was not found or the refresh failed;
    /// "already refreshed or gone" is an expected outcome here, not an
    /// error. Shares the per-session single-flight with the loop.
    pub async fn refresh_now(&self, session_id: &str) -> Option<Session> {
        match self.inner.manager.refresh_session_outcome(session_id).await {
            Ok(RefreshOutcome::Refreshed(session)) => {
                self.inner
                    .successful_refreshes
                    .fetch_add(1, Ordering::Relaxed);
                Some(session)
            }
            Ok(RefreshOutcome::AlreadyFresh(session)) => Some(session),
            Err(e) => {
                // Same classification as the scheduled path: a session that
                // is gone or revoked is an expected outcome, anything else
                // counts as a failed refresh
                if !matches!(
                    e,
                    SessionError::SessionNotFound { .. } | SessionError::InvalidState { .. }
                ) {
                    self.inner.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                }
                debug!(session_id = %session_id, error = %e, "Manual refresh did not complete");
                None
            }
        }
    }

    /// Forces an immediate scan-and-refresh pass.
    ///
    /// Returns the number of sessions actually refreshed (not attempted).
    pub async fn refresh_all_pending(&self) -> u64 {
        run_pass(&self.inner).await
    }

    /// Returns a snapshot of scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            registered_session_count: self.inner.registry.len(),
            successful_refresh_count: self.inner.successful_refreshes.load(Ordering::Relaxed),
            failed_refresh_count: self.inner.failed_refreshes.load(Ordering::Relaxed),
            last_check_at: *self
                .inner
                .last_check_at
                .read()
                .expect("scheduler lock poisoned"),
            next_check_at: *self
                .inner
                .next_check_at
                .read()
                .expect("scheduler lock poisoned"),
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(inner.config.tick_interval);
    // Skip the immediate first tick; freshly created sessions are not due
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let refreshed = run_pass(&inner).await;
                if refreshed > 0 {
                    info!(count = refreshed, "Scheduled refresh pass completed");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Refresh scheduler loop shutting down");
                    break;
                }
            }
        }
    }
}

/// One scan-and-refresh pass. Returns the number of sessions actually
/// refreshed.
async fn run_pass(inner: &Arc<SchedulerInner>) -> u64 {
    let now = OffsetDateTime::now_utc();
    *inner.last_check_at.write().expect("scheduler lock poisoned") = Some(now);
    *inner.next_check_at.write().expect("scheduler lock poisoned") =
        Some(now + inner.config.tick_interval);

    let due = inner.registry.due_sessions(now);
    if due.is_empty() {
        return 0;
    }
    debug!(due = due.len(), "Refresh pass scanning due sessions");

    let mut tasks: JoinSet<u64> = JoinSet::new();
    for entry in due {
        // At most once per entry into the refresh window
        if inner.registry.mark_expiring_notified(&entry.session_id) {
            inner.manager.events().send(SessionEvent::Expiring(
                SessionEventData {
                    session_id: entry.session_id.clone(),
                    user_id: entry.user_id.clone(),
                    occurred_at: now,
                },
            ));
        }

        let inner = Arc::clone(inner);
        tasks.spawn(async move { refresh_one(&inner, &entry).await });
    }

    let mut refreshed = 0;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(count) => refreshed += count,
            Err(e) => error!(error = %e, "Refresh task panicked"),
        }
    }
    refreshed
}

/// Refreshes a single due session; returns 1 if the backend was actually
/// called and succeeded.
async fn refresh_one(inner: &Arc<SchedulerInner>, entry: &RegistryEntry) -> u64 {
    match inner
        .manager
        .refresh_session_outcome(&entry.session_id)
        .await
    {
        Ok(RefreshOutcome::Refreshed(_)) => {
            inner.successful_refreshes.fetch_add(1, Ordering::Relaxed);
            1
        }
        Ok(RefreshOutcome::AlreadyFresh(_)) => 0,
        // The session disappeared or was revoked between the scan and the
        // refresh; expected under concurrency, drop the stale entry
        Err(SessionError::SessionNotFound { .. } | SessionError::InvalidState { .. }) => {
            debug!(
                session_id = %entry.session_id,
                "Session gone before scheduled refresh; unregistering"
            );
            inner.registry.remove(&entry.session_id);
            0
        }
        Err(e) => {
            inner.failed_refreshes.fetch_add(1, Ordering::Relaxed);
            let failures = inner.registry.record_failure(&entry.session_id);
            warn!(
                session_id = %entry.session_id,
                consecutive_failures = failures,
                error = %e,
                "Scheduled refresh failed; entry keeps its due time and is retried next tick"
            );

            if let Some(max_failures) = inner.config.revoke_after_failures {
                if failures >= max_failures {
                    warn!(
                        session_id = %entry.session_id,
                        failures,
                        "Revoking session after repeated refresh failures"
                    );
                    if let Err(revoke_err) =
                        inner.manager.revoke_session(&entry.session_id).await
                    {
                        error!(
                            session_id = %entry.session_id,
                            error = %revoke_err,
                            "Failed to revoke session after repeated refresh failures"
                        );
                    }
                }
            }
            0
        }
    }
}
