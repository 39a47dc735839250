//! Sync run loop: drains eligible operations and applies peer verdicts.
//!
//! The orchestrator owns the session state machine. On a trigger it drains
//! the operations the retry coordinator deems eligible, sends each through
//! the transport, hands the verdict to the conflict resolver, and advances
//! aggregate progress. At most one run is in flight; callers arriving while
//! a run is active join it and receive its eventual result.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{SessionStatus, SyncEvent, SyncSession};
use crate::error::SyncResult;
use crate::network::NetworkMonitor;
use crate::resolver::{self, Resolution};
use crate::retry::RetryCoordinator;
use crate::serializer::TaskQueue;
use crate::storage::OperationStore;
use crate::transport::Transport;
use crate::types::{now_ms, OperationId, OperationStatus, PendingOperation};

/// Reason recorded when a run stops because connectivity dropped
const DISCONNECTED: &str = "disconnected";

pub(crate) struct SyncOrchestrator {
    store: Arc<OperationStore>,
    queue: Arc<TaskQueue>,
    retry: RetryCoordinator,
    monitor: NetworkMonitor,
    transport: Arc<dyn Transport>,
    session: Arc<RwLock<SyncSession>>,
    event_tx: broadcast::Sender<SyncEvent>,
    run_gate: tokio::sync::Mutex<()>,
    settle_delay: Duration,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<OperationStore>,
        queue: Arc<TaskQueue>,
        retry: RetryCoordinator,
        monitor: NetworkMonitor,
        transport: Arc<dyn Transport>,
        session: Arc<RwLock<SyncSession>>,
        event_tx: broadcast::Sender<SyncEvent>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            retry,
            monitor,
            transport,
            session,
            event_tx,
            run_gate: tokio::sync::Mutex::new(()),
            settle_delay,
        }
    }

    /// Mutate the session state and broadcast the new snapshot
    pub(crate) fn update_session(&self, f: impl FnOnce(&mut SyncSession)) {
        {
            let mut session = self.session.write();
            f(&mut session);
        }
        let snapshot = self.session.read().clone();
        let _ = self.event_tx.send(SyncEvent::SessionChanged { session: snapshot });
    }

    /// Run a sync pass, or join the pass already in flight.
    ///
    /// Re-entrant calls while a run is active do not start a second run;
    /// they wait for the active run and return its resulting session.
    pub(crate) async fn sync_now(&self) -> SyncResult<SyncSession> {
        match self.run_gate.try_lock() {
            Ok(_guard) => self.run().await,
            Err(_) => {
                debug!("Sync already in flight; joining the active run");
                let _guard = self.run_gate.lock().await;
                Ok(self.session.read().clone())
            }
        }
    }

    async fn run(&self) -> SyncResult<SyncSession> {
        match self.run_inner().await {
            Ok(session) => Ok(session),
            Err(err) => {
                // Engine-internal failure (storage, queue); the state machine
                // still has to leave Syncing before the error propagates
                self.update_session(|s| {
                    s.status = SessionStatus::Error;
                    s.last_error_message = Some(err.to_string());
                });
                self.schedule_settle();
                Err(err)
            }
        }
    }

    async fn run_inner(&self) -> SyncResult<SyncSession> {
        if !self.monitor.is_online() {
            warn!("Sync requested while offline");
            return self.finish_with_error(DISCONNECTED).await;
        }

        self.update_session(|s| {
            s.status = SessionStatus::Syncing;
            s.progress = 0;
            s.last_error_message = None;
        });

        let store = self.store.clone();
        let ops = self.queue.enqueue(move || async move { store.list_all() }).await?;
        let eligible = self.retry.eligible(&ops, now_ms());
        let total = eligible.len();
        debug!(total, "Draining eligible operations");

        let mut processed = 0usize;
        for mut op in eligible {
            // Connectivity is checked before every send; a drop mid-run
            // stops after the current in-flight operation and leaves the
            // remainder pending, not failed
            if !self.monitor.is_online() {
                warn!(processed, total, "Connectivity lost mid-run; stopping sync");
                return self.finish_with_error(DISCONNECTED).await;
            }

            op.status = OperationStatus::InFlight;
            op.attempt += 1;
            op.last_attempt_at = Some(now_ms());
            self.persist(&op).await?;

            let verdict = self.transport.send(&op).await;
            let now = now_ms();
            match verdict {
                Err(err) => {
                    // Not attributable to this one operation: give the
                    // attempt back and abort the run
                    op.status = OperationStatus::Pending;
                    op.attempt = op.attempt.saturating_sub(1);
                    self.persist(&op).await?;
                    warn!(error = %err, "Sync run aborted by transport failure");
                    return self.finish_with_error(&err.to_string()).await;
                }
                Ok(result) => {
                    let resolution = resolver::resolve(&op, &result);
                    self.apply_resolution(&mut op, resolution, now).await?;
                }
            }

            processed += 1;
            let progress = ((processed * 100) / total.max(1)) as u8;
            self.update_session(|s| s.progress = s.progress.max(progress));
        }

        let remaining = self.refresh_pending_count().await?;
        let finished_at = now_ms();
        let store = self.store.clone();
        self.queue
            .enqueue(move || async move { store.set_last_sync_time(finished_at) })
            .await?;

        self.update_session(|s| {
            s.status = SessionStatus::Success;
            s.progress = 100;
            s.last_sync_time = Some(finished_at);
        });
        info!(processed, remaining, "Sync run completed");
        self.schedule_settle();
        Ok(self.session.read().clone())
    }

    /// Apply the resolver's decision to the queue entry
    async fn apply_resolution(
        &self,
        op: &mut PendingOperation,
        resolution: Resolution,
        now: i64,
    ) -> SyncResult<()> {
        match resolution {
            Resolution::Completed => {
                op.status = OperationStatus::Succeeded;
                self.remove(op.id).await?;
                debug!(id = %op.id, resource = %op.resource_key(), "Operation succeeded");
                let _ = self.event_tx.send(SyncEvent::OperationSucceeded { id: op.id });
            }
            Resolution::DiscardedStale { remote_version } => {
                self.remove(op.id).await?;
                debug!(
                    id = %op.id,
                    resource = %op.resource_key(),
                    %remote_version,
                    "Local mutation discarded in favor of remote state"
                );
                let _ = self.event_tx.send(SyncEvent::OperationConflicted {
                    id: op.id,
                    requeued: false,
                });
            }
            Resolution::RequeueWithRemoteVersion { remote_version } => {
                op.status = OperationStatus::Pending;
                op.remote_version = Some(remote_version);
                op.next_eligible_at = now;
                self.persist(op).await?;
                debug!(id = %op.id, "Stale delete re-queued against current remote version");
                let _ = self.event_tx.send(SyncEvent::OperationConflicted {
                    id: op.id,
                    requeued: true,
                });
            }
            Resolution::Retry { reason } => {
                self.retry.record_failure(op, now, &reason);
                self.persist(op).await?;
                if op.status == OperationStatus::Failed {
                    let _ = self.event_tx.send(SyncEvent::OperationFailed {
                        id: op.id,
                        reason,
                    });
                }
            }
            Resolution::Reject { reason } => {
                op.status = OperationStatus::Failed;
                op.last_error = Some(reason.clone());
                self.persist(op).await?;
                warn!(id = %op.id, %reason, "Operation permanently rejected");
                let _ = self.event_tx.send(SyncEvent::OperationFailed { id: op.id, reason });
            }
        }
        Ok(())
    }

    /// End the run in `Error`, refresh counts, and schedule the settle
    async fn finish_with_error(&self, reason: &str) -> SyncResult<SyncSession> {
        let remaining = self.refresh_pending_count().await?;
        self.update_session(|s| {
            s.status = SessionStatus::Error;
            s.pending_count = remaining;
            s.last_error_message = Some(reason.to_string());
        });
        self.schedule_settle();
        Ok(self.session.read().clone())
    }

    /// Recompute `pending_count` from the durable queue
    async fn refresh_pending_count(&self) -> SyncResult<usize> {
        let store = self.store.clone();
        let count = self.queue.enqueue(move || async move { store.count() }).await?;
        self.update_session(|s| s.pending_count = count);
        Ok(count)
    }

    async fn persist(&self, op: &PendingOperation) -> SyncResult<()> {
        let store = self.store.clone();
        let op = op.clone();
        self.queue.enqueue(move || async move { store.update(&op) }).await
    }

    async fn remove(&self, id: OperationId) -> SyncResult<()> {
        let store = self.store.clone();
        self.queue.enqueue(move || async move { store.remove(&id) }).await
    }

    /// After a short settle period, return a finished session to `Idle`
    fn schedule_settle(&self) {
        let session = self.session.clone();
        let event_tx = self.event_tx.clone();
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let settled = {
                let mut s = session.write();
                if matches!(s.status, SessionStatus::Success | SessionStatus::Error) {
                    s.status = SessionStatus::Idle;
                    true
                } else {
                    false
                }
            };
            if settled {
                let snapshot = session.read().clone();
                let _ = event_tx.send(SyncEvent::SessionChanged { session: snapshot });
            }
        });
    }
}
