//! Main SyncEngine - the primary entry point for the Cadence sync engine
//!
//! SyncEngine wires together the durable operation store, the serialized
//! access queue, the retry coordinator, the network monitor, and the sync
//! orchestrator behind the narrow API the UI and feature modules consume.
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::{EngineConfig, OperationKind, Priority, SyncEngine};
//!
//! let engine = SyncEngine::new("~/.cadence/data", transport, EngineConfig::default()).await?;
//!
//! // Queue a mutation while offline
//! engine
//!     .enqueue_operation("workout", "workout-42", OperationKind::Update,
//!         serde_json::json!({"name": "Intervals"}), None)
//!     .await?;
//!
//! // Reconnect and replay
//! engine.set_online(true);
//! let session = engine.sync_now().await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::network::NetworkMonitor;
use crate::retry::{RetryConfig, RetryCoordinator};
use crate::serializer::TaskQueue;
use crate::storage::OperationStore;
use crate::sync::{SyncEvent, SyncOrchestrator, SyncSession};
use crate::transport::Transport;
use crate::types::{now_ms, OperationId, OperationKind, OperationStatus, PendingOperation, Priority};

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry/backoff policy
    pub retry: RetryConfig,
    /// Periodic sync trigger while online with pending work; `None` disables
    pub auto_sync_interval: Option<Duration>,
    /// How long a finished session lingers before settling back to idle
    pub settle_delay: Duration,
    /// Connectivity state assumed until the platform reports otherwise
    pub initially_online: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            auto_sync_interval: Some(Duration::from_secs(30)),
            settle_delay: Duration::from_millis(500),
            initially_online: true,
        }
    }
}

/// Main entry point for the Cadence sync engine
///
/// SyncEngine manages:
/// - Durable persistence of queued operations across restarts
/// - Serialized store access (no interleaved reads/writes)
/// - Retry scheduling with exponential backoff and jitter
/// - Replay against the remote peer with conflict resolution
pub struct SyncEngine {
    store: Arc<OperationStore>,
    queue: Arc<TaskQueue>,
    monitor: NetworkMonitor,
    orchestrator: Arc<SyncOrchestrator>,
    session: Arc<RwLock<SyncSession>>,
    event_tx: broadcast::Sender<SyncEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    data_dir: PathBuf,
}

impl SyncEngine {
    /// Create a new SyncEngine with the given data directory.
    ///
    /// This will:
    /// - Create the data directory if it doesn't exist
    /// - Open the operation store, recovering any operations stranded
    ///   in flight by a crash
    /// - Rebuild the ephemeral session from the durable queue
    /// - Spawn the background triggers (reconnect listener, periodic timer)
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Io` if the directory cannot be created and
    /// `SyncError::Migration` if the stored schema is from a newer build.
    pub async fn new(
        data_dir: impl AsRef<Path>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> SyncResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        info!(?data_dir, "Initializing sync engine");

        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("cadence.redb");
        let store = Arc::new(OperationStore::new(&db_path)?);

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let queue = Arc::new(TaskQueue::new());
        let monitor = NetworkMonitor::new(config.initially_online);

        // Rebuild the ephemeral session from the durable queue
        let session = Arc::new(RwLock::new(SyncSession {
            pending_count: store.count()?,
            last_sync_time: store.last_sync_time()?,
            ..SyncSession::default()
        }));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            queue.clone(),
            RetryCoordinator::new(config.retry.clone()),
            monitor.clone(),
            transport,
            session.clone(),
            event_tx.clone(),
            config.settle_delay,
        ));

        let engine = Self {
            store,
            queue,
            monitor,
            orchestrator,
            session,
            event_tx,
            tasks: Mutex::new(Vec::new()),
            data_dir,
        };
        engine.spawn_triggers(config.auto_sync_interval);
        Ok(engine)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queueing
    // ═══════════════════════════════════════════════════════════════════════

    /// Durably queue a mutation for delivery to the remote peer.
    ///
    /// The operation is persisted before this returns; supersession replaces
    /// a still-pending operation on the same resource. `priority` defaults
    /// to medium.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` for an empty `resource_type` or
    /// `resource_id`; storage failures surface as their redb variants.
    pub async fn enqueue_operation(
        &self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        kind: OperationKind,
        payload: serde_json::Value,
        priority: Option<Priority>,
    ) -> SyncResult<OperationId> {
        let op = PendingOperation::new(
            resource_type,
            resource_id,
            kind,
            payload,
            priority.unwrap_or_default(),
        );
        let resource_type = op.resource_type.clone();
        let resource_id = op.resource_id.clone();

        let store = self.store.clone();
        let (id, count) = self
            .queue
            .enqueue(move || async move {
                let id = store.append(op)?;
                let count = store.count()?;
                Ok((id, count))
            })
            .await?;

        debug!(%id, %resource_type, %resource_id, "Queued operation");
        self.orchestrator.update_session(|s| s.pending_count = count);
        let _ = self.event_tx.send(SyncEvent::OperationQueued {
            id,
            resource_type,
            resource_id,
        });
        Ok(id)
    }

    /// Load operations awaiting delivery, in drain order.
    pub async fn list_pending(&self) -> SyncResult<Vec<PendingOperation>> {
        let store = self.store.clone();
        self.queue.enqueue(move || async move { store.list_pending() }).await
    }

    /// Load permanently failed operations awaiting manual retry or discard.
    pub async fn list_failed(&self) -> SyncResult<Vec<PendingOperation>> {
        let store = self.store.clone();
        self.queue.enqueue(move || async move { store.list_failed() }).await
    }

    /// Load a single operation by id.
    pub async fn get_operation(&self, id: OperationId) -> SyncResult<Option<PendingOperation>> {
        let store = self.store.clone();
        self.queue.enqueue(move || async move { store.get(&id) }).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Failed-operation management
    // ═══════════════════════════════════════════════════════════════════════

    /// Discard a permanently failed operation.
    ///
    /// Queued mutations are never dropped silently; this is the explicit
    /// user/caller action that releases one.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::OperationNotFound` for an unknown id and
    /// `SyncError::Validation` if the operation has not failed.
    pub async fn discard_failed(&self, id: OperationId) -> SyncResult<()> {
        let store = self.store.clone();
        let count = self
            .queue
            .enqueue(move || async move {
                let op = store
                    .get(&id)?
                    .ok_or_else(|| SyncError::OperationNotFound(id.to_string()))?;
                if op.status != OperationStatus::Failed {
                    return Err(SyncError::Validation(format!(
                        "operation {} is {}, only failed operations can be discarded",
                        id, op.status
                    )));
                }
                store.remove(&id)?;
                store.count()
            })
            .await?;

        info!(%id, "Discarded failed operation");
        self.orchestrator.update_session(|s| s.pending_count = count);
        Ok(())
    }

    /// Return a permanently failed operation to the queue with a fresh
    /// retry budget, eligible immediately.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::OperationNotFound` for an unknown id and
    /// `SyncError::Validation` if the operation has not failed.
    pub async fn retry_failed(&self, id: OperationId) -> SyncResult<()> {
        let store = self.store.clone();
        self.queue
            .enqueue(move || async move {
                let mut op = store
                    .get(&id)?
                    .ok_or_else(|| SyncError::OperationNotFound(id.to_string()))?;
                if op.status != OperationStatus::Failed {
                    return Err(SyncError::Validation(format!(
                        "operation {} is {}, only failed operations can be retried",
                        id, op.status
                    )));
                }
                op.status = OperationStatus::Pending;
                op.attempt = 0;
                op.next_eligible_at = now_ms();
                store.update(&op)
            })
            .await?;

        info!(%id, "Failed operation returned to the queue");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Run a sync pass now, or join the pass already in flight.
    pub async fn sync_now(&self) -> SyncResult<SyncSession> {
        self.orchestrator.sync_now().await
    }

    /// Snapshot of the aggregate session state
    pub fn session(&self) -> SyncSession {
        self.session.read().clone()
    }

    /// Count of queued operations not yet succeeded
    pub fn pending_count(&self) -> usize {
        self.session.read().pending_count
    }

    /// Subscribe to engine events (session changes, per-operation outcomes,
    /// connectivity transitions).
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connectivity
    // ═══════════════════════════════════════════════════════════════════════

    /// Feed a connectivity transition into the engine.
    ///
    /// An offline→online transition triggers a sync pass.
    pub fn set_online(&self, online: bool) {
        self.monitor.set_online(online);
    }

    /// Current connectivity state
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop the background triggers.
    ///
    /// Queued operations stay durable; a new engine instance picks them up.
    pub fn shutdown(&self) {
        info!("Shutting down sync engine");
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Spawn the reconnect listener and the periodic timer
    fn spawn_triggers(&self, auto_sync_interval: Option<Duration>) {
        let orchestrator = self.orchestrator.clone();
        let monitor = self.monitor.clone();
        let event_tx = self.event_tx.clone();
        let session = self.session.clone();

        let handle = tokio::spawn(async move {
            let mut online_rx = monitor.subscribe();
            let mut was_online = *online_rx.borrow_and_update();
            let mut ticker = auto_sync_interval.map(tokio::time::interval);
            if let Some(t) = ticker.as_mut() {
                // The first tick of a tokio interval fires immediately
                t.tick().await;
            }
            loop {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        let _ = event_tx.send(SyncEvent::NetworkChanged { online });
                        if online && !was_online {
                            debug!("Reconnected; triggering sync");
                            if let Err(err) = orchestrator.sync_now().await {
                                warn!(error = %err, "Reconnect-triggered sync failed");
                            }
                        }
                        was_online = online;
                    }
                    _ = tick(&mut ticker) => {
                        let has_pending = session.read().pending_count > 0;
                        if monitor.is_online() && has_pending {
                            debug!("Timer tick; triggering sync");
                            if let Err(err) = orchestrator.sync_now().await {
                                warn!(error = %err, "Timer-triggered sync failed");
                            }
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Await the next periodic tick, or forever when the timer is disabled
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
