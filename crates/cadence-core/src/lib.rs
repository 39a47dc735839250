//! Cadence Core Library
//!
//! Offline-first synchronization engine for a single user's device queue.
//!
//! ## Overview
//!
//! Cadence lets an application keep working while disconnected: mutations
//! are durably queued on disk, replayed in order once connectivity returns,
//! retried with exponential backoff, and reconciled against the remote peer
//! as the authoritative source of truth (last-writer-wins per resource).
//!
//! ## Core Principles
//!
//! - **Offline-first**: every mutation is persisted before anything else
//! - **Single local writer**: this is a device queue, not a CRDT — the
//!   remote peer wins conflicts once the device is back online
//! - **Narrow seams**: the backend is reached only through an injected
//!   [`Transport`], so the whole engine runs against a fake in tests
//!
//! ## Quick Start
//!
//! ```ignore
//! use cadence_core::{EngineConfig, OperationKind, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SyncEngine::new("~/.cadence/data", transport, EngineConfig::default()).await?;
//!
//!     // Queue mutations; they survive restarts
//!     engine
//!         .enqueue_operation("workout", "workout-42", OperationKind::Update,
//!             serde_json::json!({"name": "Intervals"}), None)
//!         .await?;
//!
//!     // Replay once online
//!     let session = engine.sync_now().await?;
//!     println!("{} operations still pending", session.pending_count);
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod network;
pub mod resolver;
pub mod retry;
pub mod serializer;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod types;

// Re-exports
pub use engine::{EngineConfig, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use network::NetworkMonitor;
pub use resolver::Resolution;
pub use retry::{RetryConfig, RetryCoordinator};
pub use serializer::TaskQueue;
pub use storage::OperationStore;
pub use sync::{SessionStatus, SyncEvent, SyncSession};
pub use transport::{PeerResult, Transport};
pub use types::*;
