//! Sync orchestration layer
//!
//! ## Overview
//!
//! The sync module owns the aggregate state machine for the offline queue:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncOrchestrator (run loop)                                    │
//! │  ├── drains eligible operations from the retry coordinator      │
//! │  ├── sends each through the injected Transport                  │
//! │  ├── applies Conflict Resolver verdicts                         │
//! │  └── publishes SyncSession snapshots as SyncEvents              │
//! │                                                                 │
//! │  Session machine: Idle → Syncing → Success | Error → Idle       │
//! │  (perpetual; re-enters Syncing on the next trigger)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Triggers are an explicit `sync_now()`, an offline→online transition from
//! the network monitor, or the engine's periodic timer while online with
//! pending work.

pub mod events;
pub(crate) mod orchestrator;

pub use events::{SessionStatus, SyncEvent, SyncSession};
pub(crate) use orchestrator::SyncOrchestrator;
