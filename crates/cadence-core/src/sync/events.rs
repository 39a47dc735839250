//! Sync session state and event types
//!
//! This module provides the aggregate view of synchronization the UI
//! consumes and the events broadcast when it changes.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SessionStatus: aggregate state machine                         │
//! │  ├── Idle: no sync run in flight                                │
//! │  ├── Syncing: draining eligible operations                      │
//! │  ├── Success: last run finished cleanly (settles to Idle)       │
//! │  └── Error: last run stopped early (settles to Idle)            │
//! │                                                                 │
//! │  SyncEvent: notifications about engine activity                 │
//! │  ├── SessionChanged: aggregate state changed                    │
//! │  ├── OperationQueued / Succeeded / Failed / Conflicted          │
//! │  └── NetworkChanged: connectivity transition                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::types::OperationId;

/// Aggregate status of the sync state machine
///
/// The machine is perpetual: `Success` and `Error` settle back to `Idle`
/// and a new trigger re-enters `Syncing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No sync run in flight
    Idle,
    /// A sync run is draining eligible operations
    Syncing,
    /// The last run processed everything without fatal error
    Success,
    /// The last run stopped early (disconnect or fatal transport failure)
    Error,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Syncing => write!(f, "syncing"),
            SessionStatus::Success => write!(f, "success"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Ephemeral aggregate sync state
///
/// Owned exclusively by the orchestrator and rebuilt from the durable queue
/// on process start; UI readers observe it via the event subscription and
/// never mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSession {
    /// Current state machine position
    pub status: SessionStatus,
    /// Count of queued operations not yet succeeded
    pub pending_count: usize,
    /// 0–100, monotonically non-decreasing within one sync run
    pub progress: u8,
    /// Why the last run ended in `Error`, if it did
    pub last_error_message: Option<String>,
    /// Unix timestamp (milliseconds) of the last successful run
    pub last_sync_time: Option<i64>,
}

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The aggregate session state changed
    SessionChanged {
        /// Snapshot of the new session state
        session: SyncSession,
    },
    /// A mutation was durably queued
    OperationQueued {
        id: OperationId,
        resource_type: String,
        resource_id: String,
    },
    /// The remote peer applied an operation
    OperationSucceeded { id: OperationId },
    /// The remote peer reported a conflict
    OperationConflicted {
        id: OperationId,
        /// Whether the operation was re-queued (stale delete) or discarded
        /// in favor of the remote state
        requeued: bool,
    },
    /// An operation failed permanently and awaits manual retry or discard
    OperationFailed { id: OperationId, reason: String },
    /// Connectivity transitioned
    NetworkChanged { online: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_default_is_idle() {
        let status: SessionStatus = Default::default();
        assert_eq!(status, SessionStatus::Idle);
    }

    #[test]
    fn test_session_status_display() {
        assert_eq!(format!("{}", SessionStatus::Idle), "idle");
        assert_eq!(format!("{}", SessionStatus::Syncing), "syncing");
        assert_eq!(format!("{}", SessionStatus::Success), "success");
        assert_eq!(format!("{}", SessionStatus::Error), "error");
    }

    #[test]
    fn test_session_default() {
        let session = SyncSession::default();
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.pending_count, 0);
        assert_eq!(session.progress, 0);
        assert!(session.last_error_message.is_none());
        assert!(session.last_sync_time.is_none());
    }
}
