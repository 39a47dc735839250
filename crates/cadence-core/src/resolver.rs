//! Conflict resolution for replayed operations.
//!
//! Once the device is back online the remote peer is authoritative:
//! last-writer-wins conflicts resolve in its favor. The resolver inspects
//! the peer's verdict for one operation and decides how the queue entry is
//! finalized.

use crate::transport::PeerResult;
use crate::types::{OperationKind, PendingOperation};

/// Decision for a replayed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Peer applied the operation; remove it from the store
    Completed,
    /// Local mutation discarded in favor of the newer remote state
    DiscardedStale { remote_version: String },
    /// Stale delete: retry once against the peer's current version
    RequeueWithRemoteVersion { remote_version: String },
    /// Transient failure; apply retry backoff
    Retry { reason: String },
    /// Permanent rejection; fail without consuming retry budget
    Reject { reason: String },
}

/// Decide the outcome of one replayed operation from the peer's verdict.
pub fn resolve(op: &PendingOperation, result: &PeerResult) -> Resolution {
    match result {
        PeerResult::Accepted => Resolution::Completed,
        PeerResult::RejectedStale { remote_version } => {
            if op.kind == OperationKind::Delete && op.remote_version.is_none() {
                // First stale verdict on a delete: fetch the peer's version
                // and try the delete once more against it
                Resolution::RequeueWithRemoteVersion {
                    remote_version: remote_version.clone(),
                }
            } else {
                Resolution::DiscardedStale {
                    remote_version: remote_version.clone(),
                }
            }
        }
        PeerResult::RejectedTransient { reason } => Resolution::Retry {
            reason: reason.clone(),
        },
        PeerResult::RejectedInvalid { reason } => Resolution::Reject {
            reason: reason.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn op(kind: OperationKind) -> PendingOperation {
        PendingOperation::new(
            "workout",
            "1",
            kind,
            serde_json::Value::Null,
            Priority::default(),
        )
    }

    #[test]
    fn test_accepted_completes() {
        let resolution = resolve(&op(OperationKind::Update), &PeerResult::Accepted);
        assert_eq!(resolution, Resolution::Completed);
    }

    #[test]
    fn test_stale_update_is_discarded_in_favor_of_remote() {
        let resolution = resolve(
            &op(OperationKind::Update),
            &PeerResult::RejectedStale {
                remote_version: "v7".to_string(),
            },
        );
        assert_eq!(
            resolution,
            Resolution::DiscardedStale {
                remote_version: "v7".to_string()
            }
        );
    }

    #[test]
    fn test_stale_create_is_discarded_in_favor_of_remote() {
        let resolution = resolve(
            &op(OperationKind::Create),
            &PeerResult::RejectedStale {
                remote_version: "v2".to_string(),
            },
        );
        assert!(matches!(resolution, Resolution::DiscardedStale { .. }));
    }

    #[test]
    fn test_stale_delete_requeues_once_with_remote_version() {
        let resolution = resolve(
            &op(OperationKind::Delete),
            &PeerResult::RejectedStale {
                remote_version: "v3".to_string(),
            },
        );
        assert_eq!(
            resolution,
            Resolution::RequeueWithRemoteVersion {
                remote_version: "v3".to_string()
            }
        );
    }

    #[test]
    fn test_second_stale_delete_yields_to_remote() {
        let mut delete = op(OperationKind::Delete);
        delete.remote_version = Some("v3".to_string());

        let resolution = resolve(
            &delete,
            &PeerResult::RejectedStale {
                remote_version: "v4".to_string(),
            },
        );
        assert_eq!(
            resolution,
            Resolution::DiscardedStale {
                remote_version: "v4".to_string()
            }
        );
    }

    #[test]
    fn test_transient_rejection_retries() {
        let resolution = resolve(
            &op(OperationKind::Update),
            &PeerResult::RejectedTransient {
                reason: "503".to_string(),
            },
        );
        assert_eq!(
            resolution,
            Resolution::Retry {
                reason: "503".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_rejection_fails_permanently() {
        let resolution = resolve(
            &op(OperationKind::Create),
            &PeerResult::RejectedInvalid {
                reason: "unknown field".to_string(),
            },
        );
        assert_eq!(
            resolution,
            Resolution::Reject {
                reason: "unknown field".to_string()
            }
        );
    }
}
