//! Transport boundary to the remote peer.
//!
//! The engine reaches the backend through a single injected [`Transport`];
//! nothing else in the core talks to the network. This keeps the whole
//! engine testable without a real server.

use crate::error::SyncResult;
use crate::types::PendingOperation;
use futures::future::BoxFuture;

/// Outcome reported by the remote peer for a replayed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResult {
    /// Peer applied the operation as sent
    Accepted,
    /// Peer's copy of the resource is newer; carries the peer's version
    RejectedStale { remote_version: String },
    /// Network/server hiccup; worth retrying with backoff
    RejectedTransient { reason: String },
    /// Payload permanently malformed; retrying cannot help
    RejectedInvalid { reason: String },
}

/// Pluggable delivery channel to the remote peer.
///
/// Implementations map their own timeouts and per-request trouble to
/// `Ok(PeerResult::RejectedTransient { .. })`. Returning `Err` means the
/// failure is not attributable to the single operation (authentication,
/// protocol breakage) and aborts the whole sync run.
pub trait Transport: Send + Sync {
    /// Deliver one operation to the remote peer and report its verdict
    fn send<'a>(&'a self, op: &'a PendingOperation) -> BoxFuture<'a, SyncResult<PeerResult>>;
}
