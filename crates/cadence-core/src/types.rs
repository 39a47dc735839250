//! Core types for the Cadence sync engine

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Current wall-clock time as Unix-epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Unique identifier for a queued operation
///
/// Uses ULID for time-ordered unique identifiers that sort lexicographically.
/// Ids are assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Ulid);

impl OperationId {
    /// Create a new OperationId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Convert to string representation (used as the storage key)
    pub fn to_string_repr(&self) -> String {
        self.0.to_string()
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        let ulid = Ulid::from_string(s)?;
        Ok(Self(ulid))
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op_{}", self.0)
    }
}

/// What a queued operation does to its remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Drain priority for a queued operation
///
/// Declaration order is drain order: `High` sorts before `Medium` before
/// `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Delivery state of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// Waiting for a delivery attempt
    Pending,
    /// Currently being sent to the remote peer
    InFlight,
    /// Exhausted its retry budget or permanently rejected; needs manual action
    Failed,
    /// Applied by the remote peer
    Succeeded,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::InFlight => write!(f, "in-flight"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// A durably queued local mutation awaiting delivery to the remote peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique identifier, assigned at creation
    pub id: OperationId,
    /// Type of the remote entity affected (e.g. "workout")
    pub resource_type: String,
    /// Identifier of the remote entity affected (e.g. "workout-42")
    pub resource_id: String,
    /// What the operation does to the resource
    pub kind: OperationKind,
    /// Opaque serializable data needed to replay the mutation
    pub payload: serde_json::Value,
    /// Drain priority
    pub priority: Priority,
    /// Count of delivery attempts made so far
    pub attempt: u32,
    /// Current delivery state
    pub status: OperationStatus,
    /// Unix timestamp of creation (milliseconds)
    pub created_at: i64,
    /// Unix timestamp of the last delivery attempt (milliseconds)
    pub last_attempt_at: Option<i64>,
    /// Earliest time the operation may be attempted (milliseconds)
    pub next_eligible_at: i64,
    /// Last failure reason, if any
    pub last_error: Option<String>,
    /// Remote version carried after a stale-rejected delete is re-queued
    pub remote_version: Option<String>,
}

impl PendingOperation {
    /// Create a new pending operation, eligible immediately
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        kind: OperationKind,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        let now = now_ms();
        Self {
            id: OperationId::new(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            kind,
            payload,
            priority,
            attempt: 0,
            status: OperationStatus::Pending,
            created_at: now,
            last_attempt_at: None,
            next_eligible_at: now,
            last_error: None,
            remote_version: None,
        }
    }

    /// Key identifying the remote resource this operation targets
    ///
    /// Operations sharing a resource key are never in flight concurrently.
    pub fn resource_key(&self) -> String {
        format!("{}/{}", self.resource_type, self.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_new() {
        let id1 = OperationId::new();
        let id2 = OperationId::new();
        // Should generate different IDs
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_operation_id_display() {
        let id = OperationId::new();
        let display = format!("{}", id);
        assert!(display.starts_with("op_"));
    }

    #[test]
    fn test_operation_id_string_roundtrip() {
        let id = OperationId::new();
        let encoded = id.to_string_repr();
        let decoded = OperationId::from_string(&encoded).expect("Failed to decode");
        assert_eq!(id, decoded);
    }

    #[test]
    fn test_priority_drain_order() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_operation_creation() {
        let op = PendingOperation::new(
            "workout",
            "workout-42",
            OperationKind::Update,
            serde_json::json!({"name": "Intervals"}),
            Priority::High,
        );
        assert_eq!(op.resource_type, "workout");
        assert_eq!(op.resource_id, "workout-42");
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempt, 0);
        assert!(op.last_attempt_at.is_none());
        assert!(op.last_error.is_none());
        assert_eq!(op.next_eligible_at, op.created_at);
    }

    #[test]
    fn test_resource_key() {
        let op = PendingOperation::new(
            "workout",
            "42",
            OperationKind::Create,
            serde_json::Value::Null,
            Priority::default(),
        );
        assert_eq!(op.resource_key(), "workout/42");
    }

    #[test]
    fn test_operation_serde_roundtrip() {
        let op = PendingOperation::new(
            "meal-plan",
            "7",
            OperationKind::Delete,
            serde_json::json!({"reason": "duplicate"}),
            Priority::Low,
        );
        let json = serde_json::to_vec(&op).unwrap();
        let back: PendingOperation = serde_json::from_slice(&json).unwrap();
        assert_eq!(op, back);
    }
}
