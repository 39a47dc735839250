//! Error types for the Cadence sync engine

use thiserror::Error;

/// Main error type for Cadence engine operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Operation failed validation and was never queued
    #[error("Invalid operation: {0}")]
    Validation(String),

    /// Operation was not found in the durable store
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored schema is newer than this build understands; records are
    /// preserved on disk and never discarded
    #[error("Schema version {found} is not supported (max {supported})")]
    Migration { found: u32, supported: u32 },

    /// Transport failure not attributable to a single operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store access queue has shut down
    #[error("Task queue closed")]
    QueueClosed,

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
