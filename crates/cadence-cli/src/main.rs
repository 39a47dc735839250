//! Cadence CLI
//!
//! Thin wrapper around cadence-core for inspecting and exercising a local
//! offline sync queue from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Show aggregate sync status
//! cadence status
//!
//! # Queue a mutation
//! cadence queue add workout workout-42 update --payload '{"name":"Intervals"}' --priority high
//!
//! # List queued operations in drain order
//! cadence queue list
//!
//! # List permanently failed operations
//! cadence queue failed
//!
//! # Show one operation
//! cadence queue show <operation_id>
//!
//! # Discard or retry a failed operation
//! cadence queue discard <operation_id>
//! cadence queue retry <operation_id>
//!
//! # Run one sync pass against a loopback peer (for local drills)
//! cadence drain --outcome accept
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::BoxFuture;

use cadence_core::{
    EngineConfig, OperationId, OperationKind, PeerResult, PendingOperation, Priority, SyncEngine,
    SyncResult, Transport,
};

/// Cadence - offline-first sync queue
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = "0.1.0")]
#[command(about = "Cadence - offline-first sync queue")]
#[command(
    long_about = "Inspect and exercise the durable offline queue of the Cadence sync engine: list pending and failed operations, queue new mutations, and run local sync drills against a loopback peer."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.cadence/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show aggregate sync status
    Status,

    /// Queue management
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Run one sync pass against a loopback peer
    Drain {
        /// Verdict the loopback peer returns for every operation
        #[arg(short, long, value_enum, default_value = "accept")]
        outcome: DrainOutcome,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Queue a mutation
    Add {
        /// Type of the remote entity (e.g. "workout")
        resource_type: String,
        /// Identifier of the remote entity (e.g. "workout-42")
        resource_id: String,
        /// Operation kind: create, update, or delete
        kind: String,
        /// JSON payload replayed against the remote peer
        #[arg(short, long, default_value = "{}")]
        payload: String,
        /// Drain priority: high, medium, or low
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// List queued operations in drain order
    List,
    /// List permanently failed operations
    Failed,
    /// Show one operation
    Show {
        /// Operation ID (ULID string)
        operation_id: String,
    },
    /// Discard a permanently failed operation
    Discard {
        /// Operation ID (ULID string)
        operation_id: String,
    },
    /// Return a failed operation to the queue with a fresh retry budget
    Retry {
        /// Operation ID (ULID string)
        operation_id: String,
    },
}

/// Verdict the loopback peer returns during a drain drill
#[derive(Clone, Copy, ValueEnum)]
enum DrainOutcome {
    /// Apply every operation
    Accept,
    /// Report every operation stale (conflict drill)
    Stale,
    /// Report a transient server error (backoff drill)
    Transient,
    /// Report every payload malformed (failure drill)
    Invalid,
}

/// Loopback transport used by `drain`; answers every send with one fixed
/// verdict so queue behavior can be exercised without a backend
struct LoopbackPeer {
    outcome: DrainOutcome,
}

impl Transport for LoopbackPeer {
    fn send<'a>(&'a self, _op: &'a PendingOperation) -> BoxFuture<'a, SyncResult<PeerResult>> {
        let result = match self.outcome {
            DrainOutcome::Accept => PeerResult::Accepted,
            DrainOutcome::Stale => PeerResult::RejectedStale {
                remote_version: "loopback".to_string(),
            },
            DrainOutcome::Transient => PeerResult::RejectedTransient {
                reason: "loopback transient".to_string(),
            },
            DrainOutcome::Invalid => PeerResult::RejectedInvalid {
                reason: "loopback invalid".to_string(),
            },
        };
        Box::pin(async move { Ok(result) })
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.cadence/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cadence")
        .join("data")
}

/// Parse an operation ID from a ULID string
fn parse_operation_id(s: &str) -> Result<OperationId> {
    OperationId::from_string(s).map_err(|e| anyhow::anyhow!("Invalid operation ID '{}': {}", s, e))
}

/// Parse an operation kind from string
fn parse_kind(s: &str) -> Result<OperationKind> {
    match s.to_lowercase().as_str() {
        "create" => Ok(OperationKind::Create),
        "update" => Ok(OperationKind::Update),
        "delete" => Ok(OperationKind::Delete),
        _ => anyhow::bail!("Invalid kind '{}'. Must be one of: create, update, delete", s),
    }
}

/// Parse a priority from string
fn parse_priority(s: &str) -> Result<Priority> {
    match s.to_lowercase().as_str() {
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        _ => anyhow::bail!("Invalid priority '{}'. Must be one of: high, medium, low", s),
    }
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_operation(op: &PendingOperation) {
    println!("Operation {}", op.id);
    println!("  Resource: {}/{}", op.resource_type, op.resource_id);
    println!("  Kind:     {}", op.kind);
    println!("  Priority: {}", op.priority);
    println!("  Status:   {}", op.status);
    println!("  Attempts: {}", op.attempt);
    println!("  Created:  {}", format_timestamp(op.created_at));
    if let Some(last_attempt) = op.last_attempt_at {
        println!("  Last try: {}", format_timestamp(last_attempt));
    }
    if op.next_eligible_at > op.created_at {
        println!("  Eligible: {}", format_timestamp(op.next_eligible_at));
    }
    if let Some(remote_version) = &op.remote_version {
        println!("  Remote:   {}", remote_version);
    }
    if let Some(error) = &op.last_error {
        println!("  Error:    {}", error);
    }
    println!("  Payload:  {}", op.payload);
}

fn print_operation_row(op: &PendingOperation) {
    println!(
        "{}  {:8}  {:6}  {:10}  {}/{}",
        op.id.to_string_repr(),
        op.priority.to_string(),
        op.kind.to_string(),
        op.status.to_string(),
        op.resource_type,
        op.resource_id
    );
}

async fn open_engine(data_dir: PathBuf, outcome: DrainOutcome) -> Result<SyncEngine> {
    let transport = Arc::new(LoopbackPeer { outcome });
    let config = EngineConfig {
        // One-shot process: background triggers stay off
        auto_sync_interval: None,
        settle_delay: Duration::from_millis(0),
        ..EngineConfig::default()
    };
    Ok(SyncEngine::new(&data_dir, transport, config).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Status => {
            let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
            let session = engine.session();
            let failed = engine.list_failed().await?;

            println!("Cadence sync queue");
            println!();
            println!("Status:   {}", session.status);
            println!("Pending:  {}", session.pending_count);
            println!("Failed:   {}", failed.len());
            match session.last_sync_time {
                Some(ts) => println!("Last sync: {}", format_timestamp(ts)),
                None => println!("Last sync: never"),
            }
        }

        Commands::Queue { action } => match action {
            QueueAction::Add {
                resource_type,
                resource_id,
                kind,
                payload,
                priority,
            } => {
                let kind = parse_kind(&kind)?;
                let priority = parse_priority(&priority)?;
                let payload: serde_json::Value = serde_json::from_str(&payload)
                    .map_err(|e| anyhow::anyhow!("Invalid payload JSON: {}", e))?;

                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                let id = engine
                    .enqueue_operation(resource_type, resource_id, kind, payload, Some(priority))
                    .await?;
                println!("Queued {}", id);
                println!("{} operations pending", engine.pending_count());
            }
            QueueAction::List => {
                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                let pending = engine.list_pending().await?;
                if pending.is_empty() {
                    println!("Queue is empty");
                } else {
                    for op in &pending {
                        print_operation_row(op);
                    }
                    println!();
                    println!("{} operations pending", pending.len());
                }
            }
            QueueAction::Failed => {
                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                let failed = engine.list_failed().await?;
                if failed.is_empty() {
                    println!("No failed operations");
                } else {
                    for op in &failed {
                        print_operation_row(op);
                    }
                    println!();
                    println!("{} failed operations (retry or discard them by id)", failed.len());
                }
            }
            QueueAction::Show { operation_id } => {
                let id = parse_operation_id(&operation_id)?;
                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                match engine.get_operation(id).await? {
                    Some(op) => print_operation(&op),
                    None => println!("Operation {} not found", operation_id),
                }
            }
            QueueAction::Discard { operation_id } => {
                let id = parse_operation_id(&operation_id)?;
                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                engine.discard_failed(id).await?;
                println!("Discarded {}", operation_id);
            }
            QueueAction::Retry { operation_id } => {
                let id = parse_operation_id(&operation_id)?;
                let engine = open_engine(data_dir, DrainOutcome::Accept).await?;
                engine.retry_failed(id).await?;
                println!("Re-queued {}", operation_id);
            }
        },

        Commands::Drain { outcome } => {
            let engine = open_engine(data_dir, outcome).await?;
            let before = engine.pending_count();
            let session = engine.sync_now().await?;

            println!("Sync pass finished: {}", session.status);
            println!("  Before: {} pending", before);
            println!("  After:  {} pending", session.pending_count);
            if let Some(error) = &session.last_error_message {
                println!("  Error:  {}", error);
            }
            let failed = engine.list_failed().await?;
            if !failed.is_empty() {
                println!("  Failed: {} (see `cadence queue failed`)", failed.len());
            }
        }
    }

    Ok(())
}
