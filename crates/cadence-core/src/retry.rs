//! Retry scheduling: eligibility, drain order, and exponential backoff.
//!
//! The coordinator decides which pending operations may be attempted right
//! now and, after a failed attempt, when an operation becomes eligible
//! again. Delays grow exponentially with a jitter factor so reconnecting
//! clients don't produce synchronized retry storms.

use crate::types::{OperationStatus, PendingOperation};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Jitter bounds applied to every computed backoff delay
const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay unit for the first retry
    pub base_delay: Duration,
    /// Cap applied to the exponential term before jitter
    pub max_delay: Duration,
    /// Attempts after which an operation becomes permanently `Failed`
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

/// Decides eligibility and computes backoff for pending operations
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    config: RetryConfig,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Select the operations eligible for a delivery attempt right now.
    ///
    /// An operation is eligible iff it is `Pending`, its `next_eligible_at`
    /// has passed, and no other operation for the same resource is in
    /// flight. The result is in drain order: high priority first, oldest
    /// first within a tier.
    pub fn eligible(&self, ops: &[PendingOperation], now_ms: i64) -> Vec<PendingOperation> {
        let in_flight: HashSet<String> = ops
            .iter()
            .filter(|op| op.status == OperationStatus::InFlight)
            .map(|op| op.resource_key())
            .collect();

        let mut out: Vec<PendingOperation> = ops
            .iter()
            .filter(|op| {
                op.status == OperationStatus::Pending
                    && op.next_eligible_at <= now_ms
                    && !in_flight.contains(&op.resource_key())
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.0.cmp(&b.id.0))
        });
        out
    }

    /// Compute the jittered backoff delay after the given attempt count.
    ///
    /// `min(max_delay, base_delay * 2^attempt) * jitter`, jitter drawn
    /// uniformly from [0.8, 1.2].
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let capped_ms = base_ms
            .saturating_mul(factor)
            .min(self.config.max_delay.as_millis() as u64);
        let jitter = rand::rng().random_range(JITTER_MIN..=JITTER_MAX);
        Duration::from_millis((capped_ms as f64 * jitter) as u64)
    }

    /// Record a failed delivery attempt on the operation.
    ///
    /// The attempt count was already bumped when the attempt started; here
    /// the operation either returns to `Pending` with a new
    /// `next_eligible_at`, or transitions to `Failed` once the attempt
    /// ceiling is reached and leaves automatic scheduling for good.
    pub fn record_failure(&self, op: &mut PendingOperation, now_ms: i64, reason: &str) {
        op.last_error = Some(reason.to_string());
        if op.attempt >= self.config.max_attempts {
            op.status = OperationStatus::Failed;
            debug!(id = %op.id, attempts = op.attempt, "Operation exhausted retry budget");
        } else {
            op.status = OperationStatus::Pending;
            let delay = self.backoff_delay(op.attempt);
            op.next_eligible_at = now_ms + delay.as_millis() as i64;
            debug!(
                id = %op.id,
                attempt = op.attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduled retry"
            );
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
