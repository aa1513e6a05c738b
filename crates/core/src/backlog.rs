//! The durable intent backlog seam.
//!
//! The backlog is the single source of truth shared by all workers. This
//! core only requires four atomic operations from it; everything else
//! (schema, producers, operator queries) is the backing store's concern.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BacklogError;
use crate::intent::{Intent, IntentStatus};
use crate::run::WorkflowRun;
use crate::types::{IntentId, Timestamp};

/// Atomic operations a durable intent backlog must provide.
///
/// Implementations must make [`claim`](Backlog::claim) and
/// [`transition`](Backlog::transition) compare-and-sets on
/// state + owner + lease: under concurrent claimers exactly one wins, and a
/// worker that lost its lease cannot write back an outcome. That is the
/// entire single-owner invariant of the system.
#[async_trait]
pub trait Backlog: Send + Sync {
    /// Enumerate intents currently eligible for claiming on a queue:
    /// pending, failed past their backoff deadline, or claimed with an
    /// expired lease (abandoned by a crashed worker).
    async fn claimable(&self, queue_name: &str, limit: i64) -> Result<Vec<IntentId>, BacklogError>;

    /// Atomically claim one intent for `worker_id` with a lease.
    ///
    /// Succeeds only if the intent is currently eligible; increments
    /// `attempt_count` as part of the same atomic update. Returns `None`
    /// when another claimer won the race.
    async fn claim(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Intent>, BacklogError>;

    /// Persist one sealed run record. Sealed runs are immutable.
    async fn seal_run(&self, run: &WorkflowRun) -> Result<(), BacklogError>;

    /// Record the intent's post-run state. `next_eligible_at` carries the
    /// backoff deadline for retryable failures and is `None` otherwise.
    ///
    /// Guarded on ownership: applies only while the intent is still
    /// claimed by `worker_id`. Returns `Ok(false)` when the guard fails
    /// (the lease expired and another worker reclaimed the intent); the
    /// caller must drop its outcome rather than clobber the live claim.
    async fn transition(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        to: IntentStatus,
        next_eligible_at: Option<Timestamp>,
    ) -> Result<bool, BacklogError>;
}
