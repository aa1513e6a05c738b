//! Postgres-backed intent backlog.
//!
//! All claim/transition operations are single conditional UPDATEs so the
//! single-owner invariant holds under any number of concurrent worker
//! processes. Run records are insert-only.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};

use contentpipe_core::backlog::Backlog;
use contentpipe_core::error::BacklogError;
use contentpipe_core::intent::{Intent, IntentStatus, StatusId};
use contentpipe_core::run::{RunOutcome, WorkflowRun};
use contentpipe_core::types::{IntentId, Timestamp};

use crate::dedupe::DedupeTracker;

/// Column list for `intents` queries.
const COLUMNS: &str = "\
    id, name, payload, attempt_count, max_attempts, queue_name, \
    status_id, worker_id, lease_expires_at, next_eligible_at, \
    created_at, updated_at";

/// Eligibility predicate shared by `claimable` and `claim`: pending, failed
/// past its backoff deadline, or claimed with an expired lease.
const ELIGIBLE: &str = "\
    (status_id = 1 \
     OR (status_id = 4 AND next_eligible_at <= NOW()) \
     OR (status_id = 2 AND lease_expires_at <= NOW()))";

/// DTO for producer submissions.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub name: String,
    pub payload: serde_json::Value,
    pub queue_name: String,
    pub max_attempts: i32,
}

/// A row from the `intents` table, converted into the domain type after
/// fetching (core carries no sqlx dependency).
#[derive(FromRow)]
struct IntentRow {
    id: IntentId,
    name: String,
    payload: serde_json::Value,
    attempt_count: i32,
    max_attempts: i32,
    queue_name: String,
    status_id: StatusId,
    worker_id: Option<String>,
    lease_expires_at: Option<Timestamp>,
    next_eligible_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl IntentRow {
    fn into_intent(self) -> Result<Intent, BacklogError> {
        let status = IntentStatus::from_id(self.status_id).ok_or_else(|| {
            BacklogError::Backend(format!("unknown intent status id {}", self.status_id))
        })?;
        Ok(Intent {
            id: self.id,
            name: self.name,
            payload: self.payload,
            attempt_count: self.attempt_count,
            max_attempts: self.max_attempts,
            queue_name: self.queue_name,
            status,
            worker_id: self.worker_id,
            lease_expires_at: self.lease_expires_at,
            next_eligible_at: self.next_eligible_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> BacklogError {
    BacklogError::Backend(e.to_string())
}

/// Durable backlog on a shared Postgres database.
#[derive(Clone)]
pub struct PgBacklog {
    pool: PgPool,
}

impl PgBacklog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<(), BacklogError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BacklogError::Backend(e.to_string()))
    }

    /// Insert a new pending intent and record its submission in the dedupe
    /// tracker. Duplicate submissions for the same source artifact are
    /// logged, not rejected.
    pub async fn submit(&self, input: &NewIntent) -> Result<Intent, BacklogError> {
        let query = format!(
            "INSERT INTO intents (id, name, payload, max_attempts, queue_name) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, IntentRow>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(&input.name)
            .bind(&input.payload)
            .bind(input.max_attempts)
            .bind(&input.queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let intent = row.into_intent()?;

        if let Some(content_id) = intent.content_id() {
            let seen = DedupeTracker::record(&self.pool, content_id, &intent.name, 1).await?;
            if seen > 1 {
                tracing::warn!(
                    intent_id = %intent.id,
                    content_id,
                    seen_count = seen,
                    "Duplicate submission for source artifact",
                );
            }
        }

        Ok(intent)
    }

    /// Fetch one intent by id (operator inspection).
    pub async fn find_by_id(&self, id: IntentId) -> Result<Option<Intent>, BacklogError> {
        let query = format!("SELECT {COLUMNS} FROM intents WHERE id = $1");
        let row = sqlx::query_as::<_, IntentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(IntentRow::into_intent).transpose()
    }

    /// All sealed runs for an intent, oldest first (operator inspection).
    pub async fn runs_for_intent(&self, id: IntentId) -> Result<Vec<WorkflowRun>, BacklogError> {
        let rows = sqlx::query(
            "SELECT id, intent_id, worker_id, attempt, started_at, finished_at, \
                    outcome, result_payload, error_detail \
             FROM workflow_runs WHERE intent_id = $1 ORDER BY attempt ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(run_from_row).collect()
    }
}

fn run_from_row(row: PgRow) -> Result<WorkflowRun, BacklogError> {
    let outcome: String = row.try_get("outcome").map_err(db_err)?;
    let outcome = match outcome.as_str() {
        "success" => RunOutcome::Success,
        "failure" => RunOutcome::Failure,
        other => {
            return Err(BacklogError::Backend(format!("unknown run outcome {other:?}")));
        }
    };
    Ok(WorkflowRun {
        id: row.try_get("id").map_err(db_err)?,
        intent_id: row.try_get("intent_id").map_err(db_err)?,
        worker_id: row.try_get("worker_id").map_err(db_err)?,
        attempt: row.try_get("attempt").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        finished_at: row.try_get("finished_at").map_err(db_err)?,
        outcome: Some(outcome),
        result_payload: row.try_get("result_payload").map_err(db_err)?,
        error_detail: row.try_get("error_detail").map_err(db_err)?,
    })
}

#[async_trait]
impl Backlog for PgBacklog {
    async fn claimable(&self, queue_name: &str, limit: i64) -> Result<Vec<IntentId>, BacklogError> {
        let query = format!(
            "SELECT id FROM intents \
             WHERE queue_name = $1 AND {ELIGIBLE} \
             ORDER BY created_at ASC \
             LIMIT $2"
        );
        sqlx::query_scalar::<_, IntentId>(&query)
            .bind(queue_name)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn claim(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Intent>, BacklogError> {
        let query = format!(
            "UPDATE intents \
             SET status_id = $2, worker_id = $3, \
                 lease_expires_at = NOW() + make_interval(secs => $4), \
                 attempt_count = attempt_count + 1, updated_at = NOW() \
             WHERE id = $1 AND {ELIGIBLE} \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, IntentRow>(&query)
            .bind(intent_id)
            .bind(IntentStatus::Claimed.id())
            .bind(worker_id)
            .bind(lease.as_secs_f64())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(IntentRow::into_intent).transpose()
    }

    async fn seal_run(&self, run: &WorkflowRun) -> Result<(), BacklogError> {
        if !run.is_sealed() {
            return Err(BacklogError::Backend("refusing to persist an unsealed run".into()));
        }
        let outcome = match run.outcome {
            Some(RunOutcome::Success) => "success",
            Some(RunOutcome::Failure) | None => "failure",
        };
        sqlx::query(
            "INSERT INTO workflow_runs \
                 (id, intent_id, worker_id, attempt, started_at, finished_at, \
                  outcome, result_payload, error_detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(run.id)
        .bind(run.intent_id)
        .bind(&run.worker_id)
        .bind(run.attempt)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(outcome)
        .bind(&run.result_payload)
        .bind(&run.error_detail)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn transition(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        to: IntentStatus,
        next_eligible_at: Option<Timestamp>,
    ) -> Result<bool, BacklogError> {
        // Owner guard: a stale worker whose claim was reclaimed after lease
        // expiry matches zero rows and must not overwrite the live claim.
        let result = sqlx::query(
            "UPDATE intents \
             SET status_id = $3, next_eligible_at = $4, \
                 lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $5 AND worker_id = $2",
        )
        .bind(intent_id)
        .bind(worker_id)
        .bind(to.id())
        .bind(next_eligible_at)
        .bind(IntentStatus::Claimed.id())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
