//! In-memory intent backlog.
//!
//! Implements the same compare-and-set claim semantics as [`PgBacklog`]
//! behind a single mutex. Used by worker tests and local demos; state does
//! not survive the process.
//!
//! [`PgBacklog`]: crate::pg::PgBacklog

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use contentpipe_core::backlog::Backlog;
use contentpipe_core::error::BacklogError;
use contentpipe_core::intent::{state_machine, Intent, IntentStatus};
use contentpipe_core::run::WorkflowRun;
use contentpipe_core::types::{IntentId, Timestamp};

#[derive(Default)]
struct Inner {
    intents: HashMap<IntentId, Intent>,
    runs: Vec<WorkflowRun>,
}

/// Mutex-guarded backlog with the durable backlog's claim semantics.
#[derive(Default)]
pub struct MemoryBacklog {
    inner: Mutex<Inner>,
}

fn eligible(intent: &Intent, now: Timestamp) -> bool {
    match intent.status {
        IntentStatus::Pending => true,
        IntentStatus::Failed => intent.next_eligible_at.is_none_or(|at| at <= now),
        IntentStatus::Claimed => intent.lease_expires_at.is_some_and(|at| at <= now),
        IntentStatus::Succeeded | IntentStatus::Dead => false,
    }
}

impl MemoryBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an intent (the producer side, external to the worker).
    pub async fn insert(&self, intent: Intent) {
        self.inner.lock().await.intents.insert(intent.id, intent);
    }

    /// Build and seed a pending intent with defaults.
    pub async fn insert_pending(
        &self,
        name: &str,
        payload: serde_json::Value,
        queue_name: &str,
        max_attempts: i32,
    ) -> IntentId {
        let now = chrono::Utc::now();
        let intent = Intent {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            payload,
            attempt_count: 0,
            max_attempts,
            queue_name: queue_name.to_string(),
            status: IntentStatus::Pending,
            worker_id: None,
            lease_expires_at: None,
            next_eligible_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = intent.id;
        self.insert(intent).await;
        id
    }

    /// Current snapshot of one intent.
    pub async fn intent(&self, id: IntentId) -> Option<Intent> {
        self.inner.lock().await.intents.get(&id).cloned()
    }

    /// All sealed runs for an intent, in seal order.
    pub async fn runs_for(&self, id: IntentId) -> Vec<WorkflowRun> {
        self.inner
            .lock()
            .await
            .runs
            .iter()
            .filter(|r| r.intent_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Backlog for MemoryBacklog {
    async fn claimable(&self, queue_name: &str, limit: i64) -> Result<Vec<IntentId>, BacklogError> {
        let now = chrono::Utc::now();
        let inner = self.inner.lock().await;
        let mut matches: Vec<&Intent> = inner
            .intents
            .values()
            .filter(|i| i.queue_name == queue_name && eligible(i, now))
            .collect();
        matches.sort_by_key(|i| i.created_at);
        Ok(matches
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|i| i.id)
            .collect())
    }

    async fn claim(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Intent>, BacklogError> {
        let now = chrono::Utc::now();
        let mut inner = self.inner.lock().await;
        let Some(intent) = inner.intents.get_mut(&intent_id) else {
            return Ok(None);
        };
        if !eligible(intent, now) {
            return Ok(None);
        }
        intent.status = IntentStatus::Claimed;
        intent.worker_id = Some(worker_id.to_string());
        intent.lease_expires_at = Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
        intent.next_eligible_at = None;
        intent.attempt_count += 1;
        intent.updated_at = now;
        Ok(Some(intent.clone()))
    }

    async fn seal_run(&self, run: &WorkflowRun) -> Result<(), BacklogError> {
        if !run.is_sealed() {
            return Err(BacklogError::Backend("refusing to persist an unsealed run".into()));
        }
        self.inner.lock().await.runs.push(run.clone());
        Ok(())
    }

    async fn transition(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        to: IntentStatus,
        next_eligible_at: Option<Timestamp>,
    ) -> Result<bool, BacklogError> {
        let mut inner = self.inner.lock().await;
        let intent = inner
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| BacklogError::Backend(format!("unknown intent {intent_id}")))?;
        // Owner guard, same as the durable backlog: only the current
        // claim holder may record an outcome.
        if intent.status != IntentStatus::Claimed
            || intent.worker_id.as_deref() != Some(worker_id)
        {
            return Ok(false);
        }
        state_machine::validate_transition(intent.status, to).map_err(BacklogError::Backend)?;
        intent.status = to;
        intent.next_eligible_at = next_eligible_at;
        intent.lease_expires_at = None;
        intent.updated_at = chrono::Utc::now();
        Ok(true)
    }
}
