//! Workflow run records.
//!
//! A [`WorkflowRun`] is the immutable record of one execution attempt.
//! It is created when an intent is claimed and sealed exactly once when the
//! attempt finishes; the backlog persists only sealed runs.

use serde::{Deserialize, Serialize};

use crate::error::ExecutionFailure;
use crate::intent::Intent;
use crate::types::{IntentId, Timestamp};

/// Outcome of a sealed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

/// The record of one execution attempt of an intent.
///
/// Multiple runs may exist per intent across retries; `attempt` ties each
/// run to the claim that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: uuid::Uuid,
    pub intent_id: IntentId,
    pub worker_id: String,
    /// Value of `attempt_count` at claim time.
    pub attempt: i32,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub outcome: Option<RunOutcome>,
    /// Opaque result on success (derived artifact id, metrics, timing).
    pub result_payload: Option<serde_json::Value>,
    /// Serialized [`ExecutionFailure`] on failure.
    pub error_detail: Option<serde_json::Value>,
}

impl WorkflowRun {
    /// Open a run for a freshly claimed intent.
    pub fn begin(intent: &Intent, worker_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            intent_id: intent.id,
            worker_id: worker_id.to_string(),
            attempt: intent.attempt_count,
            started_at: chrono::Utc::now(),
            finished_at: None,
            outcome: None,
            result_payload: None,
            error_detail: None,
        }
    }

    /// Seal the run as successful. A sealed run is never mutated again.
    pub fn seal_success(mut self, result_payload: serde_json::Value) -> Self {
        self.finished_at = Some(chrono::Utc::now());
        self.outcome = Some(RunOutcome::Success);
        self.result_payload = Some(result_payload);
        self
    }

    /// Seal the run as failed, embedding the classified failure so the
    /// poller can read retryability back out of the persisted record.
    pub fn seal_failure(mut self, failure: &ExecutionFailure) -> Self {
        self.finished_at = Some(chrono::Utc::now());
        self.outcome = Some(RunOutcome::Failure);
        self.error_detail = serde_json::to_value(failure).ok();
        self
    }

    /// Whether the run has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Deserialize the classified failure, if this run failed.
    pub fn failure(&self) -> Option<ExecutionFailure> {
        self.error_detail
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::intent::IntentStatus;

    fn intent() -> Intent {
        let now = chrono::Utc::now();
        Intent {
            id: uuid::Uuid::new_v4(),
            name: "content.ocr.v1".into(),
            payload: serde_json::json!({ "content_id": "abc123" }),
            attempt_count: 2,
            max_attempts: 3,
            queue_name: "default".into(),
            status: IntentStatus::Claimed,
            worker_id: Some("worker-1".into()),
            lease_expires_at: None,
            next_eligible_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn begin_captures_attempt_and_owner() {
        let run = WorkflowRun::begin(&intent(), "worker-1");
        assert_eq!(run.attempt, 2);
        assert_eq!(run.worker_id, "worker-1");
        assert!(!run.is_sealed());
        assert!(run.outcome.is_none());
    }

    #[test]
    fn seal_success_records_payload() {
        let run = WorkflowRun::begin(&intent(), "worker-1")
            .seal_success(serde_json::json!({ "derived_id": "derived-789" }));
        assert!(run.is_sealed());
        assert_eq!(run.outcome, Some(RunOutcome::Success));
        assert_eq!(run.result_payload.unwrap()["derived_id"], "derived-789");
        assert!(run.error_detail.is_none());
    }

    #[test]
    fn seal_failure_round_trips_classification() {
        let failure = ExecutionFailure::new(FailureKind::Transient, "503");
        let run = WorkflowRun::begin(&intent(), "worker-1").seal_failure(&failure);
        assert!(run.is_sealed());
        assert_eq!(run.outcome, Some(RunOutcome::Failure));
        let back = run.failure().unwrap();
        assert_eq!(back.kind, FailureKind::Transient);
        assert!(back.retryable());
    }
}
