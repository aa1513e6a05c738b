//! Intent record and lifecycle state machine.
//!
//! An intent is a persisted request to execute one named capability. The
//! backlog is the single source of truth for its state; this module defines
//! the record shape and the legal transitions so every backlog
//! implementation enforces the same lifecycle.

use serde::{Deserialize, Serialize};

use crate::types::{IntentId, Timestamp};

/// Status ID type matching SMALLINT in the backlog table.
pub type StatusId = i16;

/// Intent lifecycle status. Discriminants match the seed data order
/// (1-based) in the `intent_statuses` table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Waiting to be claimed.
    Pending = 1,
    /// Owned by exactly one worker under a lease.
    Claimed = 2,
    /// Executed to completion. Terminal.
    Succeeded = 3,
    /// Failed retryably; claimable again once `next_eligible_at` passes.
    Failed = 4,
    /// Failed terminally or exhausted its attempts. Terminal.
    Dead = 5,
}

impl IntentStatus {
    /// Return the backlog status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Parse a status ID back into the enum.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(IntentStatus::Pending),
            2 => Some(IntentStatus::Claimed),
            3 => Some(IntentStatus::Succeeded),
            4 => Some(IntentStatus::Failed),
            5 => Some(IntentStatus::Dead),
            _ => None,
        }
    }
}

impl From<IntentStatus> for StatusId {
    fn from(value: IntentStatus) -> Self {
        value as StatusId
    }
}

/// A unit of requested work, as stored in the backlog.
///
/// `id`, `name`, `payload`, `max_attempts`, and `queue_name` are assigned by
/// the producer and immutable; the remaining fields are backlog bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    /// Capability name, e.g. `content.thumbnail.v1`. Selects the executor.
    pub name: String,
    /// Workflow-specific input. Must contain a `content_id` reference to
    /// the source artifact.
    pub payload: serde_json::Value,
    /// Number of claims so far. Incremented atomically on each claim.
    pub attempt_count: i32,
    /// Ceiling after which the intent is terminally dead.
    pub max_attempts: i32,
    /// Logical lane bounded by the worker's concurrency limiter.
    pub queue_name: String,
    pub status: IntentStatus,
    /// Identity of the worker currently holding the claim, if any.
    pub worker_id: Option<String>,
    /// When the current claim's lease expires. An unsealed claim past this
    /// instant is abandoned and reclaimable.
    pub lease_expires_at: Option<Timestamp>,
    /// Earliest instant a failed intent becomes claimable again.
    pub next_eligible_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Intent {
    /// Required payload key referencing the source artifact.
    pub const CONTENT_ID_KEY: &'static str = "content_id";

    /// Extract the source artifact reference from the payload.
    pub fn content_id(&self) -> Option<&str> {
        self.payload
            .get(Self::CONTENT_ID_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Optional per-intent metadata object passed to the capability.
    pub fn metadata(&self) -> serde_json::Value {
        self.payload
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    }

    /// Whether the claim that produced this snapshot pushed the attempt
    /// count past the configured ceiling.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count > self.max_attempts
    }
}

/// Legal lifecycle transitions, shared by all backlog implementations.
pub mod state_machine {
    use super::IntentStatus;

    /// Returns the set of statuses reachable from `from`.
    ///
    /// `Claimed -> Claimed` encodes lease-expiry reclaim: an abandoned
    /// claim is taken over by a new owner without passing through Pending.
    /// Terminal states (Succeeded, Dead) return an empty slice.
    pub fn valid_transitions(from: IntentStatus) -> &'static [IntentStatus] {
        use IntentStatus::*;
        match from {
            Pending => &[Claimed],
            Claimed => &[Succeeded, Failed, Dead, Claimed],
            Failed => &[Claimed, Dead],
            Succeeded | Dead => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: IntentStatus, to: IntentStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning a descriptive error for invalid ones.
    pub fn validate_transition(from: IntentStatus, to: IntentStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from:?} -> {to:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    fn intent_with_payload(payload: serde_json::Value) -> Intent {
        let now = chrono::Utc::now();
        Intent {
            id: uuid::Uuid::new_v4(),
            name: "content.thumbnail.v1".into(),
            payload,
            attempt_count: 0,
            max_attempts: 3,
            queue_name: "default".into(),
            status: IntentStatus::Pending,
            worker_id: None,
            lease_expires_at: None,
            next_eligible_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_claimed() {
        assert!(can_transition(IntentStatus::Pending, IntentStatus::Claimed));
    }

    #[test]
    fn claimed_to_succeeded() {
        assert!(can_transition(IntentStatus::Claimed, IntentStatus::Succeeded));
    }

    #[test]
    fn claimed_to_failed() {
        assert!(can_transition(IntentStatus::Claimed, IntentStatus::Failed));
    }

    #[test]
    fn claimed_to_dead() {
        assert!(can_transition(IntentStatus::Claimed, IntentStatus::Dead));
    }

    #[test]
    fn expired_claim_is_reclaimable() {
        assert!(can_transition(IntentStatus::Claimed, IntentStatus::Claimed));
    }

    #[test]
    fn failed_to_claimed_after_backoff() {
        assert!(can_transition(IntentStatus::Failed, IntentStatus::Claimed));
    }

    #[test]
    fn failed_to_dead() {
        assert!(can_transition(IntentStatus::Failed, IntentStatus::Dead));
    }

    // -----------------------------------------------------------------------
    // Terminal states have no outgoing transitions
    // -----------------------------------------------------------------------

    #[test]
    fn succeeded_has_no_transitions() {
        assert!(valid_transitions(IntentStatus::Succeeded).is_empty());
    }

    #[test]
    fn dead_has_no_transitions() {
        assert!(valid_transitions(IntentStatus::Dead).is_empty());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_succeeded_invalid() {
        assert!(!can_transition(IntentStatus::Pending, IntentStatus::Succeeded));
    }

    #[test]
    fn dead_to_claimed_invalid() {
        assert!(!can_transition(IntentStatus::Dead, IntentStatus::Claimed));
    }

    #[test]
    fn succeeded_to_failed_invalid() {
        assert!(!can_transition(IntentStatus::Succeeded, IntentStatus::Failed));
    }

    #[test]
    fn validate_transition_err_is_descriptive() {
        let err = validate_transition(IntentStatus::Dead, IntentStatus::Claimed).unwrap_err();
        assert!(err.contains("Dead"));
        assert!(err.contains("Claimed"));
    }

    // -----------------------------------------------------------------------
    // Status ID round trip
    // -----------------------------------------------------------------------

    #[test]
    fn status_id_round_trip() {
        for status in [
            IntentStatus::Pending,
            IntentStatus::Claimed,
            IntentStatus::Succeeded,
            IntentStatus::Failed,
            IntentStatus::Dead,
        ] {
            assert_eq!(IntentStatus::from_id(status.id()), Some(status));
        }
    }

    #[test]
    fn unknown_status_id_rejected() {
        assert_eq!(IntentStatus::from_id(99), None);
    }

    // -----------------------------------------------------------------------
    // Payload accessors
    // -----------------------------------------------------------------------

    #[test]
    fn content_id_extracted() {
        let intent = intent_with_payload(serde_json::json!({ "content_id": "abc123" }));
        assert_eq!(intent.content_id(), Some("abc123"));
    }

    #[test]
    fn missing_content_id_is_none() {
        let intent = intent_with_payload(serde_json::json!({ "other": 1 }));
        assert_eq!(intent.content_id(), None);
    }

    #[test]
    fn blank_content_id_is_none() {
        let intent = intent_with_payload(serde_json::json!({ "content_id": "" }));
        assert_eq!(intent.content_id(), None);
    }

    #[test]
    fn metadata_defaults_to_empty_object() {
        let intent = intent_with_payload(serde_json::json!({ "content_id": "abc" }));
        assert_eq!(intent.metadata(), serde_json::json!({}));
    }

    #[test]
    fn attempts_exhausted_past_ceiling() {
        let mut intent = intent_with_payload(serde_json::json!({}));
        intent.attempt_count = 4;
        assert!(intent.attempts_exhausted());
        intent.attempt_count = 3;
        assert!(!intent.attempts_exhausted());
    }
}
