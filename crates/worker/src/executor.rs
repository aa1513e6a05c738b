//! Executes one claimed intent to completion.
//!
//! One job is: extract the source artifact reference, download it, invoke
//! the capability, upload the derived output, and seal a run record. Every
//! failure is caught and classified; `run` never returns an error, so one
//! bad intent can never take down the poll loop.

use std::sync::Arc;
use std::time::Instant;

use contentpipe_core::error::{ExecutionFailure, FailureKind};
use contentpipe_core::intent::Intent;
use contentpipe_core::processing::{ProcessedOutput, ProcessingFunction};
use contentpipe_core::run::WorkflowRun;
use contentpipe_core::store::ContentStore;

/// Composes the content store and a processing function into one job.
pub struct Executor {
    store: Arc<dyn ContentStore>,
    worker_id: String,
}

impl Executor {
    pub fn new(store: Arc<dyn ContentStore>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
        }
    }

    /// Execute one attempt of `intent` with the dispatched capability.
    ///
    /// Always returns a sealed run: success with a result payload, or a
    /// failure carrying its retryability classification.
    pub async fn run(&self, intent: &Intent, capability: Arc<dyn ProcessingFunction>) -> WorkflowRun {
        let run = WorkflowRun::begin(intent, &self.worker_id);
        match self.attempt(intent, capability).await {
            Ok(result_payload) => {
                tracing::info!(
                    intent_id = %intent.id,
                    attempt = intent.attempt_count,
                    "Intent executed successfully",
                );
                run.seal_success(result_payload)
            }
            Err(failure) => {
                tracing::warn!(
                    intent_id = %intent.id,
                    attempt = intent.attempt_count,
                    kind = ?failure.kind,
                    retryable = failure.retryable(),
                    error = %failure.message,
                    "Intent execution failed",
                );
                run.seal_failure(&failure)
            }
        }
    }

    /// The download → transform → upload sequence, with per-step
    /// classification.
    async fn attempt(
        &self,
        intent: &Intent,
        capability: Arc<dyn ProcessingFunction>,
    ) -> Result<serde_json::Value, ExecutionFailure> {
        let content_id = intent.content_id().ok_or_else(|| {
            ExecutionFailure::new(
                FailureKind::MalformedPayload,
                format!("payload is missing required key {:?}", Intent::CONTENT_ID_KEY),
            )
        })?;

        let input = self
            .store
            .download(content_id)
            .await
            .map_err(ExecutionFailure::from_store)?;
        tracing::debug!(intent_id = %intent.id, content_id, size = input.len(), "Input downloaded");

        let metadata = intent.metadata();
        let started = Instant::now();
        let mut output = capability
            .process(&input, &metadata)
            .await
            .map_err(|e| ExecutionFailure::new(FailureKind::Processing, e.to_string()))?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        // Upload at most once per attempt; the store assigns a fresh id for
        // every upload, so re-running a failed attempt may leave a duplicate
        // derived artifact behind. Bounded cost, not a correctness issue.
        // The derived bytes move into the upload; only the metrics fields
        // of the output are needed afterwards.
        let derived_bytes = std::mem::take(&mut output.derived_bytes);
        let derived_id = self
            .store
            .upload_derived(
                content_id,
                &output.derivation_type,
                &output.variant,
                derived_bytes,
                &output.filename,
                &output.content_type,
            )
            .await
            .map_err(ExecutionFailure::from_store)?;

        Ok(result_payload(&output, &derived_id, processing_time_ms))
    }
}

/// Fold the capability's metrics together with the executor's own fields
/// into the run's result payload.
fn result_payload(
    output: &ProcessedOutput,
    derived_id: &str,
    processing_time_ms: u64,
) -> serde_json::Value {
    let mut payload = match &output.metrics {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    payload.insert("derived_id".into(), derived_id.into());
    payload.insert("item_count".into(), output.item_count.into());
    payload.insert("processing_time_ms".into(), processing_time_ms.into());
    serde_json::Value::Object(payload)
}
