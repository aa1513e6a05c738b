//! The processing-function seam.
//!
//! A capability is the opaque transformation at the center of a workflow:
//! bytes and metadata in, derived bytes and metrics out. Capabilities
//! perform no I/O of their own; downloading input and uploading output is
//! the executor's responsibility.

use async_trait::async_trait;

use crate::error::ProcessingError;

/// Output of one processing-function invocation.
#[derive(Debug, Clone)]
pub struct ProcessedOutput {
    /// Capability-specific metrics folded into the run's result payload
    /// (e.g. text block count, average confidence, output dimensions).
    pub metrics: serde_json::Value,
    /// Count metric for the run record (objects detected, blocks read, ...).
    pub item_count: i64,
    /// Bytes of the derived artifact to upload.
    pub derived_bytes: Vec<u8>,
    /// MIME type of the derived artifact.
    pub content_type: String,
    /// Filename for the multipart upload.
    pub filename: String,
    /// Derivation type tag, e.g. `thumbnail` or `ocr_text`.
    pub derivation_type: String,
    /// Variant discriminator used for later retrieval/versioning,
    /// e.g. `thumbnail_v1`.
    pub variant: String,
}

/// A named transformation registered with the worker.
///
/// Implementations may be CPU-bound and long-running. Any error is treated
/// as retryable by the executor.
#[async_trait]
pub trait ProcessingFunction: Send + Sync {
    /// Transform the downloaded input bytes using the intent's metadata.
    async fn process(
        &self,
        input: &[u8],
        metadata: &serde_json::Value,
    ) -> Result<ProcessedOutput, ProcessingError>;
}

impl std::fmt::Debug for dyn ProcessingFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessingFunction")
    }
}
