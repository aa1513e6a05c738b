//! The external content-store seam.

use async_trait::async_trait;

use crate::error::StoreError;

/// Remote binary artifact storage.
///
/// Downloads fetch a stored artifact; uploads create a *derived* artifact
/// tagged with a derivation type and variant under a parent. Upload is not
/// idempotent: calling it twice creates two derived artifacts, so callers
/// must upload at most once per successful attempt and accept at-least-once
/// delivery across retries.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the named artifact's bytes.
    async fn download(&self, content_id: &str) -> Result<Vec<u8>, StoreError>;

    /// Store a new artifact derived from `parent_id`. Returns the new
    /// artifact's id, assigned by the store.
    async fn upload_derived(
        &self,
        parent_id: &str,
        derivation_type: &str,
        variant: &str,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;
}
