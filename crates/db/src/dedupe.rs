//! Duplicate-submission tracking.
//!
//! Producers may submit the same source artifact more than once (two intake
//! paths feed the same backlog). The tracker upserts a per-artifact counter
//! so operators can see duplicates; it never gates admission.

use sqlx::PgPool;

use contentpipe_core::error::BacklogError;

/// Tracks repeated submissions keyed by source artifact id.
pub struct DedupeTracker;

impl DedupeTracker {
    /// Record one submission and return the total seen count.
    pub async fn record(
        pool: &PgPool,
        content_id: &str,
        pipeline: &str,
        pipeline_version: i32,
    ) -> Result<i32, BacklogError> {
        sqlx::query_scalar::<_, i32>(
            "INSERT INTO process_dedupe \
                 (content_id, pipeline, pipeline_version, first_seen_at, last_seen_at, seen_count) \
             VALUES ($1, $2, $3, NOW(), NOW(), 1) \
             ON CONFLICT (content_id) DO UPDATE \
             SET last_seen_at = NOW(), \
                 seen_count = process_dedupe.seen_count + 1, \
                 pipeline = EXCLUDED.pipeline, \
                 pipeline_version = EXCLUDED.pipeline_version \
             RETURNING seen_count",
        )
        .bind(content_id)
        .bind(pipeline)
        .bind(pipeline_version)
        .fetch_one(pool)
        .await
        .map_err(|e| BacklogError::Backend(e.to_string()))
    }

    /// Seen count for a source artifact, zero if never submitted.
    pub async fn seen_count(pool: &PgPool, content_id: &str) -> Result<i32, BacklogError> {
        let count = sqlx::query_scalar::<_, i32>(
            "SELECT seen_count FROM process_dedupe WHERE content_id = $1",
        )
        .bind(content_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| BacklogError::Backend(e.to_string()))?;
        Ok(count.unwrap_or(0))
    }
}
