//! HTTP client for the external content service.
//!
//! Wraps the content service's download and derived-upload endpoints using
//! [`reqwest`], mapping every outcome onto the three-way store
//! classification: missing artifact, retryable transport/server fault, or
//! fatal (malformed) response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use contentpipe_core::error::StoreError;
use contentpipe_core::store::ContentStore;

/// Deadline applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Content-store client over the service's HTTP API.
///
/// Holds a pooled [`reqwest::Client`]; no other local state.
pub struct HttpContentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentStore {
    /// Create a client for the service at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across components).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success status code onto the store classification.
fn classify_status(status: StatusCode, body: &str) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(format!("content service returned 404: {body}"))
    } else if status.is_server_error() {
        StoreError::Transient(format!("content service returned {status}: {body}"))
    } else {
        StoreError::Fatal(format!("content service returned {status}: {body}"))
    }
}

/// Map a transport-level failure. Timeouts and connection faults are
/// transient; anything else is fatal.
fn classify_request_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() {
        StoreError::Transient(format!("content service unreachable: {err}"))
    } else {
        StoreError::Fatal(format!("content service request failed: {err}"))
    }
}

/// Extract the new artifact id from an upload response body: either a
/// top-level `id` or one nested under `data.id`.
fn extract_derived_id(body: &serde_json::Value) -> Result<String, StoreError> {
    let id = body
        .get("id")
        .or_else(|| body.get("data").and_then(|d| d.get("id")))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    match id {
        Some(id) => Ok(id.to_string()),
        None => Err(StoreError::Fatal(format!("no id in upload response: {body}"))),
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn download(&self, content_id: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/api/v1/contents/{content_id}/download", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Transient(format!("failed reading download body: {e}")))?;

        tracing::debug!(content_id, size = bytes.len(), "Downloaded source content");
        Ok(bytes.to_vec())
    }

    async fn upload_derived(
        &self,
        parent_id: &str,
        derivation_type: &str,
        variant: &str,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let url = format!("{}/api/v1/contents/{parent_id}/derived", self.base_url);

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| StoreError::Fatal(format!("invalid content type {content_type:?}: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("derivation_type", derivation_type.to_string())
            .text("variant", variant.to_string())
            .part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StoreError::Fatal(format!("malformed upload response: {e}")))?;
        let derived_id = extract_derived_id(&body)?;

        tracing::debug!(
            parent_id,
            derived_id = %derived_id,
            derivation_type,
            variant,
            "Derived content written",
        );
        Ok(derived_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- status classification ------------------------------------------------

    #[test]
    fn status_404_is_not_found() {
        assert_matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            StoreError::NotFound(_)
        );
    }

    #[test]
    fn status_5xx_is_transient() {
        assert_matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            StoreError::Transient(_)
        );
        assert_matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            StoreError::Transient(_)
        );
    }

    #[test]
    fn status_4xx_other_than_404_is_fatal() {
        assert_matches!(
            classify_status(StatusCode::BAD_REQUEST, ""),
            StoreError::Fatal(_)
        );
        assert_matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            StoreError::Fatal(_)
        );
    }

    #[test]
    fn status_error_carries_body() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream died");
        assert!(err.to_string().contains("upstream died"));
    }

    // -- upload response parsing ----------------------------------------------

    #[test]
    fn derived_id_at_top_level() {
        let body = serde_json::json!({ "id": "derived-789" });
        assert_eq!(extract_derived_id(&body).unwrap(), "derived-789");
    }

    #[test]
    fn derived_id_nested_under_data() {
        let body = serde_json::json!({ "data": { "id": "derived-789" } });
        assert_eq!(extract_derived_id(&body).unwrap(), "derived-789");
    }

    #[test]
    fn top_level_id_wins_over_nested() {
        let body = serde_json::json!({ "id": "outer", "data": { "id": "inner" } });
        assert_eq!(extract_derived_id(&body).unwrap(), "outer");
    }

    #[test]
    fn missing_id_is_fatal() {
        let body = serde_json::json!({ "status": "ok" });
        assert_matches!(extract_derived_id(&body), Err(StoreError::Fatal(_)));
    }

    #[test]
    fn empty_id_is_fatal() {
        let body = serde_json::json!({ "id": "" });
        assert_matches!(extract_derived_id(&body), Err(StoreError::Fatal(_)));
    }

    #[test]
    fn non_string_id_is_fatal() {
        let body = serde_json::json!({ "id": 42 });
        assert_matches!(extract_derived_id(&body), Err(StoreError::Fatal(_)));
    }

    // -- construction ---------------------------------------------------------

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = HttpContentStore::new("http://localhost:8080/").unwrap();
        assert_eq!(store.base_url(), "http://localhost:8080");
    }
}
