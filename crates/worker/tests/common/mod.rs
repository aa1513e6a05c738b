//! Shared fakes for worker integration tests: a scriptable content store
//! and canned processing functions. No network, no database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use contentpipe_core::backlog::Backlog;
use contentpipe_core::error::{BacklogError, ProcessingError, StoreError};
use contentpipe_core::intent::{Intent, IntentStatus};
use contentpipe_core::processing::{ProcessedOutput, ProcessingFunction};
use contentpipe_core::run::WorkflowRun;
use contentpipe_core::store::ContentStore;
use contentpipe_core::types::{IntentId, Timestamp};
use contentpipe_db::MemoryBacklog;

/// One recorded `upload_derived` call.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub parent_id: String,
    pub derivation_type: String,
    pub variant: String,
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// In-memory content store. Downloads serve seeded blobs; uploads are
/// recorded and answered with sequential derived ids. Failures can be
/// scripted per call and are consumed in order.
#[derive(Default)]
pub struct FakeStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    download_failures: Mutex<VecDeque<StoreError>>,
    upload_failures: Mutex<VecDeque<StoreError>>,
    uploads: Mutex<Vec<UploadRecord>>,
    upload_seq: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, content_id: &str, data: &[u8]) -> Self {
        self.blobs
            .lock()
            .unwrap()
            .insert(content_id.to_string(), data.to_vec());
        self
    }

    /// Queue a failure for the next download call.
    pub fn fail_next_download(&self, err: StoreError) {
        self.download_failures.lock().unwrap().push_back(err);
    }

    /// Queue a failure for the next upload call.
    pub fn fail_next_upload(&self, err: StoreError) {
        self.upload_failures.lock().unwrap().push_back(err);
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentStore for FakeStore {
    async fn download(&self, content_id: &str) -> Result<Vec<u8>, StoreError> {
        if let Some(err) = self.download_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.blobs
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(content_id.to_string()))
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
        if let Some(err) = self.upload_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.uploads.lock().unwrap().push(UploadRecord {
            parent_id: parent_id.to_string(),
            derivation_type: derivation_type.to_string(),
            variant: variant.to_string(),
            data,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        });
        let seq = self.upload_seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("derived-{}", 789 + seq))
    }
}

fn canned_output(input: &[u8]) -> ProcessedOutput {
    ProcessedOutput {
        metrics: serde_json::json!({ "input_len": input.len() }),
        item_count: 1,
        derived_bytes: input.to_vec(),
        content_type: "application/octet-stream".to_string(),
        filename: "out.bin".to_string(),
        derivation_type: "echo".to_string(),
        variant: "echo_v1".to_string(),
    }
}

/// Succeeds immediately, echoing the input bytes back as the derived
/// artifact.
pub struct EchoFunction;

#[async_trait]
impl ProcessingFunction for EchoFunction {
    async fn process(
        &self,
        input: &[u8],
        _metadata: &serde_json::Value,
    ) -> Result<ProcessedOutput, ProcessingError> {
        Ok(canned_output(input))
    }
}

/// Fails every call with a processing error.
pub struct AlwaysFailFunction;

#[async_trait]
impl ProcessingFunction for AlwaysFailFunction {
    async fn process(
        &self,
        _input: &[u8],
        _metadata: &serde_json::Value,
    ) -> Result<ProcessedOutput, ProcessingError> {
        Err(ProcessingError("simulated model failure".to_string()))
    }
}

/// Backlog wrapper whose first `seal_failures` seal attempts fail,
/// simulating a backlog-store outage at the worst moment. All other
/// operations delegate to the wrapped in-memory backlog.
pub struct FlakySealBacklog {
    inner: Arc<MemoryBacklog>,
    seal_failures: AtomicUsize,
}

impl FlakySealBacklog {
    pub fn new(inner: Arc<MemoryBacklog>, seal_failures: usize) -> Self {
        Self {
            inner,
            seal_failures: AtomicUsize::new(seal_failures),
        }
    }
}

#[async_trait]
impl Backlog for FlakySealBacklog {
    async fn claimable(&self, queue_name: &str, limit: i64) -> Result<Vec<IntentId>, BacklogError> {
        self.inner.claimable(queue_name, limit).await
    }

    async fn claim(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Intent>, BacklogError> {
        self.inner.claim(intent_id, worker_id, lease).await
    }

    async fn seal_run(&self, run: &WorkflowRun) -> Result<(), BacklogError> {
        if self.seal_failures.load(Ordering::SeqCst) > 0 {
            self.seal_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(BacklogError::Backend("run store unavailable".to_string()));
        }
        self.inner.seal_run(run).await
    }

    async fn transition(
        &self,
        intent_id: IntentId,
        worker_id: &str,
        to: IntentStatus,
        next_eligible_at: Option<Timestamp>,
    ) -> Result<bool, BacklogError> {
        self.inner
            .transition(intent_id, worker_id, to, next_eligible_at)
            .await
    }
}

/// Tracks how many calls run concurrently, holding each call open long
/// enough for overlap to be observable.
pub struct GaugedFunction {
    current: AtomicUsize,
    pub max_seen: Arc<AtomicUsize>,
    hold: Duration,
}

impl GaugedFunction {
    pub fn new(hold: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen: Arc::new(AtomicUsize::new(0)),
            hold,
        }
    }
}

#[async_trait]
impl ProcessingFunction for GaugedFunction {
    async fn process(
        &self,
        input: &[u8],
        _metadata: &serde_json::Value,
    ) -> Result<ProcessedOutput, ProcessingError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(canned_output(input))
    }
}
