//! Intent polling loop.
//!
//! A single long-lived task that ticks at the poll interval, claims
//! eligible intents for this worker up to each queue's concurrency bound,
//! and spawns one tracked task per claimed attempt. The tick is the only
//! suspension point between work items; execution never blocks the loop
//! from claiming more work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use contentpipe_core::backlog::Backlog;
use contentpipe_core::backoff::BackoffPolicy;
use contentpipe_core::error::{ExecutionFailure, FailureKind};
use contentpipe_core::intent::{Intent, IntentStatus};
use contentpipe_core::run::{RunOutcome, WorkflowRun};
use contentpipe_core::types::Timestamp;

use crate::config::WorkerConfig;
use crate::executor::Executor;
use crate::limiter::QueueLimiter;
use crate::registry::CapabilityRegistry;

/// Poller tunables, detached from the full worker config so tests can
/// build them directly.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Identity recorded as the claim owner.
    pub worker_id: String,
    /// Queue names polled each tick.
    pub queues: Vec<String>,
    /// Idle delay between poll ticks.
    pub poll_interval: Duration,
    /// Lease granted with each claim.
    pub lease: Duration,
    /// Max claimable ids fetched per queue per tick.
    pub claim_batch_size: i64,
    /// Backoff applied to retryable failures.
    pub backoff: BackoffPolicy,
}

impl From<&WorkerConfig> for PollerConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            queues: config.poll_queues(),
            poll_interval: config.poll_interval,
            lease: config.lease,
            claim_batch_size: config.claim_batch_size,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Claims intents from the backlog and drives them to a terminal or
/// retryable state.
pub struct IntentPoller {
    backlog: Arc<dyn Backlog>,
    registry: Arc<CapabilityRegistry>,
    executor: Arc<Executor>,
    limiter: Arc<QueueLimiter>,
    config: PollerConfig,
    tracker: TaskTracker,
}

impl IntentPoller {
    pub fn new(
        backlog: Arc<dyn Backlog>,
        registry: Arc<CapabilityRegistry>,
        executor: Arc<Executor>,
        limiter: Arc<QueueLimiter>,
        config: PollerConfig,
    ) -> Self {
        Self {
            backlog,
            registry,
            executor,
            limiter,
            config,
            tracker: TaskTracker::new(),
        }
    }

    /// Run the poll loop until the cancellation token is triggered, then
    /// drain in-flight attempts before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            worker_id = %self.config.worker_id,
            queues = ?self.config.queues,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Intent poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Intent poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        // Stop accepting claims, let in-flight attempts finish.
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Intent poller drained");
    }

    /// One poll cycle: claim up to the concurrency bound on every queue.
    /// An error on one queue never stops service to the others.
    pub async fn poll_once(&self) {
        for queue in &self.config.queues {
            if let Err(e) = self.poll_queue(queue).await {
                tracing::error!(queue, error = %e, "Poll cycle failed for queue");
            }
        }
    }

    async fn poll_queue(&self, queue: &str) -> Result<(), contentpipe_core::error::BacklogError> {
        if self.limiter.available(queue) == 0 {
            // Queue at its bound; defer claiming until a slot frees.
            return Ok(());
        }

        let ids = self
            .backlog
            .claimable(queue, self.config.claim_batch_size)
            .await?;

        for id in ids {
            // Take the slot before the claim so a successful claim is
            // always dispatchable within the bound.
            let Some(permit) = self.limiter.try_acquire(queue) else {
                break;
            };
            match self
                .backlog
                .claim(id, &self.config.worker_id, self.config.lease)
                .await?
            {
                Some(intent) => {
                    tracing::info!(
                        intent_id = %intent.id,
                        name = %intent.name,
                        queue,
                        attempt = intent.attempt_count,
                        "Intent claimed",
                    );
                    self.spawn_attempt(intent, permit);
                }
                // Another worker won the race; the permit drops here.
                None => drop(permit),
            }
        }
        Ok(())
    }

    fn spawn_attempt(&self, intent: Intent, permit: OwnedSemaphorePermit) {
        let backlog = self.backlog.clone();
        let registry = self.registry.clone();
        let executor = self.executor.clone();
        let worker_id = self.config.worker_id.clone();
        let backoff = self.config.backoff.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            run_attempt(backlog, registry, executor, &worker_id, &backoff, intent).await;
        });
    }
}

/// Execute one claimed attempt end to end: dispatch, run, seal, transition.
/// Every failure becomes a sealed run; nothing escapes to the caller.
async fn run_attempt(
    backlog: Arc<dyn Backlog>,
    registry: Arc<CapabilityRegistry>,
    executor: Arc<Executor>,
    worker_id: &str,
    backoff: &BackoffPolicy,
    intent: Intent,
) {
    let run = if intent.attempts_exhausted() {
        // Safety net: normally a retryable failure on the final attempt
        // already went Dead at seal time, so this claim should not happen.
        let failure = ExecutionFailure::new(
            FailureKind::MaxAttemptsExceeded,
            format!(
                "attempt {} exceeds max_attempts {}",
                intent.attempt_count, intent.max_attempts
            ),
        );
        WorkflowRun::begin(&intent, worker_id).seal_failure(&failure)
    } else {
        match registry.dispatch(&intent.name) {
            Ok(capability) => executor.run(&intent, capability).await,
            Err(failure) => WorkflowRun::begin(&intent, worker_id).seal_failure(&failure),
        }
    };

    if let Err(e) = backlog.seal_run(&run).await {
        // Without a sealed run the attempt is unrecorded; leave the claim
        // to lease expiry so the retry produces a run for its attempt.
        tracing::error!(
            intent_id = %intent.id,
            error = %e,
            "Failed to seal run; leaving claim to lease expiry",
        );
        return;
    }

    let (to, next_eligible_at) = next_state(&intent, &run, backoff);
    match backlog
        .transition(intent.id, worker_id, to, next_eligible_at)
        .await
    {
        Ok(true) => {
            tracing::info!(intent_id = %intent.id, status = ?to, "Intent transitioned");
        }
        Ok(false) => {
            // The lease expired mid-execution and another worker owns the
            // intent now; our outcome must not clobber the live claim.
            tracing::warn!(
                intent_id = %intent.id,
                status = ?to,
                "Lease lost before transition; outcome dropped",
            );
        }
        Err(e) => {
            tracing::error!(intent_id = %intent.id, error = %e, "Failed to transition intent");
        }
    }
}

/// Decide the intent's post-run state.
///
/// A retryable failure with attempts remaining schedules a re-claim after
/// the backoff delay; a retryable failure on the final allowed attempt goes
/// straight to `Dead`, so an intent with `max_attempts = N` produces
/// exactly N sealed runs.
fn next_state(
    intent: &Intent,
    run: &WorkflowRun,
    backoff: &BackoffPolicy,
) -> (IntentStatus, Option<Timestamp>) {
    if run.outcome == Some(RunOutcome::Success) {
        return (IntentStatus::Succeeded, None);
    }
    let retryable = run.failure().is_some_and(|f| f.retryable());
    if retryable && intent.attempt_count < intent.max_attempts {
        let delay = backoff.delay_for_attempt(intent.attempt_count.max(1) as u32);
        let deadline =
            chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        (IntentStatus::Failed, Some(deadline))
    } else {
        (IntentStatus::Dead, None)
    }
}
