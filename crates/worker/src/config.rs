//! Worker configuration loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

/// Runtime configuration for one worker process.
///
/// All fields except `DATABASE_URL` have defaults suitable for local
/// development. The poll interval trades claim latency for backlog-store
/// load; queue limits trade throughput for resource contention on the
/// transformation step.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Backlog Postgres connection string (`DATABASE_URL`).
    pub database_url: String,
    /// Base URL of the external content service (default:
    /// `http://localhost:8080`).
    pub content_api_url: String,
    /// Identity recorded as the claim owner (default: `worker-<uuid>`).
    pub worker_id: String,
    /// Idle delay between poll ticks (default: 2000 ms).
    pub poll_interval: Duration,
    /// Claim lease duration; an unsealed claim past this is reclaimable
    /// (default: 60 s).
    pub lease: Duration,
    /// Max claimable ids fetched per queue per tick (default: 10).
    pub claim_batch_size: i64,
    /// Parsed `QUEUE_LIMITS` pairs, e.g. `default=4,ocr=2`.
    pub queue_limits: HashMap<String, usize>,
    /// Slots for queues not listed in `QUEUE_LIMITS` (default: 4).
    pub default_queue_limit: usize,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `DATABASE_URL`        | (required)              |
    /// | `CONTENT_API_URL`     | `http://localhost:8080` |
    /// | `WORKER_ID`           | `worker-<uuid>`         |
    /// | `POLL_INTERVAL_MS`    | `2000`                  |
    /// | `LEASE_SECS`          | `60`                    |
    /// | `CLAIM_BATCH_SIZE`    | `10`                    |
    /// | `QUEUE_LIMITS`        | `default=4`             |
    /// | `DEFAULT_QUEUE_LIMIT` | `4`                     |
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let content_api_url = std::env::var("CONTENT_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into());

        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4()));

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let lease_secs: u64 = std::env::var("LEASE_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("LEASE_SECS must be a valid u64");

        let claim_batch_size: i64 = std::env::var("CLAIM_BATCH_SIZE")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("CLAIM_BATCH_SIZE must be a valid i64");

        let queue_limits = parse_queue_limits(
            &std::env::var("QUEUE_LIMITS").unwrap_or_else(|_| "default=4".into()),
        );

        let default_queue_limit: usize = std::env::var("DEFAULT_QUEUE_LIMIT")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("DEFAULT_QUEUE_LIMIT must be a valid usize");

        Self {
            database_url,
            content_api_url,
            worker_id,
            poll_interval: Duration::from_millis(poll_interval_ms),
            lease: Duration::from_secs(lease_secs),
            claim_batch_size,
            queue_limits,
            default_queue_limit,
        }
    }

    /// Queue names this worker polls: the configured limit keys, or just
    /// `default` when none are configured.
    pub fn poll_queues(&self) -> Vec<String> {
        if self.queue_limits.is_empty() {
            vec!["default".to_string()]
        } else {
            let mut queues: Vec<String> = self.queue_limits.keys().cloned().collect();
            queues.sort();
            queues
        }
    }
}

/// Parse a comma-separated `name=limit` list. Malformed entries are
/// skipped.
fn parse_queue_limits(raw: &str) -> HashMap<String, usize> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, limit) = pair.split_once('=')?;
            let name = name.trim();
            let limit: usize = limit.trim().parse().ok()?;
            if name.is_empty() || limit == 0 {
                return None;
            }
            Some((name.to_string(), limit))
        })
        .collect()
}
