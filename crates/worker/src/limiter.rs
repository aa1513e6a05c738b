//! Per-queue concurrency limiter.
//!
//! Each queue name carries a semaphore bounding how many intents from that
//! queue this process runs in parallel. A claimed intent holds its permit
//! for the whole execution; the permit is owned, so dropping it on any exit
//! path (including a panicked task) frees the slot. The bound is
//! process-local: the system-wide ceiling is the sum across workers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-queue execution slot pool.
pub struct QueueLimiter {
    queues: HashMap<String, Arc<Semaphore>>,
    default_limit: usize,
    /// Lazily created semaphores for queues not configured up front.
    extra: std::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl QueueLimiter {
    /// Build a limiter from configured `queue name -> limit` pairs. Queues
    /// not listed get `default_limit` slots on first use.
    pub fn new(limits: &HashMap<String, usize>, default_limit: usize) -> Self {
        let queues = limits
            .iter()
            .map(|(name, &limit)| (name.clone(), Arc::new(Semaphore::new(limit.max(1)))))
            .collect();
        Self {
            queues,
            default_limit: default_limit.max(1),
            extra: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, queue_name: &str) -> Arc<Semaphore> {
        if let Some(sem) = self.queues.get(queue_name) {
            return sem.clone();
        }
        let mut extra = self.extra.lock().expect("limiter mutex poisoned");
        extra
            .entry(queue_name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.default_limit)))
            .clone()
    }

    /// Try to take an execution slot without waiting. `None` means the
    /// queue is at its bound and the claim should be deferred to a later
    /// poll tick.
    pub fn try_acquire(&self, queue_name: &str) -> Option<OwnedSemaphorePermit> {
        self.semaphore(queue_name).try_acquire_owned().ok()
    }

    /// Slots currently available for a queue.
    pub fn available(&self, queue_name: &str) -> usize {
        self.semaphore(queue_name).available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(pairs: &[(&str, usize)], default_limit: usize) -> QueueLimiter {
        let limits = pairs
            .iter()
            .map(|(n, l)| (n.to_string(), *l))
            .collect::<HashMap<_, _>>();
        QueueLimiter::new(&limits, default_limit)
    }

    #[test]
    fn bound_is_enforced() {
        let limiter = limiter(&[("ocr", 2)], 4);
        let _a = limiter.try_acquire("ocr").unwrap();
        let _b = limiter.try_acquire("ocr").unwrap();
        assert!(limiter.try_acquire("ocr").is_none());
    }

    #[test]
    fn dropping_permit_frees_slot() {
        let limiter = limiter(&[("ocr", 1)], 4);
        let permit = limiter.try_acquire("ocr").unwrap();
        assert!(limiter.try_acquire("ocr").is_none());
        drop(permit);
        assert!(limiter.try_acquire("ocr").is_some());
    }

    #[test]
    fn queues_are_independent() {
        let limiter = limiter(&[("ocr", 1), ("thumb", 1)], 4);
        let _a = limiter.try_acquire("ocr").unwrap();
        assert!(limiter.try_acquire("thumb").is_some());
    }

    #[test]
    fn unconfigured_queue_uses_default_limit() {
        let limiter = limiter(&[], 2);
        let _a = limiter.try_acquire("adhoc").unwrap();
        let _b = limiter.try_acquire("adhoc").unwrap();
        assert!(limiter.try_acquire("adhoc").is_none());
        assert_eq!(limiter.available("adhoc"), 0);
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        let limiter = limiter(&[("ocr", 0)], 0);
        assert!(limiter.try_acquire("ocr").is_some());
    }
}
