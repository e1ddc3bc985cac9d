//! Bounded priority job queue.
//!
//! Ordering is (priority descending, enqueue time ascending): higher-priority
//! jobs always dispatch first, and within a priority tier dispatch is strict
//! FIFO. The queue is the backpressure point of the service; a full queue
//! rejects the enqueue and the HTTP layer turns that into a 503.

mod worker;

pub use worker::WorkerPool;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

/// What a queued job asks a worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Download,
    Convert,
}

/// One unit of background work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub session_id: String,
    pub quality: String,
    pub start: String,
    pub end: String,
    pub enqueued_at: DateTime<Utc>,
    pub priority: i32,
    pub attempts: u32,
    pub api_key: String,
}

impl Job {
    pub fn new(kind: JobKind, session_id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: format!("job_{}", Uuid::new_v4().simple()),
            kind,
            session_id: session_id.into(),
            quality: String::new(),
            start: String::new(),
            end: String::new(),
            enqueued_at: Utc::now(),
            priority,
            attempts: 0,
            api_key: String::new(),
        }
    }
}

/// Heap entry. The sequence number gives a total order so equal
/// (priority, timestamp) pairs still dequeue deterministically.
struct QueuedJob {
    job: Job,
    seq: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: the "greatest" entry dispatches first.
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.job.enqueued_at.cmp(&self.job.enqueued_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
}

/// Bounded priority queue with a blocking dequeue.
pub struct JobQueue {
    inner: Mutex<Inner>,
    not_empty: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            not_empty: Notify::new(),
            capacity,
        }
    }

    /// Atomically enqueue a job. Returns false when the queue is at capacity.
    pub fn enqueue(&self, job: Job) -> bool {
        {
            let mut inner = self.lock();
            if inner.heap.len() >= self.capacity {
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(QueuedJob { job, seq });
        }
        self.not_empty.notify_one();
        true
    }

    /// Remove and return the head job, waiting until one is available.
    pub async fn dequeue(&self) -> Job {
        loop {
            // Register for a wakeup before checking, so an enqueue racing
            // with an empty check cannot be missed.
            let notified = self.not_empty.notified();
            if let Some(job) = self.try_pop() {
                return job;
            }
            notified.await;
        }
    }

    fn try_pop(&self) -> Option<Job> {
        self.lock().heap.pop().map(|entry| entry.job)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1-based rank of the earliest-enqueued job matching (kind, session)
    /// among jobs of the same kind, using dispatch order. 0 when absent.
    pub fn position_for_session(&self, kind: JobKind, session_id: &str) -> usize {
        let inner = self.lock();
        let mut found: Option<&QueuedJob> = None;
        for entry in inner.heap.iter() {
            if entry.job.kind != kind || entry.job.session_id != session_id {
                continue;
            }
            let earlier = match found {
                Some(current) => {
                    (entry.job.enqueued_at, entry.seq) < (current.job.enqueued_at, current.seq)
                }
                None => true,
            };
            if earlier {
                found = Some(entry);
            }
        }
        let Some(found) = found else {
            return 0;
        };

        let mut pos = 1;
        for entry in inner.heap.iter() {
            if entry.job.kind != kind || entry.seq == found.seq {
                continue;
            }
            let ahead = entry.job.priority > found.job.priority
                || (entry.job.priority == found.job.priority
                    && (entry.job.enqueued_at, entry.seq)
                        < (found.job.enqueued_at, found.seq));
            if ahead {
                pos += 1;
            }
        }
        pos
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn job_at(kind: JobKind, session: &str, priority: i32, offset_ms: i64) -> Job {
        let mut job = Job::new(kind, session, priority);
        job.enqueued_at = Utc::now() + chrono::Duration::milliseconds(offset_ms);
        job
    }

    #[tokio::test]
    async fn test_dequeue_orders_by_priority_then_fifo() {
        let queue = JobQueue::new(16);
        queue.enqueue(job_at(JobKind::Convert, "low-early", 5, 0));
        queue.enqueue(job_at(JobKind::Convert, "high", 50, 10));
        queue.enqueue(job_at(JobKind::Convert, "low-late", 5, 20));
        queue.enqueue(job_at(JobKind::Convert, "mid", 10, 30));

        let order: Vec<String> = [
            queue.dequeue().await,
            queue.dequeue().await,
            queue.dequeue().await,
            queue.dequeue().await,
        ]
        .into_iter()
        .map(|j| j.session_id)
        .collect();
        assert_eq!(order, ["high", "mid", "low-early", "low-late"]);
    }

    #[test]
    fn test_capacity_rejects_then_recovers() {
        let queue = JobQueue::new(2);
        assert!(queue.enqueue(Job::new(JobKind::Download, "a", 10)));
        assert!(queue.enqueue(Job::new(JobKind::Download, "b", 10)));
        assert!(!queue.enqueue(Job::new(JobKind::Download, "c", 10)));
        assert_eq!(queue.len(), 2);

        assert!(queue.try_pop().is_some());
        assert!(queue.enqueue(Job::new(JobKind::Download, "c", 10)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_position_for_session_matches_dispatch_order() {
        let queue = JobQueue::new(16);
        queue.enqueue(job_at(JobKind::Convert, "a", 5, 0));
        queue.enqueue(job_at(JobKind::Convert, "b", 50, 10));
        queue.enqueue(job_at(JobKind::Convert, "c", 5, 20));
        // Download jobs never count toward convert ranks.
        queue.enqueue(job_at(JobKind::Download, "d", 100, 0));

        assert_eq!(queue.position_for_session(JobKind::Convert, "b"), 1);
        assert_eq!(queue.position_for_session(JobKind::Convert, "a"), 2);
        assert_eq!(queue.position_for_session(JobKind::Convert, "c"), 3);
        assert_eq!(queue.position_for_session(JobKind::Convert, "missing"), 0);
        assert_eq!(queue.position_for_session(JobKind::Download, "d"), 1);
    }

    #[test]
    fn test_position_uses_earliest_entry_for_session() {
        let queue = JobQueue::new(16);
        queue.enqueue(job_at(JobKind::Convert, "a", 5, 0));
        queue.enqueue(job_at(JobKind::Convert, "a", 5, 100));
        queue.enqueue(job_at(JobKind::Convert, "b", 5, 50));
        // Session a's earliest entry is first in line even though it also
        // has a later one queued behind b.
        assert_eq!(queue.position_for_session(JobKind::Convert, "a"), 1);
        assert_eq!(queue.position_for_session(JobKind::Convert, "b"), 2);
    }

    #[tokio::test]
    async fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(JobQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await.session_id })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(Job::new(JobKind::Download, "woken", 1));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dequeue should wake")
            .unwrap();
        assert_eq!(got, "woken");
    }
}
