//! Fixed-size worker pool consuming a [`JobQueue`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Job, JobQueue};

/// Spawns a fixed number of consumer tasks. Each task loops dequeue → handler
/// until stopped; the pool itself never retries, that is the orchestrator's
/// call to make.
pub struct WorkerPool {
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `workers` consumers on `queue`, invoking `handler` for each job.
    pub fn start<F, Fut>(workers: usize, queue: Arc<JobQueue>, handler: F) -> Self
    where
        F: Fn(Job) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let handler = handler.clone();
            let running = Arc::clone(&running);
            let mut shutdown_rx = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                loop {
                    // The flag short-circuits before dequeue; a handler that
                    // is already running always finishes.
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        job = queue.dequeue() => handler(job).await,
                    }
                }
                debug!(worker_id, "worker stopped");
            }));
        }

        Self {
            running,
            shutdown_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Stop the pool and wait for in-flight handlers to finish.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobKind;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let queue = Arc::new(JobQueue::new(64));
        let processed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&processed);
        let pool = WorkerPool::start(4, Arc::clone(&queue), move |_job| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for i in 0..20 {
            assert!(queue.enqueue(Job::new(JobKind::Download, format!("s{i}"), 10)));
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while processed.load(Ordering::SeqCst) < 20 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 20);
        assert_eq!(queue.len(), 0);

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_halts_idle_workers() {
        let queue = Arc::new(JobQueue::new(8));
        let pool = WorkerPool::start(2, Arc::clone(&queue), |_job| async {});

        // Workers are parked in dequeue; stop must not hang.
        tokio::time::timeout(Duration::from_secs(1), pool.stop())
            .await
            .expect("stop should complete");

        // Jobs enqueued after stop stay queued.
        queue.enqueue(Job::new(JobKind::Convert, "late", 1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len(), 1);
    }
}
