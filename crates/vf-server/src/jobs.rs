//! In-process background job queue with unique job ids.
//!
//! The queue guarantees single-consumer-per-job-id semantics: enqueueing an
//! id that is already running is a no-op, which is what makes "request the
//! playlist twice" spawn exactly one continuous encoder. Jobs receive a
//! [`CancellationToken`] so the scheduler can cancel a queued worker when it
//! overrides it (seek past the prefetched window, same-user preemption).

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

struct JobHandle {
    cancel: CancellationToken,
}

/// Registry of running background jobs keyed by job id.
#[derive(Default)]
pub struct JobQueue {
    jobs: DashMap<String, JobHandle>,
}

/// Removes the registry entry when the job future finishes or panics.
struct FinishGuard {
    queue: Arc<JobQueue>,
    id: String,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.queue.jobs.remove(&self.id);
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `make(cancel)` under `id` unless a job with that id is already
    /// running. Returns whether the job was spawned.
    pub fn enqueue<F, Fut>(self: &Arc<Self>, id: impl Into<String>, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let cancel = CancellationToken::new();

        {
            use dashmap::mapref::entry::Entry;
            match self.jobs.entry(id.clone()) {
                Entry::Occupied(_) => return false,
                Entry::Vacant(vacant) => {
                    vacant.insert(JobHandle {
                        cancel: cancel.clone(),
                    });
                }
            }
        }

        let guard = FinishGuard {
            queue: Arc::clone(self),
            id: id.clone(),
        };
        let fut = make(cancel);

        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });

        tracing::debug!(job_id = %id, "Job enqueued");
        true
    }

    /// Whether a job with this id is currently running.
    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// Trigger a job's cancellation token. Returns whether the id was known.
    ///
    /// The job removes itself from the registry once its future completes.
    pub fn cancel(&self, id: &str) -> bool {
        match self.jobs.get(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running job (shutdown path).
    pub fn cancel_all(&self) {
        for entry in self.jobs.iter() {
            entry.value().cancel.cancel();
        }
    }

    /// Number of running jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueue_runs_and_self_removes() {
        let queue = Arc::new(JobQueue::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(queue.enqueue("job-1", move |_cancel| async move {
            tx.send(()).ok();
        }));

        rx.await.unwrap();
        // Give the finish guard a moment to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queue.contains("job-1"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_is_noop() {
        let queue = Arc::new(JobQueue::new());
        let gate = Arc::new(tokio::sync::Notify::new());
        let release = gate.clone();

        assert!(queue.enqueue("job-1", move |_cancel| async move {
            release.notified().await;
        }));
        assert!(!queue.enqueue("job-1", |_cancel| async move {
            panic!("duplicate job must not run");
        }));
        assert_eq!(queue.len(), 1);

        gate.notify_waiters();
    }

    #[tokio::test]
    async fn cancel_triggers_token() {
        let queue = Arc::new(JobQueue::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<&'static str>();

        queue.enqueue("job-1", move |cancel| async move {
            tokio::select! {
                _ = cancel.cancelled() => { tx.send("cancelled").ok(); }
                _ = tokio::time::sleep(Duration::from_secs(30)) => { tx.send("timed out").ok(); }
            }
        });

        assert!(queue.cancel("job-1"));
        assert_eq!(rx.await.unwrap(), "cancelled");
        assert!(!queue.cancel("job-nope"));
    }

    #[tokio::test]
    async fn panicking_job_is_removed() {
        let queue = Arc::new(JobQueue::new());
        queue.enqueue("job-1", |_cancel| async move {
            panic!("job blew up");
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!queue.contains("job-1"));
    }
}
