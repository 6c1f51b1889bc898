//! Execution contexts for split success/error callbacks.

use tokio::sync::mpsc;

/// A unit of callback work.
pub type CallbackJob = Box<dyn FnOnce() + Send + 'static>;

/// Where [`super::Client::send_with_callbacks`] runs its callbacks.
pub trait CallbackContext: Send + Sync {
    /// Schedules `job` on this context.
    fn dispatch(&self, job: CallbackJob);
}

/// Runs callbacks immediately on the thread that completed the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl CallbackContext for InlineContext {
    fn dispatch(&self, job: CallbackJob) {
        job();
    }
}

/// Runs callbacks on the blocking pool of a tokio runtime.
impl CallbackContext for tokio::runtime::Handle {
    fn dispatch(&self, job: CallbackJob) {
        drop(self.spawn_blocking(job));
    }
}

/// Queues callbacks for a single consumer loop, such as a UI thread.
#[derive(Debug, Clone)]
pub struct QueueContext {
    tx: mpsc::UnboundedSender<CallbackJob>,
}

/// Receiving side of a [`QueueContext`].
#[derive(Debug)]
pub struct CallbackQueue {
    rx: mpsc::UnboundedReceiver<CallbackJob>,
}

impl QueueContext {
    /// Creates a context and the queue that drains it.
    pub fn new() -> (Self, CallbackQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CallbackQueue { rx })
    }
}

impl CallbackContext for QueueContext {
    fn dispatch(&self, job: CallbackJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("Callback queue closed, dropping callback");
        }
    }
}

impl CallbackQueue {
    /// Waits for the next callback and runs it. Returns false once every
    /// context handle is dropped and the queue is empty.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs every callback already queued and returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        InlineContext.dispatch(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_defers_until_drained() {
        let (context, mut queue) = QueueContext::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = hits.clone();
            context.dispatch(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        drop(context);
        assert!(!queue.run_next().await);
    }
}
