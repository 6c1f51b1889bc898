//! Task registry bridging streamed transport events into single results.
//!
//! Each dispatched request is registered under a [`TaskId`] with a buffer and
//! one completion slot. The transport reports the response head, appends body
//! chunks, may re-key the task when it is promoted to a file-backed download,
//! and finally delivers exactly one terminal event. The terminal event removes
//! the entry under the lock and fires the completion outside it, so the buffer
//! is never read while an append is in flight and no completion fires twice.

use crate::error::TransportError;
use crate::request::Headers;
use crate::transport::TaskEvents;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of an in-flight transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates a fresh, process-unique task id.
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw id.
    pub fn from_raw(raw: u64) -> Self {
        TaskId(raw)
    }

    /// The raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Unclassified transport result.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Accumulated body bytes.
    pub body: Bytes,
}

/// Outcome delivered to a completion.
pub type TaskResult = std::result::Result<RawResponse, TransportError>;

/// Boxed completion callback.
pub type CompletionCallback = Box<dyn FnOnce(TaskResult) + Send + 'static>;

/// Where a finished task's result goes.
pub enum Completion {
    /// Sent over a oneshot channel to an awaiting caller.
    Channel(oneshot::Sender<TaskResult>),
    /// Invoked directly.
    Callback(CompletionCallback),
}

impl Completion {
    pub(crate) fn complete(self, task: TaskId, result: TaskResult) {
        match self {
            Completion::Channel(tx) => {
                if tx.send(result).is_err() {
                    trace!(%task, "Receiver dropped before completion");
                }
            }
            Completion::Callback(callback) => callback(result),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Channel(_) => f.write_str("Completion::Channel"),
            Completion::Callback(_) => f.write_str("Completion::Callback"),
        }
    }
}

#[derive(Debug)]
struct PendingTask {
    buffer: BytesMut,
    status: Option<u16>,
    headers: Headers,
    completion: Completion,
}

type BackgroundCallback = Box<dyn FnOnce() + Send + 'static>;

/// Registry of pending tasks.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, PendingTask>>,
    background_completion: Mutex<Option<BackgroundCallback>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task with its completion.
    pub fn register(&self, task: TaskId, completion: Completion) -> Result<(), TransportError> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&task) {
            return Err(TransportError::DuplicateTask { task });
        }
        tasks.insert(
            task,
            PendingTask {
                buffer: BytesMut::new(),
                status: None,
                headers: Headers::new(),
                completion,
            },
        );
        trace!(%task, pending = tasks.len(), "Registered task");
        Ok(())
    }

    /// Registers a task and returns the receiver for its result.
    pub fn register_channel(
        &self,
        task: TaskId,
    ) -> Result<oneshot::Receiver<TaskResult>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.register(task, Completion::Channel(tx))?;
        Ok(rx)
    }

    /// Number of tasks awaiting a terminal event.
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether a task is registered.
    pub fn contains(&self, task: TaskId) -> bool {
        self.tasks.lock().contains_key(&task)
    }

    /// Removes a task without completing it and hands back its completion.
    /// Used when the transport refused to start the task, so no terminal
    /// event will ever arrive.
    pub(crate) fn abandon(&self, task: TaskId) -> Option<Completion> {
        self.tasks.lock().remove(&task).map(|pending| pending.completion)
    }

    /// Arms the one-shot "all background events delivered" callback,
    /// replacing any callback not yet fired.
    pub fn set_background_completion<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.background_completion.lock() = Some(Box::new(callback));
    }

    /// Whether a background completion callback is armed.
    pub fn has_background_completion(&self) -> bool {
        self.background_completion.lock().is_some()
    }
}

impl TaskEvents for TaskRegistry {
    fn on_response(&self, task: TaskId, status: u16, headers: Headers) -> Result<(), TransportError> {
        let mut tasks = self.tasks.lock();
        let pending = tasks
            .get_mut(&task)
            .ok_or(TransportError::UnknownTask { task })?;
        pending.status = Some(status);
        pending.headers = headers;
        Ok(())
    }

    fn on_data(&self, task: TaskId, chunk: &[u8]) -> Result<(), TransportError> {
        let mut tasks = self.tasks.lock();
        let pending = tasks
            .get_mut(&task)
            .ok_or(TransportError::UnknownTask { task })?;
        if pending.status == Some(304) {
            trace!(%task, len = chunk.len(), "Ignoring data for 304 response");
            return Ok(());
        }
        pending.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn on_promoted(&self, old: TaskId, new: TaskId) -> Result<(), TransportError> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&new) {
            return Err(TransportError::DuplicateTask { task: new });
        }
        let pending = tasks
            .remove(&old)
            .ok_or(TransportError::UnknownTask { task: old })?;
        tasks.insert(new, pending);
        debug!(%old, %new, "Promoted task to download");
        Ok(())
    }

    fn on_terminal(&self, task: TaskId, error: Option<TransportError>) -> Result<(), TransportError> {
        let removed = self.tasks.lock().remove(&task);

        let Some(pending) = removed else {
            error!(%task, "Terminal event for unregistered task");
            return Err(TransportError::UnknownTask { task });
        };

        let result = match (error, pending.status) {
            (Some(err), _) => {
                debug!(%task, error = %err, "Task failed");
                Err(err)
            }
            (None, None) => Err(TransportError::InvalidResponseType {
                message: "task completed without a response head".to_string(),
            }),
            (None, Some(status)) => {
                trace!(%task, status, len = pending.buffer.len(), "Task completed");
                Ok(RawResponse {
                    status,
                    headers: pending.headers,
                    body: pending.buffer.freeze(),
                })
            }
        };

        pending.completion.complete(task, result);
        Ok(())
    }

    fn on_background_events_finished(&self) {
        let callback = self.background_completion.lock().take();
        match callback {
            Some(callback) => {
                debug!("Background events finished");
                callback();
            }
            None => trace!("Background events finished with no callback armed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert_eq!(TaskId::from_raw(3).to_string(), "task-3");
    }

    #[tokio::test]
    async fn test_data_accumulates_until_terminal() {
        let registry = TaskRegistry::new();
        let task = TaskId::next();
        let rx = registry.register_channel(task).unwrap();

        registry.on_response(task, 200, Headers::new()).unwrap();
        registry.on_data(task, b"hello ").unwrap();
        registry.on_data(task, b"world").unwrap();
        registry.on_terminal(task, None).unwrap();

        let raw = rx.await.unwrap().unwrap();
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, Bytes::from_static(b"hello world"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_not_modified_data_is_dropped() {
        let registry = TaskRegistry::new();
        let task = TaskId::next();
        let rx = registry.register_channel(task).unwrap();

        registry.on_response(task, 304, Headers::new()).unwrap();
        registry.on_data(task, b"stale").unwrap();
        registry.on_terminal(task, None).unwrap();

        let raw = rx.await.unwrap().unwrap();
        assert_eq!(raw.status, 304);
        assert!(raw.body.is_empty());
    }

    #[test]
    fn test_second_terminal_is_an_error() {
        let registry = TaskRegistry::new();
        let task = TaskId::next();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .register(
                task,
                Completion::Callback(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        registry.on_terminal(task, Some(TransportError::Cancelled)).unwrap();
        assert!(matches!(
            registry.on_terminal(task, None),
            Err(TransportError::UnknownTask { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_promotion_keeps_buffer() {
        let registry = TaskRegistry::new();
        let old = TaskId::next();
        let new = TaskId::next();
        let rx = registry.register_channel(old).unwrap();

        registry.on_response(old, 200, Headers::new()).unwrap();
        registry.on_data(old, b"abc").unwrap();
        registry.on_promoted(old, new).unwrap();
        assert!(registry.on_data(old, b"x").is_err());
        registry.on_data(new, b"def").unwrap();
        registry.on_terminal(new, None).unwrap();

        assert_eq!(rx.await.unwrap().unwrap().body, Bytes::from_static(b"abcdef"));
    }

    #[tokio::test]
    async fn test_terminal_without_head_is_invalid_response() {
        let registry = TaskRegistry::new();
        let task = TaskId::next();
        let rx = registry.register_channel(task).unwrap();
        registry.on_terminal(task, None).unwrap();
        assert!(matches!(
            rx.await.unwrap(),
            Err(TransportError::InvalidResponseType { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = TaskRegistry::new();
        let task = TaskId::next();
        let _rx = registry.register_channel(task).unwrap();
        assert!(matches!(
            registry.register_channel(task),
            Err(TransportError::DuplicateTask { .. })
        ));
    }

    #[test]
    fn test_background_completion_fires_once() {
        let registry = TaskRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.set_background_completion(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.on_background_events_finished();
        registry.on_background_events_finished();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.has_background_completion());
    }
}
