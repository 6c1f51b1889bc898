//! Transport abstraction.
//!
//! A transport starts a request under a [`TaskId`] and reports progress
//! through [`TaskEvents`]: the response head, body chunks, an optional
//! promotion to a file-backed download, and exactly one terminal event.
//! The [`crate::registry::TaskRegistry`] is the usual event sink.

mod streaming;

pub use streaming::{ReqwestTransport, ReqwestTransportBuilder};

use crate::error::TransportError;
use crate::registry::TaskId;
use crate::request::{Headers, Request};
use async_trait::async_trait;
use std::sync::Arc;

/// Callbacks a transport drives for each task.
///
/// Events may arrive on any thread. For a given task the transport calls
/// `on_response` before any `on_data`, and `on_terminal` last and once.
pub trait TaskEvents: Send + Sync {
    /// The response head arrived.
    fn on_response(&self, task: TaskId, status: u16, headers: Headers) -> Result<(), TransportError>;

    /// A body chunk arrived.
    fn on_data(&self, task: TaskId, chunk: &[u8]) -> Result<(), TransportError>;

    /// The task continues under a new id as a file-backed download.
    fn on_promoted(&self, old: TaskId, new: TaskId) -> Result<(), TransportError>;

    /// The task finished, with an error if it failed or was cancelled.
    fn on_terminal(&self, task: TaskId, error: Option<TransportError>) -> Result<(), TransportError>;

    /// Every task of a background session has delivered its events.
    fn on_background_events_finished(&self);
}

/// Streaming HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Starts `request` under `task`. Progress is reported to `events`.
    ///
    /// An `Err` means the task never started and no events will follow.
    async fn start(
        &self,
        task: TaskId,
        request: Request,
        events: Arc<dyn TaskEvents>,
    ) -> Result<(), TransportError>;

    /// Cancels a running task. The task still receives its terminal event,
    /// carrying [`TransportError::Cancelled`]. Returns false if the task is
    /// not running.
    fn cancel(&self, task: TaskId) -> bool;
}

/// Session scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Interactive session, a small pool of concurrent transfers.
    #[default]
    Foreground,
    /// Background session, one transfer at a time.
    Background,
}

impl SessionMode {
    /// Maximum concurrent transfers for the mode.
    pub fn max_concurrent_transfers(&self) -> usize {
        match self {
            SessionMode::Foreground => 5,
            SessionMode::Background => 1,
        }
    }
}
