//! Streaming transport backed by reqwest.

use super::{HttpTransport, SessionMode, TaskEvents};
use crate::error::{RestError, TransportError};
use crate::registry::TaskId;
use crate::request::{Headers, Request};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, trace, warn};
use uuid::Uuid;

type Cancellations = Arc<Mutex<HashMap<TaskId, oneshot::Sender<()>>>>;

/// HTTP transport using reqwest with streamed bodies.
///
/// Concurrency is bounded by the session mode. A body that grows past the
/// promotion threshold is promoted: the task is re-keyed, the remainder is
/// spooled to a temporary file, and the file contents are delivered before
/// the terminal event. Cancellation stays keyed by the id the task was
/// started under.
pub struct ReqwestTransport {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    cancellations: Cancellations,
    mode: SessionMode,
    read_timeout: Duration,
    promotion_threshold: Option<usize>,
}

impl ReqwestTransport {
    /// Create a new transport with default settings.
    pub fn new() -> Result<Self, RestError> {
        Self::builder().build()
    }

    /// Create a transport builder.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// The session mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Number of tasks started and not yet terminated.
    pub fn running_count(&self) -> usize {
        self.cancellations.lock().len()
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("mode", &self.mode)
            .field("promotion_threshold", &self.promotion_threshold)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn start(
        &self,
        task: TaskId,
        request: Request,
        events: Arc<dyn TaskEvents>,
    ) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TransportError::ConnectionFailed {
                message: format!("No async runtime available: {}", e),
            }
        })?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancellations.lock().insert(task, cancel_tx);

        let worker = TaskWorker {
            client: self.client.clone(),
            permits: self.permits.clone(),
            cancellations: self.cancellations.clone(),
            mode: self.mode,
            read_timeout: self.read_timeout,
            promotion_threshold: self.promotion_threshold,
            started_as: task,
            current: Mutex::new(task),
        };

        trace!(%task, method = %request.method(), url = %request.url(), "Starting task");
        runtime.spawn(worker.run(request, events, cancel_rx));
        Ok(())
    }

    fn cancel(&self, task: TaskId) -> bool {
        let sender = self.cancellations.lock().remove(&task);
        match sender {
            Some(tx) => {
                debug!(%task, "Cancelling task");
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

struct TaskWorker {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    cancellations: Cancellations,
    mode: SessionMode,
    read_timeout: Duration,
    promotion_threshold: Option<usize>,
    started_as: TaskId,
    current: Mutex<TaskId>,
}

impl TaskWorker {
    async fn run(
        self,
        request: Request,
        events: Arc<dyn TaskEvents>,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let outcome = tokio::select! {
            _ = cancel_rx => Err(TransportError::Cancelled),
            result = self.drive(request, events.as_ref()) => result,
        };

        let task = *self.current.lock();
        let remaining = {
            let mut cancellations = self.cancellations.lock();
            cancellations.remove(&self.started_as);
            cancellations.len()
        };

        if let Err(e) = events.on_terminal(task, outcome.err()) {
            warn!(%task, error = %e, "Terminal event rejected");
        }

        if self.mode == SessionMode::Background && remaining == 0 {
            events.on_background_events_finished();
        }
    }

    async fn drive(&self, request: Request, events: &dyn TaskEvents) -> Result<(), TransportError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::ConnectionFailed {
                message: "Transport is shut down".to_string(),
            })?;

        let task = *self.current.lock();
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes()).map_err(
            |e| TransportError::ConnectionFailed {
                message: format!("Invalid HTTP method: {}", e),
            },
        )?;

        let mut req_builder = self.client.request(method, request.url().clone());
        for (name, value) in request.headers().iter() {
            req_builder = req_builder.header(name, value);
        }
        if let Some(body) = request.body() {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        events.on_response(task, status, headers)?;

        let mut stream = response.bytes_stream();
        let mut received = 0usize;
        let mut spool: Option<Spool> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_error(e))?;
            received += chunk.len();

            if let Some(spool) = spool.as_mut() {
                spool.write(&chunk).await?;
                continue;
            }

            match self.promotion_threshold {
                Some(limit) if received > limit => {
                    let promoted = self.promote(task, events)?;
                    let mut file = Spool::create(promoted).await?;
                    file.write(&chunk).await?;
                    spool = Some(file);
                }
                _ => events.on_data(task, &chunk)?,
            }
        }

        if let Some(spool) = spool {
            let data = spool.finish().await?;
            events.on_data(*self.current.lock(), &data)?;
        }

        Ok(())
    }

    fn promote(&self, old: TaskId, events: &dyn TaskEvents) -> Result<TaskId, TransportError> {
        let new = TaskId::next();
        events.on_promoted(old, new)?;
        *self.current.lock() = new;
        debug!(%old, %new, "Promoted task to file-backed download");
        Ok(new)
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                duration: self.read_timeout,
            }
        } else {
            TransportError::ConnectionFailed {
                message: e.to_string(),
            }
        }
    }
}

/// Temporary download file, removed on drop.
struct Spool {
    path: PathBuf,
    file: tokio::fs::File,
}

impl Spool {
    async fn create(task: TaskId) -> Result<Self, TransportError> {
        let path = std::env::temp_dir().join(format!("restwire-{}-{}.download", task, Uuid::new_v4()));
        let file = tokio::fs::File::create(&path).await.map_err(io_error)?;
        Ok(Self { path, file })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        self.file.write_all(chunk).await.map_err(io_error)
    }

    async fn finish(mut self) -> Result<Vec<u8>, TransportError> {
        self.file.flush().await.map_err(io_error)?;
        tokio::fs::read(&self.path).await.map_err(io_error)
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            trace!(path = %self.path.display(), error = %e, "Could not remove download file");
        }
    }
}

/// Header values with bytes outside visible ASCII are decoded lossily.
fn response_headers(map: &reqwest::header::HeaderMap) -> Headers {
    map.iter()
        .map(|(k, v)| match v.to_str() {
            Ok(text) => (k.as_str(), text.to_string()),
            Err(_) => {
                trace!(header = %k, "Non-ASCII header value decoded lossily");
                (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned())
            }
        })
        .collect()
}

fn io_error(e: std::io::Error) -> TransportError {
    TransportError::Io {
        message: e.to_string(),
    }
}

/// Builder for reqwest transport.
pub struct ReqwestTransportBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
    mode: SessionMode,
    promotion_threshold: Option<usize>,
    user_agent: String,
}

impl ReqwestTransportBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            mode: SessionMode::Foreground,
            promotion_threshold: None,
            user_agent: format!("restwire/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the session mode.
    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Promote bodies larger than `bytes` to file-backed downloads.
    pub fn promotion_threshold(mut self, bytes: Option<usize>) -> Self {
        self.promotion_threshold = bytes;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport, RestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                message: e.to_string(),
            })?;

        Ok(ReqwestTransport {
            client,
            permits: Arc::new(Semaphore::new(self.mode.max_concurrent_transfers())),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            mode: self.mode,
            read_timeout: self.read_timeout,
            promotion_threshold: self.promotion_threshold,
        })
    }
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
