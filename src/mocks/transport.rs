//! Mock HTTP transport for testing.

use crate::error::TransportError;
use crate::registry::TaskId;
use crate::request::{Headers, Request};
use crate::transport::{HttpTransport, TaskEvents};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Bytes,
    /// Deliver the body in chunks of this size.
    pub chunk_size: Option<usize>,
    /// Terminate with this error instead of a response.
    pub failure: Option<TransportError>,
}

impl MockResponse {
    /// Create a response with a status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
            chunk_size: None,
            failure: None,
        }
    }

    /// Create a successful response with empty body.
    pub fn ok() -> Self {
        Self::new(200, Bytes::new())
    }

    /// Create a successful response with body.
    pub fn ok_with_body(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, body).with_header("Content-Type", "application/json")
    }

    /// Create an HTML response.
    pub fn html(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, body).with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// Create a 204 No Content response.
    pub fn no_content() -> Self {
        Self::new(204, Bytes::new())
    }

    /// Create a 304 Not Modified response carrying stale bytes.
    pub fn not_modified(body: impl Into<Bytes>) -> Self {
        Self::new(304, body)
    }

    /// Create an error response.
    pub fn error(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, body)
    }

    /// Create a transport failure.
    pub fn failure(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::ok()
        }
    }

    /// Add a header to the response.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Deliver the body in chunks of `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    async fn deliver(self, task: TaskId, events: &dyn TaskEvents) {
        if let Some(error) = self.failure {
            report(task, events.on_terminal(task, Some(error)));
            return;
        }

        report(task, events.on_response(task, self.status, self.headers));
        let chunk_size = self.chunk_size.unwrap_or(self.body.len().max(1));
        for chunk in self.body.chunks(chunk_size) {
            report(task, events.on_data(task, chunk));
            tokio::task::yield_now().await;
        }
        report(task, events.on_terminal(task, None));
    }
}

fn report(task: TaskId, result: Result<(), TransportError>) {
    if let Err(e) = result {
        trace!(%task, error = %e, "Mock event rejected");
    }
}

/// Builder for mock responses.
#[derive(Default)]
pub struct MockResponseBuilder {
    responses: Vec<MockResponse>,
}

impl MockResponseBuilder {
    /// Create a new mock response builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response to return.
    pub fn respond(mut self, response: MockResponse) -> Self {
        self.responses.push(response);
        self
    }

    /// Build the mock transport.
    pub fn build(self) -> MockTransport {
        MockTransport::with_responses(self.responses)
    }
}

type Cancellations = Arc<Mutex<HashMap<TaskId, oneshot::Sender<()>>>>;

/// Mock HTTP transport for testing.
///
/// Responses are taken from the queue first, then the default. Each task is
/// delivered on a spawned tokio task, so events arrive asynchronously as
/// they would from a real transport.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<Request>>,
    default_response: Option<MockResponse>,
    cancellations: Cancellations,
    refuse_start: bool,
    hold_until_cancel: bool,
}

impl MockTransport {
    /// Create a new mock transport with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport with queued responses.
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Create a mock transport with a default response.
    pub fn with_default(response: MockResponse) -> Self {
        Self {
            default_response: Some(response),
            ..Self::default()
        }
    }

    /// Create a builder for the mock transport.
    pub fn builder() -> MockResponseBuilder {
        MockResponseBuilder::new()
    }

    /// Refuse to start every task.
    pub fn failing_to_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    /// Never deliver responses; tasks finish only when cancelled.
    pub fn holding_until_cancel(mut self) -> Self {
        self.hold_until_cancel = true;
        self
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// Get all recorded requests.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Get the last request made.
    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Number of tasks that have not yet delivered their terminal event.
    pub fn running_count(&self) -> usize {
        self.cancellations.lock().len()
    }

    fn next_response(&self) -> Option<MockResponse> {
        self.responses
            .lock()
            .pop_front()
            .or_else(|| self.default_response.clone())
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn start(
        &self,
        task: TaskId,
        request: Request,
        events: Arc<dyn TaskEvents>,
    ) -> Result<(), TransportError> {
        self.requests.lock().push(request);

        if self.refuse_start {
            return Err(TransportError::ConnectionFailed {
                message: "mock transport refused to start".to_string(),
            });
        }

        let response = if self.hold_until_cancel {
            None
        } else {
            Some(self.next_response().ok_or_else(|| TransportError::ConnectionFailed {
                message: "No mock response configured".to_string(),
            })?)
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TransportError::ConnectionFailed {
                message: format!("No async runtime available: {}", e),
            }
        })?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancellations.lock().insert(task, cancel_tx);
        let cancellations = self.cancellations.clone();

        runtime.spawn(async move {
            let sink = events.clone();
            let delivery = async move {
                match response {
                    Some(response) => response.deliver(task, sink.as_ref()).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel_rx => {
                    report(task, events.on_terminal(task, Some(TransportError::Cancelled)));
                }
                _ = delivery => {}
            }
            cancellations.lock().remove(&task);
        });

        Ok(())
    }

    fn cancel(&self, task: TaskId) -> bool {
        match self.cancellations.lock().remove(&task) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}
