//! HTTP client.
//!
//! A [`Client`] is an explicit value built from a [`ClientConfig`] and a
//! transport. Requests flow through the builder, an optional request
//! modifier, the transport and the task registry, and are finally
//! classified against the configured parsers.

mod callbacks;
mod decode;

pub use callbacks::{CallbackContext, CallbackJob, CallbackQueue, InlineContext, QueueContext};
pub use decode::{decode_optional, decode_response};

use crate::config::ClientConfig;
use crate::encoding::Params;
use crate::error::{RestError, Result, TransportError};
use crate::registry::{Completion, RawResponse, TaskId, TaskRegistry, TaskResult};
use crate::request::{Body, HttpMethod, MultipartForm, Request, RequestBuilder};
use crate::response::{classify, ParserRegistry, Response};
use crate::transport::{HttpTransport, TaskEvents};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};
use url::Url;

/// Function applied to every request immediately before dispatch.
pub type RequestModifier = Arc<dyn Fn(Request) -> Request + Send + Sync>;

/// HTTP client.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<TaskRegistry>,
    parsers: Option<Arc<ParserRegistry>>,
    modifier: Option<RequestModifier>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("parsers", &self.parsers)
            .field("has_modifier", &self.modifier.is_some())
            .finish_non_exhaustive()
    }
}

/// A dispatched request awaiting its result.
#[derive(Debug)]
pub struct InFlight {
    task: TaskId,
    rx: oneshot::Receiver<TaskResult>,
}

impl InFlight {
    /// The task id, usable with [`Client::cancel`].
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Waits for the raw transport result.
    pub async fn wait(self) -> Result<RawResponse> {
        let result = self.rx.await.map_err(|_| TransportError::InvalidResponseType {
            message: format!("{} was dropped before completing", self.task),
        })?;
        Ok(result?)
    }
}

impl Client {
    /// Create a client over a transport.
    pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            registry: Arc::new(TaskRegistry::new()),
            parsers: None,
            modifier: None,
        }
    }

    /// Create a client over a reqwest transport built from `config`.
    pub fn with_reqwest(config: ClientConfig) -> Result<Self> {
        let transport = config.reqwest_transport()?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Use `parsers` for response classification.
    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = Some(Arc::new(parsers));
        self
    }

    /// Use the JSON parser for response classification.
    pub fn with_json_parser(self) -> Self {
        self.with_parsers(ParserRegistry::json())
    }

    /// Set the request modifier.
    pub fn with_request_modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Replace the base URL used for relative URIs.
    pub fn set_base_url(&mut self, base_url: Url) {
        Arc::make_mut(&mut self.config).base_url = Some(base_url);
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The configured parsers.
    pub fn parsers(&self) -> Option<&ParserRegistry> {
        self.parsers.as_deref()
    }

    /// Number of requests awaiting a terminal transport event.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Arms the callback fired once all background transfers have finished.
    pub fn set_background_completion<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry.set_background_completion(callback);
    }

    /// Starts a request builder with the base URL and default headers applied.
    pub fn builder(&self, method: HttpMethod, uri: impl Into<String>) -> RequestBuilder {
        let mut builder = RequestBuilder::new(method, uri)
            .header("User-Agent", self.config.user_agent.clone())
            .headers(&self.config.default_headers);
        if let Some(base_url) = &self.config.base_url {
            builder = builder.base_url(base_url.clone());
        }
        builder
    }

    /// Builds a request.
    pub fn build_request(
        &self,
        method: HttpMethod,
        uri: &str,
        query: Params,
        body: Body,
    ) -> Result<Request> {
        self.builder(method, uri).query(query).body(body).build()
    }

    fn prepare(&self, request: Request) -> Request {
        match &self.modifier {
            Some(modifier) => modifier(request),
            None => request,
        }
    }

    /// Registers and starts a request. The outcome, including a transport
    /// that refuses to start, is always delivered through `completion`.
    async fn start(&self, request: Request, completion: Completion) -> Result<TaskId> {
        let request = self.prepare(request);
        let task = TaskId::next();
        self.registry.register(task, completion)?;

        debug!(%task, method = %request.method(), url = %request.url(), "Dispatching request");
        let events: Arc<dyn TaskEvents> = self.registry.clone();
        if let Err(e) = self.transport.start(task, request, events).await {
            debug!(%task, error = %e, "Transport refused to start task");
            if let Some(completion) = self.registry.abandon(task) {
                completion.complete(task, Err(e));
            }
        }
        Ok(task)
    }

    /// Dispatches a request and returns a handle to await or cancel it.
    pub async fn dispatch(&self, request: Request) -> Result<InFlight> {
        let (tx, rx) = oneshot::channel();
        let task = self.start(request, Completion::Channel(tx)).await?;
        Ok(InFlight { task, rx })
    }

    /// Cancels a dispatched request. Its result resolves to a cancellation
    /// error.
    pub fn cancel(&self, task: TaskId) -> bool {
        self.transport.cancel(task)
    }

    /// Performs a request and returns the unclassified result.
    pub async fn perform(&self, request: Request) -> Result<RawResponse> {
        self.dispatch(request).await?.wait().await
    }

    /// Performs a request and classifies the result.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let raw = self.perform(request).await?;
        trace!(status = raw.status, len = raw.body.len(), "Classifying response");
        classify(raw, self.parsers.as_deref(), self.config.max_success_status)
    }

    /// Builds, performs and classifies a request.
    pub async fn request(
        &self,
        method: HttpMethod,
        uri: &str,
        query: Params,
        body: Body,
    ) -> Result<Response> {
        let request = self.build_request(method, uri, query, body)?;
        self.execute(request).await
    }

    /// GET with query parameters.
    pub async fn get(&self, uri: &str, query: Params) -> Result<Response> {
        self.request(HttpMethod::Get, uri, query, Body::None).await
    }

    /// POST a JSON value.
    pub async fn post_json(&self, uri: &str, body: Value) -> Result<Response> {
        self.request(HttpMethod::Post, uri, Params::new(), Body::Json(body.into()))
            .await
    }

    /// POST a url-encoded form.
    pub async fn post_form(&self, uri: &str, body: Params) -> Result<Response> {
        self.request(HttpMethod::Post, uri, Params::new(), Body::Form(body))
            .await
    }

    /// POST a multipart form.
    pub async fn post_multipart(&self, uri: &str, form: MultipartForm) -> Result<Response> {
        self.request(HttpMethod::Post, uri, Params::new(), Body::Multipart(form))
            .await
    }

    /// PUT a JSON value.
    pub async fn put_json(&self, uri: &str, body: Value) -> Result<Response> {
        self.request(HttpMethod::Put, uri, Params::new(), Body::Json(body.into()))
            .await
    }

    /// PUT a url-encoded form.
    pub async fn put_form(&self, uri: &str, body: Params) -> Result<Response> {
        self.request(HttpMethod::Put, uri, Params::new(), Body::Form(body))
            .await
    }

    /// PATCH a JSON value.
    pub async fn patch_json(&self, uri: &str, body: Value) -> Result<Response> {
        self.request(HttpMethod::Patch, uri, Params::new(), Body::Json(body.into()))
            .await
    }

    /// DELETE with parameters sent as a url-encoded form body.
    pub async fn delete(&self, uri: &str, params: Params) -> Result<Response> {
        self.request(HttpMethod::Delete, uri, Params::new(), Body::Form(params))
            .await
    }

    /// OPTIONS with query parameters.
    pub async fn options(&self, uri: &str, query: Params) -> Result<Response> {
        self.request(HttpMethod::Options, uri, query, Body::None).await
    }

    /// HEAD with query parameters.
    pub async fn head(&self, uri: &str, query: Params) -> Result<Response> {
        self.request(HttpMethod::Head, uri, query, Body::None).await
    }

    /// Dispatches a request and reports the classified outcome through one of
    /// two callbacks, scheduled on `context`. Exactly one callback runs.
    pub async fn send_with_callbacks<S, E>(
        &self,
        request: Request,
        context: Arc<dyn CallbackContext>,
        on_success: S,
        on_error: E,
    ) -> Result<TaskId>
    where
        S: FnOnce(Response) + Send + 'static,
        E: FnOnce(RestError) + Send + 'static,
    {
        let parsers = self.parsers.clone();
        let max_success_status = self.config.max_success_status;

        let completion = Completion::Callback(Box::new(move |result: TaskResult| {
            let outcome = result
                .map_err(RestError::from)
                .and_then(|raw| classify(raw, parsers.as_deref(), max_success_status));
            let job: Box<dyn FnOnce() + Send> = match outcome {
                Ok(response) => Box::new(move || on_success(response)),
                Err(error) => Box::new(move || on_error(error)),
            };
            context.dispatch(job);
        }));

        self.start(request, completion).await
    }
}
