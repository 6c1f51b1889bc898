//! Client configuration.
//!
//! [`ClientConfig`] holds everything a [`crate::Client`] needs apart from the
//! transport: base URL, default headers, the success threshold used by the
//! classifier, and the transport settings used by
//! [`ClientConfig::reqwest_transport`].

use crate::error::{ConfigurationError, RestError};
use crate::request::Headers;
use crate::response::DEFAULT_MAX_SUCCESS_STATUS;
use crate::transport::{ReqwestTransport, SessionMode};
use std::time::Duration;
use url::Url;

/// Configuration for a client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL for relative request URIs.
    pub base_url: Option<Url>,

    /// Headers added to every request before body headers.
    pub default_headers: Headers,

    /// Highest status code treated as success.
    pub max_success_status: u16,

    /// Session scheduling mode.
    pub mode: SessionMode,

    /// User-Agent header value.
    pub user_agent: String,

    /// Connection timeout for the reqwest transport.
    pub connect_timeout: Duration,

    /// Read timeout for the reqwest transport.
    pub read_timeout: Duration,

    /// Body size above which downloads are promoted to a temporary file.
    pub download_promotion_threshold: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: Headers::new(),
            max_success_status: DEFAULT_MAX_SUCCESS_STATUS,
            mode: SessionMode::Foreground,
            user_agent: format!("restwire/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            download_promotion_threshold: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.default_headers.names();
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_headers", &header_names)
            .field("max_success_status", &self.max_success_status)
            .field("mode", &self.mode)
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builds a reqwest transport matching this configuration.
    pub fn reqwest_transport(&self) -> Result<ReqwestTransport, RestError> {
        ReqwestTransport::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .mode(self.mode)
            .promotion_threshold(self.download_promotion_threshold)
            .user_agent(self.user_agent.clone())
            .build()
    }
}

/// Builder for client configuration.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<Url>,
    default_headers: Headers,
    max_success_status: Option<u16>,
    mode: Option<SessionMode>,
    user_agent: Option<String>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    download_promotion_threshold: Option<usize>,
}

impl ClientConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL.
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Result<Self, RestError> {
        let raw = base_url.as_ref();
        let url = Url::parse(raw).map_err(|e| ConfigurationError::InvalidBaseUrl {
            url: raw.to_string(),
            details: e.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Set the base URL (infallible version).
    pub fn base_url_parsed(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Add a default header.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Set the highest status code treated as success.
    pub fn max_success_status(mut self, status: u16) -> Self {
        self.max_success_status = Some(status);
        self
    }

    /// Set the session mode.
    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Use a background session.
    pub fn background(self, enabled: bool) -> Self {
        self.mode(if enabled {
            SessionMode::Background
        } else {
            SessionMode::Foreground
        })
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the download promotion threshold in bytes.
    pub fn download_promotion_threshold(mut self, bytes: usize) -> Self {
        self.download_promotion_threshold = Some(bytes);
        self
    }

    /// Load settings from environment variables.
    ///
    /// Reads `RESTWIRE_BASE_URL`, `RESTWIRE_MAX_SUCCESS_STATUS` and
    /// `RESTWIRE_BACKGROUND`. Unparseable values are ignored.
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("RESTWIRE_BASE_URL") {
            if let Ok(url) = Url::parse(&val) {
                self.base_url = Some(url);
            }
        }
        if let Ok(val) = std::env::var("RESTWIRE_MAX_SUCCESS_STATUS") {
            if let Ok(status) = val.parse() {
                self.max_success_status = Some(status);
            }
        }
        if let Ok(val) = std::env::var("RESTWIRE_BACKGROUND") {
            self = self.background(val.to_lowercase() == "true");
        }

        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClientConfig, RestError> {
        let defaults = ClientConfig::default();

        let max_success_status = self
            .max_success_status
            .unwrap_or(defaults.max_success_status);
        if !(100..=599).contains(&max_success_status) {
            return Err(ConfigurationError::InvalidValue {
                field: "max_success_status".to_string(),
                message: format!("{} is not an HTTP status code", max_success_status),
            }
            .into());
        }

        if self.download_promotion_threshold == Some(0) {
            return Err(ConfigurationError::InvalidValue {
                field: "download_promotion_threshold".to_string(),
                message: "Threshold must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(ClientConfig {
            base_url: self.base_url,
            default_headers: self.default_headers,
            max_success_status,
            mode: self.mode.unwrap_or(defaults.mode),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            read_timeout: self.read_timeout.unwrap_or(defaults.read_timeout),
            download_promotion_threshold: self.download_promotion_threshold,
        })
    }
}
