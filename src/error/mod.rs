//! Error types for restwire.
//!
//! Errors are grouped by the pipeline stage that produced them: building the
//! request, moving bytes over the transport, classifying the response,
//! reading upload sources, signing, and the OAuth session.

use crate::registry::TaskId;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for restwire.
#[derive(Debug, Error)]
pub enum RestError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Request construction errors.
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Transport and task bridging errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Response classification errors.
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// Upload source errors.
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// Object-storage signing errors.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// OAuth session errors.
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),
}

impl RestError {
    /// Returns the HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RestError::Response(ResponseError::HttpStatus { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the underlying transport task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestError::Transport(TransportError::Cancelled))
    }

    /// Returns the raw response body attached to a status error.
    pub fn response_body(&self) -> Option<&Bytes> {
        match self {
            RestError::Response(ResponseError::HttpStatus { body, .. }) => Some(body),
            _ => None,
        }
    }

    /// Returns the parsed error object attached to a status error.
    pub fn response_object(&self) -> Option<&Value> {
        match self {
            RestError::Response(ResponseError::HttpStatus { parsed, .. }) => parsed.as_ref(),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The base URL could not be parsed.
    #[error("Invalid base URL '{url}': {details}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        details: String,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {variable}")]
    MissingEnvironment {
        /// The variable name.
        variable: String,
    },

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue {
        /// The configuration field name.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Request construction errors.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URL (after base resolution and query encoding) is not valid.
    #[error("An invalid URL was passed for this request: '{url}' ({details})")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        details: String,
    },

    /// The body variant is not accepted for the method.
    #[error("An invalid body parameter was passed for this {method} request")]
    InvalidBodyParameter {
        /// The request method.
        method: String,
    },

    /// The body could not be serialized.
    #[error("Body encoding failed: {message}")]
    BodyEncoding {
        /// Details about the encoding failure.
        message: String,
    },
}

/// Transport and task registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport returned something other than an HTTP response.
    #[error("An invalid response type was received: {message}")]
    InvalidResponseType {
        /// Details about the response.
        message: String,
    },

    /// The connection could not be established or was lost.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Details about the failure.
        message: String,
    },

    /// The transport gave up waiting.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The configured timeout.
        duration: Duration,
    },

    /// The task was cancelled before it completed.
    #[error("Request was cancelled")]
    Cancelled,

    /// A transport event referenced a task that is not registered.
    #[error("No pending task registered for {task}")]
    UnknownTask {
        /// The task handle.
        task: TaskId,
    },

    /// A task handle was registered twice.
    #[error("A pending task is already registered for {task}")]
    DuplicateTask {
        /// The task handle.
        task: TaskId,
    },

    /// Local I/O failed while spooling a download.
    #[error("I/O error: {message}")]
    Io {
        /// Details about the I/O failure.
        message: String,
    },
}

/// Response classification errors.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The content type is not accepted by any configured parser.
    #[error("The content was not of the expected type ({content_type})")]
    UnexpectedContentType {
        /// The declared content type.
        content_type: String,
        /// Decoded body text for HTML responses, empty otherwise.
        failure: String,
    },

    /// The status code exceeded the success threshold.
    #[error("HTTP {status}: {description}")]
    HttpStatus {
        /// The status code.
        status: u16,
        /// Reason phrase for the status.
        description: String,
        /// The raw response body.
        body: Bytes,
        /// The parsed body, when it differs from the raw body.
        parsed: Option<Value>,
    },

    /// The parser rejected the body.
    #[error("Failed to parse response: {message}")]
    ParseFailure {
        /// Parser message.
        message: String,
    },

    /// A typed decode needed a body but the response had none.
    #[error("The response body was empty")]
    ExpectedData,
}

/// Upload source errors.
#[derive(Debug, Error)]
pub enum FileError {
    /// The file could not be accessed with the current permissions.
    #[error("No permissions to read this file: {path}")]
    AccessDenied {
        /// The file path.
        path: String,
    },

    /// The file could not be read.
    #[error("Failed to read '{path}': {message}")]
    Read {
        /// The file path.
        path: String,
        /// Details about the read failure.
        message: String,
    },
}

/// Object-storage signing errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The request lacks what signing needs (host, method).
    #[error("Incomplete parameters for signing: {message}")]
    IncompleteParameters {
        /// What was missing.
        message: String,
    },

    /// The timestamp could not be used for signing.
    #[error("Invalid timestamp: {message}")]
    InvalidTimestamp {
        /// Details about the timestamp error.
        message: String,
    },
}

/// OAuth session errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// An authorization flow is already in progress or complete.
    #[error("An active auth session is in progress")]
    ActiveAuthSession,

    /// The callback state did not match the pending authorization.
    #[error("Invalid or missing state in the authorization callback")]
    InvalidStateVerification,

    /// The callback carried no authorization code.
    #[error("Invalid or missing code in the authorization callback")]
    InvalidOrMissingCode,

    /// The token endpoint response lacked an access token.
    #[error("Invalid token response")]
    InvalidTokenResponse,

    /// Refresh requires an authorized session with a refresh token.
    #[error("Invalid state for refreshing tokens")]
    InvalidRefreshState,
}

/// Result type alias for restwire operations.
pub type Result<T> = std::result::Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        let err = RestError::Response(ResponseError::HttpStatus {
            status: 503,
            description: "Service Unavailable".to_string(),
            body: Bytes::from_static(b"down"),
            parsed: None,
        });
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.response_body(), Some(&Bytes::from_static(b"down")));
        assert!(err.response_object().is_none());

        let err = RestError::Transport(TransportError::Cancelled);
        assert_eq!(err.status_code(), None);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err: RestError = OAuthError::ActiveAuthSession.into();
        assert_eq!(err.to_string(), "OAuth error: An active auth session is in progress");

        let err: RestError = TransportError::UnknownTask { task: TaskId::from_raw(7) }.into();
        assert!(err.to_string().contains("task-7"));
    }
}
