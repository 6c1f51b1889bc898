//! restwire
//!
//! Substrate for REST clients: deterministic request encoding, a streaming
//! task bridge over an abstract transport, response classification, S3
//! request signing and an OAuth2 authorization-code session.
//!
//! # Features
//!
//! - **Parameter encoding**: sorted, bracket-nested `application/x-www-form-urlencoded`
//! - **Request bodies**: JSON, url-encoded forms and `multipart/form-data`
//! - **Task registry**: transport callbacks resolved into one awaited result
//! - **Classification**: status threshold, content negotiation, typed errors
//! - **S3 signing**: Signature V4 and the legacy `AWS key:signature` scheme
//! - **OAuth2**: authorization-code flow with refresh and bearer injection
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use restwire::{Client, ClientConfig};
//! use restwire::encoding::params;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restwire::RestError> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.example.com/")?
//!         .build()?;
//!     let client = Client::with_reqwest(config)?.with_json_parser();
//!
//!     let response = client.get("items", params([("page", "2")])).await?;
//!     println!("{} {:?}", response.status(), response.parsed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod mocks;
pub mod oauth;
pub mod registry;
pub mod request;
pub mod response;
pub mod signing;
pub mod transport;
pub mod upload;

// Re-export main types at crate root
pub use client::{Client, InFlight, RequestModifier};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use encoding::{form_url_encode, ParamValue, Params};
pub use error::{
    ConfigurationError, FileError, OAuthError, RequestError, ResponseError, RestError, Result,
    SigningError, TransportError,
};
pub use oauth::{OAuthConfig, OAuthSession, SessionState};
pub use registry::{RawResponse, TaskId, TaskRegistry};
pub use request::{Body, Headers, HttpMethod, MultipartForm, Request, RequestBuilder};
pub use response::{classify, JsonResponseParser, ParserRegistry, Response, ResponseParser};
pub use signing::{S3Credentials, S3Signer, SigningMode};
pub use transport::{HttpTransport, ReqwestTransport, SessionMode, TaskEvents};
pub use upload::{S3UploadSession, UploadSession};
