//! Signed uploads to S3.

use super::{read_scoped, ScopedFileAccess, UnrestrictedFileAccess, DEFAULT_CONTENT_TYPE};
use crate::client::Client;
use crate::error::{ConfigurationError, RequestError, Result};
use crate::registry::RawResponse;
use crate::request::{Headers, HttpMethod, Request};
use crate::signing::S3Signer;
use bytes::Bytes;
use chrono::Duration;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Default S3 endpoint.
pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Canned object ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acl {
    /// Owner-only access.
    #[default]
    Private,
    /// World-readable.
    PublicRead,
}

impl Acl {
    /// Header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

/// Server-side encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum S3Encryption {
    /// No encryption header.
    #[default]
    None,
    /// SSE-S3.
    Aes256,
}

impl S3Encryption {
    /// Header value, if any.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            S3Encryption::None => None,
            S3Encryption::Aes256 => Some("AES256"),
        }
    }
}

/// Per-upload options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3UploadOptions {
    /// Object ACL.
    pub acl: Acl,
    /// Server-side encryption.
    pub encryption: S3Encryption,
    /// Validity of a legacy signature.
    pub expires: Duration,
    /// Object content type.
    pub content_type: String,
}

impl Default for S3UploadOptions {
    fn default() -> Self {
        Self {
            acl: Acl::Private,
            encryption: S3Encryption::None,
            expires: Duration::seconds(3600),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl S3UploadOptions {
    /// Set the ACL.
    pub fn acl(mut self, acl: Acl) -> Self {
        self.acl = acl;
        self
    }

    /// Set server-side encryption.
    pub fn encryption(mut self, encryption: S3Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the legacy signature validity.
    pub fn expires(mut self, expires: Duration) -> Self {
        self.expires = expires;
        self
    }

    /// Set the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Uploads objects with requests signed by one [`S3Signer`].
#[derive(Clone)]
pub struct S3UploadSession {
    signer: S3Signer,
    client: Client,
    endpoint: Url,
    file_access: Arc<dyn ScopedFileAccess>,
}

impl std::fmt::Debug for S3UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3UploadSession")
            .field("signer", &self.signer)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl S3UploadSession {
    /// Create a session against the default endpoint.
    pub fn new(signer: S3Signer, client: Client) -> Result<Self> {
        Ok(Self {
            signer,
            client,
            endpoint: parse_endpoint(DEFAULT_S3_ENDPOINT)?,
            file_access: Arc::new(UnrestrictedFileAccess),
        })
    }

    /// Use another S3-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    /// Set the file access policy.
    pub fn with_file_access(mut self, access: Arc<dyn ScopedFileAccess>) -> Self {
        self.file_access = access;
        self
    }

    /// The endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The signer.
    pub fn signer(&self) -> &S3Signer {
        &self.signer
    }

    /// Uploads the file at `file` to `bucket` under `path`, which must start
    /// with `/`.
    pub async fn upload(
        &self,
        file: &Path,
        bucket: &str,
        path: &str,
        options: &S3UploadOptions,
    ) -> Result<RawResponse> {
        let data = read_scoped(self.file_access.as_ref(), file).await?;
        self.upload_data(data, bucket, path, options).await
    }

    /// Uploads `data` to `bucket` under `path`.
    pub async fn upload_data(
        &self,
        data: impl Into<Bytes>,
        bucket: &str,
        path: &str,
        options: &S3UploadOptions,
    ) -> Result<RawResponse> {
        let request = self.build_request(data.into(), bucket, path, options)?;
        let signed = self
            .signer
            .authorize_with_expiry(request, options.expires)?;
        debug!(url = %signed.url(), acl = options.acl.as_str(), "Uploading object");
        self.client.perform(signed).await
    }

    /// Builds the unsigned PUT request.
    pub fn build_request(
        &self,
        data: Bytes,
        bucket: &str,
        path: &str,
        options: &S3UploadOptions,
    ) -> Result<Request> {
        let target = format!("/{}{}", bucket, path);
        let url = self
            .endpoint
            .join(&target)
            .map_err(|e| RequestError::InvalidUrl {
                url: target.clone(),
                details: e.to_string(),
            })?;

        let mut headers = Headers::new()
            .with("Content-Type", options.content_type.clone())
            .with("Content-Length", data.len().to_string())
            .with("X-Amz-Acl", options.acl.as_str());
        if let Some(encryption) = options.encryption.header_value() {
            headers.insert("X-amz-server-side-encryption", encryption);
        }

        Ok(Request::new(HttpMethod::Put, url, headers, Some(data)))
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).map_err(|e| {
        ConfigurationError::InvalidBaseUrl {
            url: endpoint.to_string(),
            details: e.to_string(),
        }
        .into()
    })
}
