//! File uploads.
//!
//! [`UploadSession`] posts a file as one part of a `multipart/form-data`
//! body. [`S3UploadSession`] PUTs raw bytes to an S3 bucket with a signed
//! request.

mod file_access;
mod s3;

pub use file_access::{read_scoped, ScopedFileAccess, UnrestrictedFileAccess};
pub use s3::{Acl, S3Encryption, S3UploadOptions, S3UploadSession, DEFAULT_S3_ENDPOINT};

use crate::client::Client;
use crate::encoding::Params;
use crate::error::Result;
use crate::request::{Body, HttpMethod, MultipartForm};
use crate::response::Response;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Content type used when the caller gives none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// File name used when the source path has none.
pub const DEFAULT_FILE_NAME: &str = "file.data";

/// A file part to upload.
#[derive(Debug, Clone)]
pub struct UploadPart {
    /// Form field carrying the file.
    pub field_name: String,
    /// Extra text fields.
    pub parameters: Params,
    /// Content type of the file part.
    pub content_type: String,
}

impl UploadPart {
    /// File part under `field_name` with the default content type.
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            parameters: Params::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Set the extra text fields.
    pub fn with_parameters(mut self, parameters: Params) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the content type of the file part.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn into_form(self, file_name: &str, data: Bytes) -> MultipartForm {
        MultipartForm::new()
            .add_file(self.field_name, file_name, self.content_type, data)
            .add_parameters(&self.parameters)
    }
}

/// Multipart uploads over a [`Client`].
#[derive(Clone)]
pub struct UploadSession {
    client: Client,
    file_access: Arc<dyn ScopedFileAccess>,
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl UploadSession {
    /// Create a session with unrestricted file access.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            file_access: Arc::new(UnrestrictedFileAccess),
        }
    }

    /// Set the file access policy.
    pub fn with_file_access(mut self, access: Arc<dyn ScopedFileAccess>) -> Self {
        self.file_access = access;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Uploads the file at `path`.
    pub async fn upload_file(
        &self,
        uri: &str,
        query: Params,
        path: &Path,
        part: UploadPart,
    ) -> Result<Response> {
        let data = read_scoped(self.file_access.as_ref(), path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        self.upload_data(uri, query, &file_name, data, part).await
    }

    /// Uploads in-memory bytes as `file_name`.
    pub async fn upload_data(
        &self,
        uri: &str,
        query: Params,
        file_name: &str,
        data: impl Into<Bytes>,
        part: UploadPart,
    ) -> Result<Response> {
        let form = part.into_form(file_name, data.into());
        self.client
            .request(HttpMethod::Post, uri, query, Body::Multipart(form))
            .await
    }
}
