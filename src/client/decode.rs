//! Typed decoding on top of classified responses.
//!
//! The parsed [`serde_json::Value`] is decoded when present, otherwise the
//! raw body is read as JSON. DELETE, OPTIONS and HEAD treat an empty or
//! whitespace-only body as "no value" rather than an error.

use super::Client;
use crate::encoding::Params;
use crate::error::{ResponseError, Result};
use crate::request::{Body, HttpMethod};
use crate::response::Response;
use serde::de::DeserializeOwned;

/// Decodes a response into `T`.
pub fn decode_response<T: DeserializeOwned>(response: &Response) -> Result<T> {
    let decoded = match response.parsed() {
        Some(value) => serde_json::from_value(value.clone()),
        None if response.is_body_absent() => return Err(ResponseError::ExpectedData.into()),
        None => serde_json::from_slice(response.body()),
    };
    decoded.map_err(|e| {
        ResponseError::ParseFailure {
            message: e.to_string(),
        }
        .into()
    })
}

/// Decodes a response into `T`, mapping an absent body to `None`.
pub fn decode_optional<T: DeserializeOwned>(response: &Response) -> Result<Option<T>> {
    if response.parsed().is_none() && response.is_body_absent() {
        return Ok(None);
    }
    decode_response(response).map(Some)
}

impl Client {
    /// GET and decode the body.
    pub async fn get_decoded<T: DeserializeOwned>(&self, uri: &str, query: Params) -> Result<T> {
        let response = self.get(uri, query).await?;
        decode_response(&response)
    }

    /// POST `body` and decode the response.
    pub async fn post_decoded<T: DeserializeOwned>(&self, uri: &str, body: Body) -> Result<T> {
        let response = self
            .request(HttpMethod::Post, uri, Params::new(), body)
            .await?;
        decode_response(&response)
    }

    /// PUT `body` and decode the response.
    pub async fn put_decoded<T: DeserializeOwned>(&self, uri: &str, body: Body) -> Result<T> {
        let response = self
            .request(HttpMethod::Put, uri, Params::new(), body)
            .await?;
        decode_response(&response)
    }

    /// PATCH `body` and decode the response.
    pub async fn patch_decoded<T: DeserializeOwned>(&self, uri: &str, body: Body) -> Result<T> {
        let response = self
            .request(HttpMethod::Patch, uri, Params::new(), body)
            .await?;
        decode_response(&response)
    }

    /// DELETE and decode the response, if it has a body.
    pub async fn delete_decoded<T: DeserializeOwned>(
        &self,
        uri: &str,
        params: Params,
    ) -> Result<Option<T>> {
        let response = self.delete(uri, params).await?;
        decode_optional(&response)
    }

    /// OPTIONS and decode the response, if it has a body.
    pub async fn options_decoded<T: DeserializeOwned>(
        &self,
        uri: &str,
        query: Params,
    ) -> Result<Option<T>> {
        let response = self.options(uri, query).await?;
        decode_optional(&response)
    }

    /// HEAD and decode the response, if it has a body.
    pub async fn head_decoded<T: DeserializeOwned>(
        &self,
        uri: &str,
        query: Params,
    ) -> Result<Option<T>> {
        let response = self.head(uri, query).await?;
        decode_optional(&response)
    }
}
