//! Request construction.
//!
//! A [`RequestBuilder`] turns a method, URI, query mapping and [`Body`] into an
//! immutable [`Request`] ready for the transport. Body rules per method:
//!
//! | method              | none | form | JSON | multipart |
//! |---------------------|------|------|------|-----------|
//! | GET / OPTIONS / HEAD | yes | no   | no   | no        |
//! | POST / PUT / PATCH  | yes  | yes  | yes  | yes       |
//! | DELETE              | yes (empty form) | yes | no | no |

mod multipart;

pub use multipart::{generate_boundary, Framing, MultipartForm, Part};

use crate::encoding::{form_url_encode, Params};
use crate::error::{RequestError, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
}

impl HttpMethod {
    /// The method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Whether the method never carries a body.
    pub fn is_bodyless(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Options | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header mapping with case-insensitive names. Names are stored lowercased
/// and the last write for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: BTreeMap<String, String>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value for the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`Headers::insert`].
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Gets a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Removes a header.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    /// Whether the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Copies every header from `other`, overwriting duplicates.
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.inner.insert(name.to_string(), value.to_string());
        }
    }

    /// Iterates headers in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Lowercased header names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        self.inner.keys().map(String::as_str).collect()
    }

    /// The `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A JSON request body.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBody {
    /// A value serialized on build.
    Value(Value),
    /// Pre-encoded bytes sent unchanged.
    Raw(Bytes),
}

impl From<Value> for JsonBody {
    fn from(value: Value) -> Self {
        JsonBody::Value(value)
    }
}

/// Request body variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    None,
    /// `application/x-www-form-urlencoded` mapping.
    Form(Params),
    /// JSON value or raw JSON bytes.
    Json(JsonBody),
    /// `multipart/form-data` parts.
    Multipart(MultipartForm),
}

impl Body {
    /// Serializes any `Serialize` value as a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| RequestError::BodyEncoding {
            message: e.to_string(),
        })?;
        Ok(Body::Json(JsonBody::Value(value)))
    }

    /// Raw JSON bytes.
    pub fn raw_json(bytes: impl Into<Bytes>) -> Self {
        Body::Json(JsonBody::Raw(bytes.into()))
    }

    fn kind(&self) -> &'static str {
        match self {
            Body::None => "none",
            Body::Form(_) => "form",
            Body::Json(_) => "json",
            Body::Multipart(_) => "multipart",
        }
    }
}

/// A fully built request. Immutable apart from the consuming `with_*`
/// methods used by request modifiers and signers.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: HttpMethod,
    url: Url,
    headers: Headers,
    body: Option<Bytes>,
}

impl Request {
    /// Creates a request from parts.
    pub fn new(method: HttpMethod, url: Url, headers: Headers, body: Option<Bytes>) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// The request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The absolute request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The request body.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Returns the request with a header set.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the request with a new URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Returns the request with a new body.
    pub fn with_body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }

    /// Returns the request with a query pair appended.
    pub fn with_query_pair(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: HttpMethod,
    uri: String,
    base_url: Option<Url>,
    query: Params,
    headers: Headers,
    body: Body,
}

impl RequestBuilder {
    /// Starts a request for `uri`, absolute or relative to the base URL.
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            base_url: None,
            query: Params::new(),
            headers: Headers::new(),
            body: Body::None,
        }
    }

    /// Base URL used to resolve a relative URI.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Query parameters appended to the URL.
    pub fn query(mut self, query: Params) -> Self {
        self.query = query;
        self
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merges headers.
    pub fn headers(mut self, headers: &Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Sets a JSON value body.
    pub fn json(self, value: Value) -> Self {
        self.body(Body::Json(JsonBody::Value(value)))
    }

    /// Sets a form body.
    pub fn form(self, params: Params) -> Self {
        self.body(Body::Form(params))
    }

    /// Sets a multipart body.
    pub fn multipart(self, form: MultipartForm) -> Self {
        self.body(Body::Multipart(form))
    }

    /// Builds the request.
    pub fn build(self) -> Result<Request> {
        let method = self.method;
        let mut url = resolve_url(&self.uri, self.base_url.as_ref())?;

        if let Some(query) = form_url_encode(&self.query).filter(|q| !q.is_empty()) {
            let joined = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
                _ => query,
            };
            url.set_query(Some(&joined));
        }

        let mut headers = self.headers;
        let body = encode_body(method, self.body, &mut headers)?;

        Ok(Request {
            method,
            url,
            headers,
            body,
        })
    }
}

fn resolve_url(uri: &str, base_url: Option<&Url>) -> Result<Url> {
    let invalid = |details: String| RequestError::InvalidUrl {
        url: uri.to_string(),
        details,
    };

    match Url::parse(uri) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base_url {
            Some(base) => base.join(uri).map_err(|e| invalid(e.to_string()).into()),
            None => Err(invalid("relative URL without a base URL".to_string()).into()),
        },
        Err(e) => Err(invalid(e.to_string()).into()),
    }
}

fn encode_body(method: HttpMethod, body: Body, headers: &mut Headers) -> Result<Option<Bytes>> {
    let reject = |body: &Body| RequestError::InvalidBodyParameter {
        method: format!("{} ({} body)", method, body.kind()),
    };

    match (method, body) {
        (_, Body::None) if method != HttpMethod::Delete => Ok(None),
        (HttpMethod::Delete, Body::None) => encode_form(&Params::new(), headers),
        (m, body) if m.is_bodyless() => Err(reject(&body).into()),

        (HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch, Body::Json(json)) => {
            let bytes = match json {
                JsonBody::Value(value) => {
                    Bytes::from(serde_json::to_vec(&value).map_err(|e| {
                        RequestError::BodyEncoding {
                            message: e.to_string(),
                        }
                    })?)
                }
                JsonBody::Raw(raw) => raw,
            };
            headers.insert("Content-Type", "application/json; charset=utf-8");
            headers.insert("Data-Type", "json");
            Ok(Some(bytes))
        }

        (_, Body::Form(params)) => encode_form(&params, headers),

        (HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch, Body::Multipart(form)) => {
            headers.insert("Content-Type", form.content_type());
            Ok(Some(form.encode()))
        }

        (_, body) => Err(reject(&body).into()),
    }
}

fn encode_form(params: &Params, headers: &mut Headers) -> Result<Option<Bytes>> {
    let encoded = form_url_encode(params).unwrap_or_default();
    headers.insert("Content-Type", "application/x-www-form-urlencoded");
    headers.insert("Content-Transfer-Encoding", "8bit");
    headers.insert("Content-Length", encoded.len().to_string());
    Ok(Some(Bytes::from(encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::params;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://api.example.com/v1/").unwrap()
    }

    #[test]
    fn test_get_without_query_leaves_url_unchanged() {
        let request = RequestBuilder::new(HttpMethod::Get, "https://api.example.com/items")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "https://api.example.com/items");
        assert!(request.body().is_none());
    }

    #[test]
    fn test_get_query_appended() {
        let request = RequestBuilder::new(HttpMethod::Get, "items")
            .base_url(base())
            .query(params([("b", "2"), ("a", "x y")]))
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v1/items?a=x%20y&b=2"
        );
    }

    #[test]
    fn test_query_joined_to_existing() {
        let request = RequestBuilder::new(HttpMethod::Get, "https://h.example/p?x=1")
            .query(params([("y", "2")]))
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("x=1&y=2"));
    }

    #[test]
    fn test_get_rejects_body() {
        let result = RequestBuilder::new(HttpMethod::Head, "https://h.example/")
            .json(json!({"a": 1}))
            .build();
        assert!(matches!(
            result,
            Err(crate::RestError::Request(RequestError::InvalidBodyParameter { .. }))
        ));
    }

    #[test]
    fn test_json_body() {
        let request = RequestBuilder::new(HttpMethod::Post, "https://h.example/")
            .json(json!({"key": "value"}))
            .build()
            .unwrap();
        assert_eq!(request.body().unwrap().as_ref(), br#"{"key":"value"}"#);
        assert_eq!(
            request.headers().content_type(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(request.headers().get("data-type"), Some("json"));
    }

    #[test]
    fn test_raw_json_passes_through() {
        let request = RequestBuilder::new(HttpMethod::Patch, "https://h.example/")
            .body(Body::raw_json(&b"[1, 2]"[..]))
            .build()
            .unwrap();
        assert_eq!(request.body().unwrap().as_ref(), b"[1, 2]");
    }

    #[test]
    fn test_delete_json_rejected() {
        let result = RequestBuilder::new(HttpMethod::Delete, "https://h.example/")
            .json(json!({}))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_form_body_headers() {
        let request = RequestBuilder::new(HttpMethod::Put, "https://h.example/")
            .form(params([("name", "a&b")]))
            .build()
            .unwrap();
        assert_eq!(request.body().unwrap().as_ref(), b"name=a%26b");
        assert_eq!(
            request.headers().content_type(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.headers().get("Content-Transfer-Encoding"), Some("8bit"));
        assert_eq!(request.headers().get("content-length"), Some("10"));
    }

    #[test]
    fn test_delete_without_body_sends_empty_form() {
        let request = RequestBuilder::new(HttpMethod::Delete, "https://h.example/x")
            .build()
            .unwrap();
        assert_eq!(request.body().unwrap().len(), 0);
        assert_eq!(request.headers().get("Content-Length"), Some("0"));
    }

    #[test]
    fn test_multipart_content_type() {
        let form = MultipartForm::with_boundary("BOUNDARY").add_text("a", "b");
        let request = RequestBuilder::new(HttpMethod::Post, "https://h.example/")
            .multipart(form.clone())
            .build()
            .unwrap();
        assert_eq!(
            request.headers().content_type(),
            Some("multipart/form-data; charset=utf-8; boundary=BOUNDARY")
        );
        assert_eq!(request.body(), Some(&form.encode()));
    }

    #[test]
    fn test_relative_without_base_is_invalid() {
        let result = RequestBuilder::new(HttpMethod::Get, "items").build();
        assert!(matches!(
            result,
            Err(crate::RestError::Request(RequestError::InvalidUrl { .. }))
        ));
    }

    #[test]
    fn test_headers_case_insensitive_last_write_wins() {
        let headers = Headers::new()
            .with("X-Token", "one")
            .with("x-token", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-TOKEN"), Some("two"));
    }
}
