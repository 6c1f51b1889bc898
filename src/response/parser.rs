//! Response parsers keyed by content type.

use crate::error::{ResponseError, Result};
use crate::request::Headers;
use bytes::Bytes;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

static JSON_CONTENT_TYPES: Lazy<HashSet<String>> = Lazy::new(|| {
    ["application/json", "text/javascript", "text/json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

static TEXT_CONTENT_TYPES: Lazy<HashSet<String>> =
    Lazy::new(|| ["text/plain"].iter().map(|s| s.to_string()).collect());

/// Returns the media type of a `Content-Type` value without parameters,
/// trimmed and lowercased.
pub fn base_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Decodes response bodies of the content types it accepts.
pub trait ResponseParser: Send + Sync {
    /// Accepted base content types, lowercased.
    fn content_types(&self) -> &HashSet<String>;

    /// Whether the base type of `content_type` is accepted.
    fn is_expected_content_type(&self, content_type: &str) -> bool {
        self.content_types()
            .contains(&base_content_type(content_type))
    }

    /// Parses a body. `Ok(None)` means the body decoded to no value.
    fn parse(&self, body: &Bytes, status: u16, headers: &Headers) -> Result<Option<Value>>;
}

/// JSON parser. Top-level fragments such as `"text"` or `42` are accepted;
/// a literal `null` yields no value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

impl ResponseParser for JsonResponseParser {
    fn content_types(&self) -> &HashSet<String> {
        &JSON_CONTENT_TYPES
    }

    fn parse(&self, body: &Bytes, _status: u16, _headers: &Headers) -> Result<Option<Value>> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ResponseError::ParseFailure {
                message: e.to_string(),
            })?;
        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }
}

/// Plain text parser producing a string value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextResponseParser;

impl ResponseParser for TextResponseParser {
    fn content_types(&self) -> &HashSet<String> {
        &TEXT_CONTENT_TYPES
    }

    fn parse(&self, body: &Bytes, _status: u16, _headers: &Headers) -> Result<Option<Value>> {
        let text = std::str::from_utf8(body).map_err(|e| ResponseError::ParseFailure {
            message: e.to_string(),
        })?;
        Ok(Some(Value::String(text.to_string())))
    }
}

/// Ordered set of parsers. The first parser accepting a content type wins.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ResponseParser>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self
            .parsers
            .iter()
            .flat_map(|p| p.content_types().iter())
            .collect();
        types.sort();
        f.debug_struct("ParserRegistry")
            .field("content_types", &types)
            .finish()
    }
}

impl ParserRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the JSON parser.
    pub fn json() -> Self {
        Self::new().with_parser(JsonResponseParser)
    }

    /// Adds a parser.
    pub fn with_parser<P: ResponseParser + 'static>(mut self, parser: P) -> Self {
        self.parsers.push(Arc::new(parser));
        self
    }

    /// Adds a shared parser.
    pub fn with_shared_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Finds the parser for a `Content-Type` value.
    pub fn select(&self, content_type: &str) -> Option<&dyn ResponseParser> {
        self.parsers
            .iter()
            .find(|p| p.is_expected_content_type(content_type))
            .map(|p| &**p)
    }

    /// Whether no parser is registered.
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
