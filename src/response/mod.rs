//! Response classification.
//!
//! [`classify`] turns a [`RawResponse`] into a [`Response`] or a structured
//! error. Order of checks:
//!
//! 1. `304 Not Modified` is returned unparsed.
//! 2. An empty body is returned unparsed.
//! 3. A response without `Content-Type` is returned unparsed.
//! 4. With parsers configured, an unaccepted content type fails with
//!    [`ResponseError::UnexpectedContentType`]. For `text/html` the decoded
//!    page is carried in the error.
//! 5. The selected parser decodes the body.
//! 6. A status above the success threshold fails with
//!    [`ResponseError::HttpStatus`].
//! 7. Otherwise the parsed value (if any) is returned alongside the raw body.

mod parser;

pub use parser::{
    base_content_type, JsonResponseParser, ParserRegistry, ResponseParser, TextResponseParser,
};

use crate::error::{ResponseError, Result};
use crate::registry::RawResponse;
use crate::request::Headers;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, trace};

/// Default maximum successful status code.
pub const DEFAULT_MAX_SUCCESS_STATUS: u16 = 399;

/// A classified response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
    parsed: Option<Value>,
}

impl Response {
    /// Creates a response from parts.
    pub fn new(status: u16, headers: Headers, body: Bytes, parsed: Option<Value>) -> Self {
        Self {
            status,
            headers,
            body,
            parsed,
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parsed value, when a parser produced one.
    pub fn parsed(&self) -> Option<&Value> {
        self.parsed.as_ref()
    }

    /// Takes the parsed value.
    pub fn into_parsed(self) -> Option<Value> {
        self.parsed
    }

    /// Body as UTF-8 text, if valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Whether the body is empty or whitespace only.
    pub fn is_body_absent(&self) -> bool {
        self.body.iter().all(|b| b.is_ascii_whitespace())
    }
}

impl From<RawResponse> for Response {
    fn from(raw: RawResponse) -> Self {
        Response::new(raw.status, raw.headers, raw.body, None)
    }
}

/// Classifies a raw transport result.
pub fn classify(
    raw: RawResponse,
    parsers: Option<&ParserRegistry>,
    max_success_status: u16,
) -> Result<Response> {
    if raw.status == 304 || raw.body.is_empty() {
        trace!(status = raw.status, "Returning bodiless response unparsed");
        return Ok(raw.into());
    }

    let Some(content_type) = raw.headers.content_type().map(str::to_string) else {
        trace!(status = raw.status, "No content type, returning raw body");
        return Ok(raw.into());
    };

    let parser = match parsers.filter(|registry| !registry.is_empty()) {
        None => None,
        Some(registry) => match registry.select(&content_type) {
            Some(parser) => Some(parser),
            None => {
                let failure = if base_content_type(&content_type) == "text/html" {
                    decode_text(&raw.body, &content_type)
                } else {
                    String::new()
                };
                debug!(status = raw.status, %content_type, "Unexpected content type");
                return Err(ResponseError::UnexpectedContentType {
                    content_type,
                    failure,
                }
                .into());
            }
        },
    };

    let parsed = match parser {
        Some(parser) => parser.parse(&raw.body, raw.status, &raw.headers)?,
        None => None,
    };

    if raw.status > max_success_status {
        let parsed = parsed.filter(|value| !value_equals_body(value, &raw.body));
        debug!(status = raw.status, "Response status exceeds success threshold");
        return Err(ResponseError::HttpStatus {
            status: raw.status,
            description: status_description(raw.status),
            body: raw.body,
            parsed,
        }
        .into());
    }

    Ok(Response::new(raw.status, raw.headers, raw.body, parsed))
}

fn value_equals_body(value: &Value, body: &Bytes) -> bool {
    matches!(value, Value::String(s) if s.as_bytes() == body.as_ref())
}

/// Reason phrase for a status code.
pub fn status_description(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Character sets recognized in a `charset=` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8, the default.
    Utf8,
    /// UTF-16, byte order from the BOM, big-endian without one.
    Utf16,
    /// UTF-32, byte order from the BOM, big-endian without one.
    Utf32,
    /// 7-bit ASCII.
    Ascii,
}

impl Charset {
    /// Sniffs the charset from a `Content-Type` value.
    pub fn from_content_type(content_type: &str) -> Self {
        let lower = content_type.to_ascii_lowercase();
        let Some(index) = lower.find("charset=") else {
            return Charset::Utf8;
        };
        let value = lower[index + "charset=".len()..]
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');

        match value {
            "utf-16" | "utf16" => Charset::Utf16,
            "utf-32" | "utf32" => Charset::Utf32,
            "ascii" | "us-ascii" => Charset::Ascii,
            _ => Charset::Utf8,
        }
    }

    /// Decodes `bytes`, returning `None` when they are invalid.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Charset::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            Charset::Utf16 => decode_utf16(bytes),
            Charset::Utf32 => decode_utf32(bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let (little_endian, data) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, bytes),
    };
    let units = data.chunks_exact(2).map(|pair| {
        let pair = [pair[0], pair[1]];
        if little_endian {
            u16::from_le_bytes(pair)
        } else {
            u16::from_be_bytes(pair)
        }
    });
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

fn decode_utf32(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    let (little_endian, data) = match bytes {
        [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => (true, rest),
        [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, bytes),
    };
    data.chunks_exact(4)
        .map(|quad| {
            let quad = [quad[0], quad[1], quad[2], quad[3]];
            let scalar = if little_endian {
                u32::from_le_bytes(quad)
            } else {
                u32::from_be_bytes(quad)
            };
            char::from_u32(scalar)
        })
        .collect()
}

/// Decodes a body using the charset of its content type. Undecodable bytes
/// produce an empty string.
pub fn decode_text(body: &[u8], content_type: &str) -> String {
    Charset::from_content_type(content_type)
        .decode(body)
        .unwrap_or_default()
}
