//! `multipart/form-data` bodies.

use crate::encoding::{flatten, Params};
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

const CRLF: &[u8] = b"\r\n";

/// Generates a random boundary of the form `------------------------XXXXXXXXYYYYYYYY`.
pub fn generate_boundary() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "------------------------{:08X}{:08X}",
        rng.gen::<u32>(),
        rng.gen::<u32>()
    )
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Form field name.
    pub name: String,
    /// File name, for file parts.
    pub filename: Option<String>,
    /// Part content type.
    pub content_type: Option<String>,
    /// Raw payload.
    pub payload: Bytes,
}

impl Part {
    /// Creates a plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            payload: Bytes::from(value.into()),
        }
    }

    /// Creates a file field.
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            payload: payload.into(),
        }
    }
}

/// Byte layout of each part header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Headers run straight into the payload. A line break follows the
    /// disposition only when a filename is present, and the `Content-Type`
    /// line carries its own.
    #[default]
    Compact,
    /// RFC 7578: every header line ends in CRLF and a blank line precedes
    /// the payload.
    Rfc7578,
}

/// An ordered multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
    framing: Framing,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// Creates an empty form with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    /// Creates an empty form with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
            framing: Framing::default(),
        }
    }

    /// Selects the part header layout.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// The part header layout.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Appends a part.
    pub fn add_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Appends a text field.
    pub fn add_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_part(Part::text(name, value))
    }

    /// Appends a file field.
    pub fn add_file(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        self.add_part(Part::file(name, filename, content_type, payload))
    }

    /// Appends one text field per flattened parameter.
    pub fn add_parameters(mut self, params: &Params) -> Self {
        for (name, value) in flatten(params) {
            self.parts.push(Part::text(name, value));
        }
        self
    }

    /// The boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The parts in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Value for the request `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!(
            "multipart/form-data; charset=utf-8; boundary={}",
            self.boundary
        )
    }

    /// Encodes the form body.
    ///
    /// Output is byte-stable for a given boundary, part order and framing.
    pub fn encode(&self) -> Bytes {
        let rfc = self.framing == Framing::Rfc7578;
        let mut buf = BytesMut::new();

        for (index, part) in self.parts.iter().enumerate() {
            if index > 0 {
                buf.put_slice(CRLF);
            }
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(CRLF);

            buf.put_slice(b"Content-Disposition: form-data; name=\"");
            buf.put_slice(part.name.as_bytes());
            buf.put_slice(b"\"");
            let filename = part.filename.as_deref().filter(|f| !f.is_empty());
            if let Some(filename) = filename {
                buf.put_slice(b"; filename=\"");
                buf.put_slice(filename.as_bytes());
                buf.put_slice(b"\"");
            }
            if rfc || filename.is_some() {
                buf.put_slice(CRLF);
            }

            if let Some(content_type) = part.content_type.as_deref().filter(|t| !t.is_empty()) {
                buf.put_slice(b"Content-Type: ");
                buf.put_slice(content_type.as_bytes());
                buf.put_slice(CRLF);
            }

            if rfc {
                buf.put_slice(CRLF);
            }
            buf.put_slice(&part.payload);
        }

        buf.put_slice(CRLF);
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--");
        buf.put_slice(CRLF);

        buf.freeze()
    }
}
