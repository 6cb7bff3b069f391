//! Decoded HTTP response objects.
//!
//! The wire codec turns raw bytes into a sequence of [`HttpObject`]s per
//! stream: zero or more informational header blocks, one final header
//! block, body chunks, and optionally a trailer block.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A header block carrying a response status.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeaders {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHeaders {
    /// Create a header block with the given status and headers.
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// Create a header block with the given status and no headers.
    pub fn of(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new())
    }

    /// Get the response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` for provisional (1xx) header blocks.
    pub fn is_informational(&self) -> bool {
        self.status.is_informational()
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Decompose into status and headers.
    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

/// A chunk of response body.
///
/// The payload is reference counted; dropping the last handle releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpData {
    data: Bytes,
    end_of_stream: bool,
}

impl HttpData {
    /// Create a body chunk.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            end_of_stream: false,
        }
    }

    /// Create a body chunk from a static byte slice.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    /// Mark this chunk as the last frame of the stream.
    pub fn with_end_of_stream(mut self, end_of_stream: bool) -> Self {
        self.end_of_stream = end_of_stream;
        self
    }

    /// Returns `true` if the codec saw the end of stream with this chunk.
    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a reference to the payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the chunk and return its payload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// One decoded protocol event belonging to a single response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpObject {
    /// An informational or final header block.
    Headers(ResponseHeaders),
    /// A body chunk.
    Data(HttpData),
    /// A trailer block terminating the body.
    Trailers(HeaderMap),
}

impl HttpObject {
    /// Returns `true` for header and trailer blocks.
    pub fn is_header_block(&self) -> bool {
        !matches!(self, HttpObject::Data(_))
    }

    /// Number of body bytes this object carries.
    pub fn content_len(&self) -> usize {
        match self {
            HttpObject::Data(data) => data.len(),
            HttpObject::Headers(_) | HttpObject::Trailers(_) => 0,
        }
    }

    /// Drop this object, releasing any buffer it holds.
    pub fn release(self) {
        drop(self);
    }
}

impl From<ResponseHeaders> for HttpObject {
    fn from(headers: ResponseHeaders) -> Self {
        HttpObject::Headers(headers)
    }
}

impl From<HttpData> for HttpObject {
    fn from(data: HttpData) -> Self {
        HttpObject::Data(data)
    }
}
