//! Framing for HTTP/1.x requests.
//!
//! A request is complete once `httparse` accepts the header block and
//! `Content-Length` bytes of body are buffered. Chunked bodies are not
//! accepted.

use super::{FrameStatus, Framer, TransportError};

/// Most header fields accepted in one request.
pub const MAX_HEADERS: usize = 64;

/// Framer for HTTP requests.
#[derive(Clone, Copy, Debug)]
pub struct HttpFramer {
    max_request: usize,
}

impl HttpFramer {
    /// Create a framer rejecting requests larger than `max_request` bytes.
    #[must_use]
    pub const fn new(max_request: usize) -> Self { Self { max_request } }

    const fn too_large(&self, size: usize) -> TransportError {
        TransportError::FrameTooLarge {
            size,
            limit: self.max_request,
        }
    }
}

/// Body length announced by a parsed header block.
///
/// # Errors
/// Returns [`TransportError::MalformedHttp`] for unparsable lengths or
/// chunked transfer encoding.
pub fn content_length(headers: &[httparse::Header<'_>]) -> Result<usize, TransportError> {
    let mut length = 0;
    for header in headers {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| TransportError::MalformedHttp("non-utf8 header value"))?
            .trim();
        if header.name.eq_ignore_ascii_case("content-length") {
            length = value
                .parse()
                .map_err(|_| TransportError::MalformedHttp("bad content-length"))?;
        } else if header.name.eq_ignore_ascii_case("transfer-encoding")
            && value.eq_ignore_ascii_case("chunked")
        {
            return Err(TransportError::MalformedHttp("chunked bodies unsupported"));
        }
    }
    Ok(length)
}

impl Framer for HttpFramer {
    fn frame(&self, buf: &[u8]) -> Result<FrameStatus, TransportError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let httparse::Status::Complete(head_len) = req.parse(buf)? else {
            if buf.len() > self.max_request {
                return Err(self.too_large(buf.len()));
            }
            return Ok(FrameStatus::NeedMore);
        };
        let len = head_len.saturating_add(content_length(req.headers)?);
        if len > self.max_request {
            return Err(self.too_large(len));
        }
        if buf.len() < len {
            return Ok(FrameStatus::NeedMore);
        }
        Ok(FrameStatus::Complete {
            len,
            payload_offset: 0,
        })
    }
}
