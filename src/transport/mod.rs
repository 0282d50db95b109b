//! Message framing for inbound byte streams.
//!
//! The session engine never parses partial messages. A [`Framer`] inspects
//! the buffered bytes of a connection and reports either that more data is
//! needed or that a complete message of `len` bytes sits at the front of the
//! buffer. Two framers exist, one per protocol variant:
//!
//! - [`BinaryFramer`]: a 4-byte big-endian length prefix followed by an
//!   encoded APDU.
//! - [`HttpFramer`]: an HTTP/1.x request head, parsed with `httparse`,
//!   followed by a body delimited by `Content-Length`.
//!
//! [`sniff`] decides the variant from the first bytes of a connection.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

pub mod http;

use thiserror::Error;

pub use self::http::HttpFramer;

/// Length of the binary frame prefix in bytes.
pub const FRAME_PREFIX_LEN: usize = 4;

/// HTTP methods that select the HTTP variant during sniffing.
const HTTP_METHODS: [&[u8]; 6] = [b"GET ", b"POST ", b"HEAD ", b"PUT ", b"DELETE ", b"OPTIONS "];

/// Errors raised while framing an inbound stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// A frame announces more bytes than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Announced size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The HTTP request head is syntactically invalid.
    #[error("malformed http request: {0}")]
    Parse(#[from] httparse::Error),
    /// The HTTP request is well formed but cannot be served.
    #[error("malformed http request: {0}")]
    MalformedHttp(&'static str),
}

/// Framing progress for the front of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The buffer does not yet hold a complete message.
    NeedMore,
    /// A complete message occupies the first `len` bytes; its payload starts
    /// at `payload_offset`.
    Complete {
        /// Total bytes of the message including any prefix.
        len: usize,
        /// Offset of the payload within the message.
        payload_offset: usize,
    },
}

/// Protocol variant spoken on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// Length-prefixed binary APDUs.
    Binary,
    /// HTTP-carried XML requests.
    Http,
}

/// Detects message boundaries in a byte buffer.
pub trait Framer {
    /// Inspect `buf` and report whether a complete message is available.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the buffered bytes can never form a
    /// valid message; the connection must then be dropped.
    fn frame(&self, buf: &[u8]) -> Result<FrameStatus, TransportError>;
}

/// Decide the protocol variant from the first bytes of a connection.
///
/// Returns `None` while the buffer is too short to tell, which only happens
/// when every byte so far is a prefix of an HTTP method token.
#[must_use]
pub fn sniff(buf: &[u8]) -> Option<ProtocolVariant> {
    if buf.is_empty() {
        return None;
    }
    let mut undecided = false;
    for method in HTTP_METHODS {
        if buf.starts_with(method) {
            return Some(ProtocolVariant::Http);
        }
        if method.starts_with(buf) {
            undecided = true;
        }
    }
    if undecided {
        None
    } else {
        Some(ProtocolVariant::Binary)
    }
}

/// Read a big-endian `u32` from the front of `buf`.
#[must_use]
pub fn read_u32(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Prefix `payload` with its length.
///
/// # Errors
/// Returns [`TransportError::FrameTooLarge`] if the payload length does not
/// fit the 32-bit prefix.
pub fn frame_payload(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;
    let mut buf = Vec::with_capacity(FRAME_PREFIX_LEN + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Framer for length-prefixed binary APDUs.
#[derive(Clone, Copy, Debug)]
pub struct BinaryFramer {
    max_frame: usize,
}

impl BinaryFramer {
    /// Create a framer rejecting payloads larger than `max_frame` bytes.
    #[must_use]
    pub const fn new(max_frame: usize) -> Self { Self { max_frame } }
}

impl Framer for BinaryFramer {
    fn frame(&self, buf: &[u8]) -> Result<FrameStatus, TransportError> {
        let Some(announced) = read_u32(buf) else {
            return Ok(FrameStatus::NeedMore);
        };
        let size = announced as usize;
        if size > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                size,
                limit: self.max_frame,
            });
        }
        let len = FRAME_PREFIX_LEN + size;
        if buf.len() < len {
            return Ok(FrameStatus::NeedMore);
        }
        Ok(FrameStatus::Complete {
            len,
            payload_offset: FRAME_PREFIX_LEN,
        })
    }
}
