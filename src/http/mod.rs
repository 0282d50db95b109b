//! Minimal HTTP/1.x request parsing and response building.
//!
//! Only what the SRU variant needs: a complete request (as delimited by
//! [`HttpFramer`](crate::transport::HttpFramer)) is parsed with `httparse`
//! into an owned [`HttpRequest`], and an [`HttpResponse`] is serialised back
//! with an explicit `Content-Length`.

pub mod xml;

use crate::transport::{TransportError, http::MAX_HEADERS};

/// A parsed HTTP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, as sent.
    pub method: String,
    /// Request target (path and query).
    pub target: String,
    /// Minor HTTP version (`0` or `1`).
    pub minor_version: u8,
    /// Header fields in order of appearance.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Parse a complete request.
    ///
    /// # Errors
    /// Returns [`TransportError::Parse`] if the head is invalid and
    /// [`TransportError::MalformedHttp`] if it is incomplete.
    pub fn parse(buf: &[u8]) -> Result<Self, TransportError> {
        let mut fields = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut fields);
        let httparse::Status::Complete(head_len) = req.parse(buf)? else {
            return Err(TransportError::MalformedHttp("incomplete head"));
        };
        let (Some(method), Some(target), Some(minor_version)) = (req.method, req.path, req.version)
        else {
            return Err(TransportError::MalformedHttp("incomplete request line"));
        };
        let headers = req
            .headers
            .iter()
            .map(|header| {
                (
                    header.name.to_owned(),
                    String::from_utf8_lossy(header.value).trim().to_owned(),
                )
            })
            .collect();
        Ok(Self {
            method: method.to_owned(),
            target: target.to_owned(),
            minor_version,
            headers,
            body: buf.get(head_len..).unwrap_or_default().to_vec(),
        })
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path component of the target, without the leading slash.
    #[must_use]
    pub fn path(&self) -> &str {
        let path = self.target.split_once('?').map_or(self.target.as_str(), |(p, _)| p);
        path.trim_start_matches('/')
    }

    /// Form parameters from the query string and, for form-encoded `POST`
    /// bodies, the body.
    #[must_use]
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .target
            .split_once('?')
            .map(|(_, query)| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let form = self
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if form {
            params.extend(url::form_urlencoded::parse(&self.body).into_owned());
        }
        params
    }

    /// Whether the connection stays open after the response.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match connection.as_deref() {
            Some("close") => false,
            Some("keep-alive") => true,
            _ => self.minor_version >= 1,
        }
    }
}

/// An HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Content type of `body`.
    pub content_type: &'static str,
    /// Extra header fields.
    pub headers: Vec<(&'static str, String)>,
    /// Response body.
    pub body: Vec<u8>,
    /// Whether the server closes the connection after sending.
    pub close: bool,
}

impl HttpResponse {
    /// An XML response with status 200.
    #[must_use]
    pub fn xml(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/xml; charset=utf-8",
            headers: Vec::new(),
            body: body.into_bytes(),
            close: false,
        }
    }

    /// A plain-text error response.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            headers: Vec::new(),
            body: format!("{message}\n").into_bytes(),
            close: false,
        }
    }

    /// `405 Method Not Allowed` naming the supported methods.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        let mut response = Self::error(405, "method not allowed");
        response.headers.push(("Allow", "GET, POST".to_owned()));
        response
    }

    /// Serialise status line, headers and body.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = String::new();
        head.push_str(&format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
            self.status,
            reason(self.status),
            self.content_type,
            self.body.len()
        ));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        let connection = if self.close { "close" } else { "keep-alive" };
        head.push_str(&format!("Connection: {connection}\r\n\r\n"));
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}
