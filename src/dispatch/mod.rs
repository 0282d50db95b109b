//! Operation dispatch.
//!
//! [`handle_apdu`] maps one decoded request onto its operation, calls the
//! backend and builds exactly one response. It performs no I/O; the
//! association decides what to do with the returned [`Outcome`]. The HTTP
//! variant is served by [`sru::handle_http`].

mod handlers;
pub mod sru;

use std::{collections::HashMap, net::SocketAddr};

use tracing::debug;

use crate::{
    apdu::{Apdu, Diagnostic},
    backend::{Backend, InitInfo},
    engine::EngineConfig,
    options::Options,
    protocol,
};

/// What the association should do after a request was handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Send the response; the session state is unchanged.
    Reply(Apdu),
    /// Send the Init response; the session is now established.
    Established(Apdu),
    /// Send the response, then close the association.
    Closing(Apdu),
    /// The peer violated the protocol; no response is built.
    ProtocolError(&'static str),
}

/// Per-association protocol state.
pub struct Session {
    peer: Option<SocketAddr>,
    version: Option<u8>,
    preferred_message_size: u32,
    maximum_record_size: u32,
    options: Options,
    backend: Option<Box<dyn Backend>>,
    result_sets: HashMap<String, i64>,
    last_record_seen: u32,
}

impl Session {
    /// Fresh session for a client at `peer`.
    #[must_use]
    pub fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            peer,
            version: None,
            preferred_message_size: 0,
            maximum_record_size: 0,
            options: Options::empty(),
            backend: None,
            result_sets: HashMap::new(),
            last_record_seen: 0,
        }
    }

    /// Whether Init completed successfully.
    #[must_use]
    pub const fn is_established(&self) -> bool { self.version.is_some() }

    /// Negotiated protocol version.
    #[must_use]
    pub const fn version(&self) -> Option<u8> { self.version }

    /// Whether the negotiated version supports an explicit `Close`.
    #[must_use]
    pub fn supports_close(&self) -> bool { self.version.is_some_and(protocol::supports_close) }

    /// Agreed service options.
    #[must_use]
    pub const fn options(&self) -> Options { self.options }

    /// Negotiated preferred message size.
    #[must_use]
    pub const fn preferred_message_size(&self) -> u32 { self.preferred_message_size }

    /// Negotiated exceptional record size.
    #[must_use]
    pub const fn maximum_record_size(&self) -> u32 { self.maximum_record_size }

    /// Last record position handed to the client.
    #[must_use]
    pub const fn last_record_seen(&self) -> u32 { self.last_record_seen }

    /// Hit count of a result set created in this session.
    #[must_use]
    pub fn result_set(&self, name: &str) -> Option<i64> { self.result_sets.get(name).copied() }

    /// Release the backend handle, if any.
    pub fn close_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
            debug!(peer = ?self.peer, "backend closed");
        }
        self.result_sets.clear();
    }

    /// Backend handle for stateless requests, created on first use with the
    /// server's own limits.
    ///
    /// # Errors
    /// Returns the factory's diagnostic if the backend refuses the session.
    pub fn ensure_backend(
        &mut self,
        cfg: &EngineConfig,
    ) -> Result<&mut (dyn Backend + 'static), Diagnostic> {
        if self.backend.is_none() {
            let info = InitInfo {
                peer: self.peer,
                ..InitInfo::default()
            };
            self.backend = Some(cfg.backend.init(&info)?);
            self.preferred_message_size = cfg.preferred_message_size;
            self.maximum_record_size = cfg.maximum_record_size;
            self.options = cfg.backend.capabilities();
        }
        self.backend
            .as_deref_mut()
            .ok_or_else(|| Diagnostic::new(crate::apdu::diagnostic::bib1::PERMANENT_SYSTEM_ERROR))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("version", &self.version)
            .field("options", &self.options)
            .field("result_sets", &self.result_sets)
            .finish_non_exhaustive()
    }
}

/// Handle one decoded request.
pub fn handle_apdu(cfg: &EngineConfig, session: &mut Session, apdu: Apdu) -> Outcome {
    debug!(peer = ?session.peer, kind = apdu.kind(), "request");
    if !session.is_established() && !matches!(apdu, Apdu::InitRequest(_)) {
        return Outcome::ProtocolError("request before init");
    }
    match apdu {
        Apdu::InitRequest(_) if session.is_established() => Outcome::ProtocolError("repeated init"),
        Apdu::InitRequest(req) => handlers::init(cfg, session, req),
        Apdu::SearchRequest(req) => {
            Outcome::Reply(Apdu::SearchResponse(handlers::search(cfg, session, &req)))
        }
        Apdu::PresentRequest(req) => {
            Outcome::Reply(Apdu::PresentResponse(handlers::present(session, &req)))
        }
        Apdu::ScanRequest(req) => {
            Outcome::Reply(Apdu::ScanResponse(handlers::scan(cfg, session, &req)))
        }
        Apdu::SortRequest(req) => Outcome::Reply(Apdu::SortResponse(handlers::sort(session, &req))),
        Apdu::DeleteResultSetRequest(req) => {
            Outcome::Reply(Apdu::DeleteResultSetResponse(handlers::delete(session, &req)))
        }
        Apdu::ExtendedServicesRequest(req) => Outcome::Reply(Apdu::ExtendedServicesResponse(
            handlers::extended_services(session, &req),
        )),
        Apdu::Close(close) => handlers::close(session, &close),
        Apdu::InitResponse(_)
        | Apdu::SearchResponse(_)
        | Apdu::PresentResponse(_)
        | Apdu::ScanResponse(_)
        | Apdu::SortResponse(_)
        | Apdu::DeleteResultSetResponse(_)
        | Apdu::ExtendedServicesResponse(_) => Outcome::ProtocolError("response sent to server"),
    }
}

#[cfg(test)]
mod tests;
