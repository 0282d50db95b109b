//! One client connection and its protocol state machine.
//!
//! An association starts `New`, becomes `Up` once Init succeeds on the binary
//! variant, and ends `Dead`. A `Dead` association only drains its outgoing
//! queue: any further input, or the close timeout, releases it. The HTTP
//! variant never leaves `New` until a response asks for the connection to be
//! closed.

use std::{
    io::{self, Read, Write},
    net::SocketAddr,
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use mio::{event::Source, net::TcpStream};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::queue::{Request, RequestQueue, RequestState};
use crate::{
    apdu::{Apdu, Close, CloseReason},
    codec::{self, CodecError},
    dispatch::{self, Outcome, Session, sru},
    engine::EngineConfig,
    event::{Channel, ChannelControl, ChannelHandler, Event, EventMask},
    http::{HttpRequest, HttpResponse},
    transport::{
        self,
        BinaryFramer,
        FrameStatus,
        Framer,
        HttpFramer,
        ProtocolVariant,
        TransportError,
    },
};

const READ_CHUNK: usize = 16 * 1024;

/// Lifecycle state of an association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationState {
    /// Connected, no successful Init yet.
    New,
    /// Init succeeded; requests are served.
    Up,
    /// Closing: only pending output is flushed.
    Dead,
}

/// Conditions that end or degrade an association.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Inbound bytes could not be framed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A frame did not decode, or a response did not encode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The peer broke the protocol rules.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}

/// Server side of one client connection.
pub struct Association {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    cfg: Arc<EngineConfig>,
    state: AssociationState,
    variant: Option<ProtocolVariant>,
    inbuf: BytesMut,
    incoming: RequestQueue,
    outgoing: RequestQueue,
    next_id: u64,
    written: usize,
    awaiting_close: bool,
    session: Session,
}

impl Association {
    /// Wrap an accepted, non-blocking stream.
    #[must_use]
    pub fn new(stream: TcpStream, cfg: Arc<EngineConfig>) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream,
            peer,
            cfg,
            state: AssociationState::New,
            variant: None,
            inbuf: BytesMut::with_capacity(READ_CHUNK),
            incoming: RequestQueue::new(),
            outgoing: RequestQueue::new(),
            next_id: 0,
            written: 0,
            awaiting_close: false,
            session: Session::new(peer),
        }
    }

    /// Channel reading input with the configured idle timeout.
    #[must_use]
    pub fn into_channel(self) -> Channel {
        let idle = self.cfg.idle_timeout;
        Channel::new(self, EventMask::INPUT | EventMask::TIMEOUT).with_timeout(idle)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AssociationState { self.state }

    /// Remote address, if known.
    #[must_use]
    pub const fn peer(&self) -> Option<SocketAddr> { self.peer }

    fn next_request(&mut self, raw: Bytes) -> Request {
        self.next_id += 1;
        Request::new(self.next_id, raw)
    }

    fn on_input(&mut self, ctl: &mut ChannelControl<'_>) {
        let eof = match self.fill() {
            Ok(eof) => eof,
            Err(e) => {
                warn!(peer = ?self.peer, error = %e, "read failed");
                self.release(ctl);
                return;
            }
        };
        if self.state == AssociationState::Dead {
            debug!(peer = ?self.peer, discarded = self.inbuf.len(), eof, "input while closing");
            self.inbuf.clear();
            self.awaiting_close = false;
            if self.outgoing.is_empty() {
                self.release(ctl);
            } else {
                self.pump(ctl);
            }
            return;
        }
        let ingested = self.ingest();
        self.process(ctl);
        if let Err(e) = ingested {
            if !ctl.is_destroyed() && self.state != AssociationState::Dead {
                self.fail(ctl, &e);
            }
        }
        if eof && !ctl.is_destroyed() {
            debug!(peer = ?self.peer, pending = self.outgoing.len(), "peer closed connection");
            self.cancel_incoming();
            self.state = AssociationState::Dead;
            self.awaiting_close = false;
        }
        self.pump(ctl);
    }

    /// Read until the socket would block or the peer shuts down its side.
    /// Returns `true` on end of stream; bytes read before it stay buffered.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => self.inbuf.extend_from_slice(chunk.get(..n).unwrap_or_default()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Move every complete message from the input buffer to the incoming
    /// queue.
    fn ingest(&mut self) -> Result<(), SessionError> {
        loop {
            let variant = if let Some(variant) = self.variant {
                variant
            } else {
                let Some(variant) = transport::sniff(&self.inbuf) else {
                    return Ok(());
                };
                debug!(peer = ?self.peer, ?variant, "protocol detected");
                self.variant = Some(variant);
                variant
            };
            let status = match variant {
                ProtocolVariant::Binary => {
                    BinaryFramer::new(self.cfg.max_request_size).frame(&self.inbuf)?
                }
                ProtocolVariant::Http => {
                    HttpFramer::new(self.cfg.max_request_size).frame(&self.inbuf)?
                }
            };
            let FrameStatus::Complete {
                len,
                payload_offset,
            } = status
            else {
                return Ok(());
            };
            let mut raw = self.inbuf.split_to(len).freeze();
            let payload = raw.split_off(payload_offset);
            let mut request = self.next_request(payload);
            if variant == ProtocolVariant::Binary {
                let apdu = codec::decode(request.raw())?;
                request.set_decoded(apdu);
            }
            self.incoming.enqueue(request);
        }
    }

    /// Serve queued requests in arrival order.
    fn process(&mut self, ctl: &mut ChannelControl<'_>) {
        while let Some(mut request) = self.incoming.dequeue_head() {
            request.set_state(RequestState::Pending);
            let served = if self.variant == Some(ProtocolVariant::Http) {
                self.serve_http(request);
                Ok(())
            } else {
                self.serve_binary(request)
            };
            if let Err(e) = served {
                self.fail(ctl, &e);
            }
            if self.state == AssociationState::Dead || ctl.is_destroyed() {
                self.cancel_incoming();
                break;
            }
        }
    }

    fn serve_binary(&mut self, mut request: Request) -> Result<(), SessionError> {
        let apdu = request
            .take_decoded()
            .ok_or(SessionError::Protocol("request was not decoded"))?;
        debug!(peer = ?self.peer, id = request.id(), kind = apdu.kind(), "serving request");
        let response = match dispatch::handle_apdu(&self.cfg, &mut self.session, apdu) {
            Outcome::Reply(apdu) => apdu,
            Outcome::Established(apdu) => {
                self.state = AssociationState::Up;
                apdu
            }
            Outcome::Closing(apdu) => {
                self.state = AssociationState::Dead;
                self.awaiting_close = false;
                apdu
            }
            Outcome::ProtocolError(reason) => return Err(SessionError::Protocol(reason)),
        };
        request.complete(codec::encode_frame(&response)?);
        self.outgoing.enqueue(request);
        Ok(())
    }

    fn serve_http(&mut self, mut request: Request) {
        let response = match HttpRequest::parse(request.raw()) {
            Ok(http) => sru::handle_http(&self.cfg, &mut self.session, &http),
            Err(e) => {
                debug!(peer = ?self.peer, error = %e, "bad http request");
                HttpResponse::error(400, &e.to_string())
            }
        };
        if response.close {
            self.state = AssociationState::Dead;
        }
        request.complete(response.to_bytes());
        self.outgoing.enqueue(request);
    }

    /// React to a failed request or unframeable input.
    fn fail(&mut self, ctl: &mut ChannelControl<'_>, err: &SessionError) {
        match (self.variant, err) {
            (Some(ProtocolVariant::Http), SessionError::Transport(e)) => {
                let status = match e {
                    TransportError::FrameTooLarge { .. } => 413,
                    TransportError::Parse(_) | TransportError::MalformedHttp(_) => 400,
                };
                warn!(peer = ?self.peer, error = %e, status, "rejecting http input");
                let mut response = HttpResponse::error(status, &e.to_string());
                response.close = true;
                let mut request = self.next_request(Bytes::new());
                request.complete(response.to_bytes());
                self.outgoing.enqueue(request);
                self.cancel_incoming();
                self.state = AssociationState::Dead;
            }
            _ if self.state == AssociationState::Up && self.session.supports_close() => {
                warn!(peer = ?self.peer, error = %err, "protocol error");
                self.close_with(ctl, CloseReason::ProtocolError);
            }
            _ => {
                warn!(peer = ?self.peer, error = %err, "dropping association");
                self.release(ctl);
            }
        }
    }

    /// Queue a `Close` and wait for the peer's answer.
    fn close_with(&mut self, ctl: &mut ChannelControl<'_>, reason: CloseReason) {
        let frame = match codec::encode_frame(&Apdu::Close(Close::new(reason))) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = ?self.peer, error = %e, "cannot encode close");
                self.release(ctl);
                return;
            }
        };
        let mut request = self.next_request(Bytes::new());
        request.complete(frame);
        self.outgoing.enqueue(request);
        self.cancel_incoming();
        self.state = AssociationState::Dead;
        self.awaiting_close = true;
    }

    /// Drop every request still waiting to be served.
    fn cancel_incoming(&mut self) {
        let ids: Vec<u64> = self.incoming.iter().map(Request::id).collect();
        for id in ids {
            if let Some(request) = self.incoming.remove(id) {
                let kind = request.decoded().map(Apdu::kind);
                debug!(peer = ?self.peer, id, ?kind, "request cancelled");
            }
        }
    }

    fn on_timeout(&mut self, ctl: &mut ChannelControl<'_>) {
        match self.state {
            AssociationState::Up if self.session.supports_close() => {
                let reason = if ctl.is_shutting_down() {
                    CloseReason::Shutdown
                } else {
                    CloseReason::LackOfActivity
                };
                info!(peer = ?self.peer, ?reason, "closing association");
                self.close_with(ctl, reason);
                self.pump(ctl);
            }
            state => {
                debug!(peer = ?self.peer, ?state, "timeout");
                self.release(ctl);
            }
        }
    }

    /// Write as much pending output as the socket accepts. Returns `true`
    /// once the outgoing queue is empty.
    fn flush(&mut self) -> io::Result<bool> {
        while let Some(head) = self.outgoing.peek_head() {
            let pending = head.response().get(self.written..).unwrap_or_default();
            if pending.is_empty() {
                self.outgoing.dequeue_head();
                self.written = 0;
                continue;
            }
            match self.stream.write(pending) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Flush and bring the interest mask in line with the queues.
    fn pump(&mut self, ctl: &mut ChannelControl<'_>) {
        if ctl.is_destroyed() {
            return;
        }
        match self.flush() {
            Ok(true) => {
                ctl.set_mask(ctl.mask() - EventMask::OUTPUT);
                if self.state == AssociationState::Dead {
                    if self.awaiting_close {
                        ctl.set_timeout(self.cfg.close_timeout);
                    } else {
                        ctl.force(EventMask::TIMEOUT);
                    }
                }
            }
            Ok(false) => ctl.set_mask(ctl.mask() | EventMask::OUTPUT),
            Err(e) => {
                debug!(peer = ?self.peer, error = %e, "write failed");
                self.release(ctl);
            }
        }
    }

    fn release(&mut self, ctl: &mut ChannelControl<'_>) {
        if ctl.is_destroyed() {
            return;
        }
        info!(peer = ?self.peer, "association released");
        self.state = AssociationState::Dead;
        self.incoming.clear();
        self.outgoing.clear();
        self.session.close_backend();
        ctl.destroy();
    }
}

impl ChannelHandler for Association {
    fn source(&mut self) -> Option<&mut dyn Source> { Some(&mut self.stream) }

    fn handle(&mut self, ctl: &mut ChannelControl<'_>, event: Event) {
        match event {
            Event::Input => self.on_input(ctl),
            Event::Output => self.pump(ctl),
            Event::Except => {
                debug!(peer = ?self.peer, "socket error");
                self.release(ctl);
            }
            Event::Timeout => self.on_timeout(ctl),
        }
    }
}

impl std::fmt::Debug for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("variant", &self.variant)
            .field("incoming", &self.incoming.len())
            .field("outgoing", &self.outgoing.len())
            .finish_non_exhaustive()
    }
}
