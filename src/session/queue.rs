//! Per-association FIFO of in-flight requests.
//!
//! An association keeps two queues: *incoming* holds framed requests waiting
//! to be processed and *outgoing* holds encoded responses waiting to be
//! written. A [`Request`] lives in exactly one queue at a time and moves
//! between them by value.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::apdu::Apdu;

/// Processing state of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting in a queue.
    Idle,
    /// A backend call or encode is in progress.
    Pending,
}

/// One protocol message and, once processed, its response.
#[derive(Debug)]
pub struct Request {
    id: u64,
    state: RequestState,
    raw: Bytes,
    decoded: Option<Apdu>,
    response: Vec<u8>,
}

impl Request {
    /// Wrap raw message bytes read off the wire.
    #[must_use]
    pub const fn new(id: u64, raw: Bytes) -> Self {
        Self {
            id,
            state: RequestState::Idle,
            raw,
            decoded: None,
            response: Vec::new(),
        }
    }

    /// Creation sequence number, unique within an association.
    #[must_use]
    pub const fn id(&self) -> u64 { self.id }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RequestState { self.state }

    /// Change the state.
    pub const fn set_state(&mut self, state: RequestState) { self.state = state; }

    /// The message payload as read off the wire.
    #[must_use]
    pub const fn raw(&self) -> &Bytes { &self.raw }

    /// The decoded message, once decoding succeeded.
    #[must_use]
    pub const fn decoded(&self) -> Option<&Apdu> { self.decoded.as_ref() }

    /// Record the decoded message.
    pub fn set_decoded(&mut self, apdu: Apdu) { self.decoded = Some(apdu); }

    /// Move the decoded message out for processing.
    pub fn take_decoded(&mut self) -> Option<Apdu> { self.decoded.take() }

    /// Encoded response bytes, empty until the request has been processed.
    #[must_use]
    pub fn response(&self) -> &[u8] { &self.response }

    /// Attach the encoded response and return the request to `Idle`, ready
    /// for the outgoing queue.
    pub fn complete(&mut self, response: Vec<u8>) {
        self.response = response;
        self.state = RequestState::Idle;
    }
}

/// Ordered queue of requests.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: VecDeque<Request>,
}

impl RequestQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append to the tail.
    pub fn enqueue(&mut self, request: Request) { self.items.push_back(request); }

    /// Remove and return the head.
    pub fn dequeue_head(&mut self) -> Option<Request> { self.items.pop_front() }

    /// Borrow the head.
    #[must_use]
    pub fn peek_head(&self) -> Option<&Request> { self.items.front() }

    /// Remove the request with `id` from anywhere in the queue, keeping the
    /// order of the others.
    pub fn remove(&mut self, id: u64) -> Option<Request> {
        let pos = self.items.iter().position(|r| r.id == id)?;
        self.items.remove(pos)
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize { self.items.len() }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Drop every queued request.
    pub fn clear(&mut self) { self.items.clear(); }

    /// Iterate from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Request> { self.items.iter() }
}
