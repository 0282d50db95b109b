//! Channels: registered endpoints with an interest mask and an idle deadline.
//!
//! A [`Channel`] pairs a [`ChannelHandler`] with the bookkeeping the
//! [`Multiplexer`](super::Multiplexer) needs to schedule it. Handlers never
//! touch the multiplexer directly; they steer their own channel through the
//! [`ChannelControl`] passed to every callback.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use mio::{Interest, event::Source};

bitflags! {
    /// Conditions a channel is interested in, or that fired for it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        /// Readable, or the peer shut down its side.
        const INPUT = 1 << 0;
        /// Writable.
        const OUTPUT = 1 << 1;
        /// Error condition on the endpoint.
        const EXCEPT = 1 << 2;
        /// Idle deadline elapsed.
        const TIMEOUT = 1 << 3;
    }
}

impl EventMask {
    /// The `mio` interest matching the I/O part of this mask, if any.
    #[must_use]
    pub fn interest(self) -> Option<Interest> {
        match (self.contains(Self::INPUT), self.contains(Self::OUTPUT)) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// Translate a `mio` readiness event into a mask.
    #[must_use]
    pub fn from_readiness(event: &mio::event::Event) -> Self {
        let mut mask = Self::empty();
        if event.is_readable() || event.is_read_closed() {
            mask |= Self::INPUT;
        }
        if event.is_writable() {
            mask |= Self::OUTPUT;
        }
        if event.is_error() {
            mask |= Self::EXCEPT;
        }
        mask
    }
}

/// A single condition delivered to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Data (or EOF) is available.
    Input,
    /// The endpoint accepts writes.
    Output,
    /// The endpoint reported an error.
    Except,
    /// The idle deadline elapsed, or a timeout was forced.
    Timeout,
}

impl Event {
    /// Dispatch order within one round.
    pub const ORDER: [Self; 4] = [Self::Input, Self::Output, Self::Except, Self::Timeout];

    /// The mask bit for this event.
    #[must_use]
    pub const fn mask(self) -> EventMask {
        match self {
            Self::Input => EventMask::INPUT,
            Self::Output => EventMask::OUTPUT,
            Self::Except => EventMask::EXCEPT,
            Self::Timeout => EventMask::TIMEOUT,
        }
    }
}

/// Identifier of a channel within its multiplexer.
///
/// Identifiers are slot indices and are reused once a destroyed channel has
/// been swept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) usize);

/// Callbacks for one channel.
pub trait ChannelHandler: Send {
    /// The I/O source to register, or `None` for timer-only channels.
    fn source(&mut self) -> Option<&mut dyn Source> { None }

    /// React to a single event.
    ///
    /// Called once per satisfied condition per round. Handlers run to
    /// completion and must not block.
    fn handle(&mut self, ctl: &mut ChannelControl<'_>, event: Event);
}

/// Scheduling state the multiplexer keeps for each channel.
#[derive(Debug)]
pub(crate) struct ChannelState {
    pub(crate) mask: EventMask,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) last_event: Instant,
    pub(crate) forced: EventMask,
    pub(crate) destroyed: bool,
}

impl ChannelState {
    /// Instant at which a `Timeout` becomes due, if the channel wants one.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        if !self.mask.contains(EventMask::TIMEOUT) {
            return None;
        }
        self.idle_timeout
            .and_then(|timeout| self.last_event.checked_add(timeout))
    }
}

/// A handler together with its scheduling state.
pub struct Channel {
    pub(crate) handler: Box<dyn ChannelHandler>,
    pub(crate) state: ChannelState,
    pub(crate) registered: Option<Interest>,
}

impl Channel {
    /// Create a channel interested in `mask`, without an idle timeout.
    #[must_use]
    pub fn new(handler: impl ChannelHandler + 'static, mask: EventMask) -> Self {
        Self {
            handler: Box::new(handler),
            state: ChannelState {
                mask,
                idle_timeout: None,
                last_event: Instant::now(),
                forced: EventMask::empty(),
                destroyed: false,
            },
            registered: None,
        }
    }

    /// Set the idle timeout after which `Timeout` fires.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.state.idle_timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

/// Handle through which a handler steers its own channel.
pub struct ChannelControl<'a> {
    pub(crate) id: ChannelId,
    pub(crate) state: &'a mut ChannelState,
    pub(crate) spawned: &'a mut Vec<Channel>,
    pub(crate) shutting_down: bool,
}

impl ChannelControl<'_> {
    /// Identifier of the channel being dispatched.
    #[must_use]
    pub const fn id(&self) -> ChannelId { self.id }

    /// Current interest mask.
    #[must_use]
    pub const fn mask(&self) -> EventMask { self.state.mask }

    /// Replace the interest mask. Takes effect before the next wait.
    pub const fn set_mask(&mut self, mask: EventMask) { self.state.mask = mask; }

    /// Replace the idle timeout and restart the idle clock.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.state.idle_timeout = Some(timeout);
        self.state.last_event = Instant::now();
    }

    /// Mark the channel destroyed. No further events are delivered and the
    /// channel is removed after the current round.
    pub const fn destroy(&mut self) { self.state.destroyed = true; }

    /// Whether [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool { self.state.destroyed }

    /// Deliver `mask` in the next round without waiting for readiness.
    pub fn force(&mut self, mask: EventMask) { self.state.forced |= mask; }

    /// Add a new channel. It is scheduled from the next round on.
    pub fn spawn(&mut self, channel: Channel) { self.spawned.push(channel); }

    /// Whether administrative shutdown has been requested.
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool { self.shutting_down }
}
