//! Single-threaded readiness multiplexer.
//!
//! The [`Multiplexer`] owns every live [`Channel`] in a slot arena indexed by
//! `mio::Token`. Each round it computes how long it may block, waits once on
//! `mio::Poll`, then dispatches `Input`, `Output`, `Except` and `Timeout` to
//! each ready channel in that order. Handlers destroy channels by marking
//! them; marked slots are swept after the round and their indices reused.
//!
//! A channel's idle clock restarts whenever it is dispatched. `Timeout` is
//! therefore only delivered in a round where the channel saw no I/O
//! readiness, so a channel that stays busy never times out.
//!
//! Cross-thread interaction is limited to the [`ShutdownHandle`], which wakes
//! the poll and asks the loop to force a `Timeout` on every channel.

pub mod channel;

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use mio::{Events, Poll, Registry, Token, Waker};
use tracing::{debug, error, warn};

pub use self::channel::{Channel, ChannelControl, ChannelHandler, ChannelId, Event, EventMask};

/// Longest single wait, bounding how late an idle deadline can be noticed.
pub const POLL_CEILING: Duration = Duration::from_secs(15);

const WAKER_TOKEN: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 256;

/// Requests administrative shutdown from any thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the multiplexer to wind down every channel.
    ///
    /// # Errors
    /// Returns an error if the poll could not be woken.
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }
}

/// Readiness multiplexer over a set of channels.
pub struct Multiplexer {
    poll: Poll,
    slots: Vec<Option<Channel>>,
    free: Vec<usize>,
    ready: Vec<EventMask>,
    pending: Vec<Channel>,
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
    shutting_down: bool,
}

impl Multiplexer {
    /// Create an empty multiplexer.
    ///
    /// # Errors
    /// Returns an error if the OS poller or its waker cannot be created.
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(Self {
            poll,
            slots: Vec::new(),
            free: Vec::new(),
            ready: Vec::new(),
            pending: Vec::new(),
            requested: Arc::new(AtomicBool::new(false)),
            waker,
            shutting_down: false,
        })
    }

    /// Handle for requesting shutdown from other threads.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            requested: Arc::clone(&self.requested),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Register a channel.
    ///
    /// # Errors
    /// Returns an error if the channel's source cannot be registered.
    pub fn add(&mut self, mut channel: Channel) -> io::Result<ChannelId> {
        let index = self.free.pop().unwrap_or(self.slots.len());
        if self.shutting_down {
            channel.state.forced |= EventMask::TIMEOUT;
        }
        if let Err(e) = sync_interest(self.poll.registry(), Token(index), &mut channel) {
            if index < self.slots.len() {
                self.free.push(index);
            }
            return Err(e);
        }
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(channel);
        } else {
            self.slots.push(Some(channel));
        }
        Ok(ChannelId(index))
    }

    /// Deliver `mask` to a channel in the next round without OS readiness.
    ///
    /// Returns `false` if the channel does not exist or is destroyed.
    pub fn force(&mut self, id: ChannelId, mask: EventMask) -> bool {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(channel) if !channel.state.destroyed => {
                channel.state.forced |= mask;
                true
            }
            _ => false,
        }
    }

    /// Number of live channels, including ones spawned this round.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|channel| !channel.state.destroyed)
            .count()
            + self.pending.len()
    }

    /// Whether no live channels remain.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Run rounds until the channel set becomes empty.
    pub fn run(&mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        while !self.is_empty() {
            self.check_shutdown();
            let timeout = self.wait_timeout(Instant::now());
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!(error = %e, "poll failed");
                }
                continue;
            }
            self.collect_readiness(&events);
            self.dispatch(Instant::now());
            self.sweep();
        }
        debug!("multiplexer drained");
    }

    fn check_shutdown(&mut self) {
        if self.shutting_down || !self.requested.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(channels = self.len(), "shutdown requested");
        self.shutting_down = true;
        for channel in self.slots.iter_mut().flatten() {
            channel.state.forced |= EventMask::TIMEOUT;
        }
    }

    fn wait_timeout(&self, now: Instant) -> Duration {
        let mut wait = POLL_CEILING;
        for channel in self.slots.iter().flatten() {
            if channel.state.destroyed {
                continue;
            }
            if !channel.state.forced.is_empty() {
                return Duration::ZERO;
            }
            if let Some(deadline) = channel.state.deadline() {
                wait = wait.min(deadline.saturating_duration_since(now));
            }
        }
        wait
    }

    fn collect_readiness(&mut self, events: &Events) {
        self.ready.clear();
        self.ready.resize(self.slots.len(), EventMask::empty());
        for event in events {
            if event.token() == WAKER_TOKEN {
                continue;
            }
            if let Some(ready) = self.ready.get_mut(event.token().0) {
                *ready |= EventMask::from_readiness(event);
            }
        }
    }

    fn dispatch(&mut self, now: Instant) {
        let Self {
            poll,
            slots,
            ready,
            pending,
            shutting_down,
            ..
        } = self;
        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(channel) = slot.as_mut() else {
                continue;
            };
            if channel.state.destroyed {
                continue;
            }
            let os = ready.get(index).copied().unwrap_or_default();
            let io_ready = os & (channel.state.mask | EventMask::EXCEPT);
            let mut fire = io_ready | std::mem::take(&mut channel.state.forced);
            if io_ready.is_empty() && channel.state.deadline().is_some_and(|due| due <= now) {
                fire |= EventMask::TIMEOUT;
            }
            if fire.is_empty() {
                continue;
            }
            channel.state.last_event = now;
            for event in Event::ORDER {
                if channel.state.destroyed {
                    break;
                }
                if !fire.contains(event.mask()) {
                    continue;
                }
                let mut ctl = ChannelControl {
                    id: ChannelId(index),
                    state: &mut channel.state,
                    spawned: &mut *pending,
                    shutting_down: *shutting_down,
                };
                channel.handler.handle(&mut ctl, event);
            }
            if channel.state.destroyed {
                continue;
            }
            if let Err(e) = sync_interest(poll.registry(), Token(index), channel) {
                warn!(channel = index, error = %e, "re-registration failed");
                channel.state.destroyed = true;
            }
        }
    }

    fn sweep(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.as_ref().is_some_and(|channel| channel.state.destroyed) {
                continue;
            }
            if let Some(mut channel) = slot.take() {
                if channel.registered.is_some() {
                    if let Some(source) = channel.handler.source() {
                        if let Err(e) = self.poll.registry().deregister(source) {
                            debug!(channel = index, error = %e, "deregistration failed");
                        }
                    }
                }
                self.free.push(index);
            }
        }
        for channel in std::mem::take(&mut self.pending) {
            if let Err(e) = self.add(channel) {
                warn!(error = %e, "failed to register spawned channel");
            }
        }
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("channels", &self.len())
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

/// Bring the `mio` registration of `channel` in line with its mask.
fn sync_interest(registry: &Registry, token: Token, channel: &mut Channel) -> io::Result<()> {
    let wanted = channel.state.mask.interest();
    if wanted == channel.registered {
        return Ok(());
    }
    let registered = channel.registered;
    let Some(source) = channel.handler.source() else {
        return Ok(());
    };
    match (registered, wanted) {
        (None, Some(interest)) => registry.register(source, token, interest)?,
        (Some(_), Some(interest)) => registry.reregister(source, token, interest)?,
        (Some(_), None) => registry.deregister(source)?,
        (None, None) => {}
    }
    channel.registered = wanted;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<(&'static str, Event)>>>;

    /// Timer-only handler that records events and destroys itself after a
    /// number of them, optionally spawning a child first.
    struct Recorder {
        name: &'static str,
        log: Log,
        remaining: usize,
        destroy_on: Option<Event>,
        child: Option<Channel>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log, remaining: usize) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                remaining,
                destroy_on: None,
                child: None,
            }
        }
    }

    impl ChannelHandler for Recorder {
        fn handle(&mut self, ctl: &mut ChannelControl<'_>, event: Event) {
            self.log.lock().expect("log lock").push((self.name, event));
            if let Some(child) = self.child.take() {
                ctl.spawn(child);
            }
            if ctl.is_shutting_down() || self.destroy_on == Some(event) {
                ctl.destroy();
                return;
            }
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                ctl.destroy();
            }
        }
    }

    fn timer(handler: Recorder, millis: u64) -> Channel {
        Channel::new(handler, EventMask::TIMEOUT).with_timeout(Duration::from_millis(millis))
    }

    fn events_of(log: &Log, name: &str) -> Vec<Event> {
        log.lock()
            .expect("log lock")
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, e)| *e)
            .collect()
    }

    #[test]
    fn run_returns_when_channels_are_gone() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        mux.add(timer(Recorder::new("a", &log, 2), 5)).expect("add");
        mux.run();
        assert!(mux.is_empty());
        assert_eq!(events_of(&log, "a"), vec![Event::Timeout, Event::Timeout]);
    }

    #[test]
    fn destroyed_channel_is_never_dispatched_again() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        mux.add(timer(Recorder::new("short", &log, 1), 1)).expect("add");
        mux.add(timer(Recorder::new("long", &log, 4), 5)).expect("add");
        mux.run();
        assert_eq!(events_of(&log, "short"), vec![Event::Timeout]);
        assert_eq!(events_of(&log, "long").len(), 4);
    }

    #[test]
    fn forced_event_fires_without_readiness() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        let id = mux
            .add(Channel::new(Recorder::new("f", &log, 1), EventMask::empty()))
            .expect("add");
        assert!(mux.force(id, EventMask::INPUT));
        mux.run();
        assert_eq!(events_of(&log, "f"), vec![Event::Input]);
    }

    #[test]
    fn destroy_during_input_suppresses_later_events() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        let mut recorder = Recorder::new("d", &log, 10);
        recorder.destroy_on = Some(Event::Input);
        let id = mux
            .add(Channel::new(recorder, EventMask::TIMEOUT).with_timeout(Duration::ZERO))
            .expect("add");
        mux.force(id, EventMask::INPUT | EventMask::TIMEOUT);
        mux.run();
        assert_eq!(events_of(&log, "d"), vec![Event::Input]);
        assert!(!mux.force(id, EventMask::INPUT));
    }

    #[test]
    fn spawned_channels_join_the_next_round() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        let mut parent = Recorder::new("parent", &log, 1);
        parent.child = Some(timer(Recorder::new("child", &log, 2), 1));
        mux.add(timer(parent, 1)).expect("add");
        mux.run();
        assert_eq!(events_of(&log, "parent"), vec![Event::Timeout]);
        assert_eq!(events_of(&log, "child"), vec![Event::Timeout, Event::Timeout]);
    }

    #[test]
    fn shutdown_forces_timeout_on_every_channel() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        mux.add(timer(Recorder::new("a", &log, 10), 3_600_000))
            .expect("add");
        mux.add(Channel::new(Recorder::new("b", &log, 10), EventMask::empty()))
            .expect("add");
        mux.shutdown_handle().shutdown().expect("shutdown");
        mux.run();
        assert_eq!(events_of(&log, "a"), vec![Event::Timeout]);
        assert_eq!(events_of(&log, "b"), vec![Event::Timeout]);
    }

    #[test]
    fn swept_slots_are_reused() {
        let log = Log::default();
        let mut mux = Multiplexer::new().expect("mux");
        let first = mux.add(timer(Recorder::new("a", &log, 1), 1)).expect("add");
        mux.run();
        let second = mux.add(timer(Recorder::new("b", &log, 1), 1)).expect("add");
        assert_eq!(first, second);
        mux.run();
    }
}
