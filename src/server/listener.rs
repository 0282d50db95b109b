//! Accepting channel.
//!
//! The listener accepts every pending connection when it becomes readable
//! and spawns one association channel per client. A forced timeout (sent
//! during shutdown) makes it stop accepting and remove itself.

use std::{io, sync::Arc};

use mio::{event::Source, net::TcpListener};
use tracing::{debug, info, warn};

use crate::{
    engine::EngineConfig,
    event::{Channel, ChannelControl, ChannelHandler, Event, EventMask},
    session::Association,
};

/// Channel handler owning the listening socket.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    cfg: Arc<EngineConfig>,
}

impl Listener {
    /// Wrap a bound, non-blocking listening socket.
    #[must_use]
    pub const fn new(socket: TcpListener, cfg: Arc<EngineConfig>) -> Self { Self { socket, cfg } }

    /// Channel waiting for incoming connections.
    #[must_use]
    pub fn into_channel(self) -> Channel { Channel::new(self, EventMask::INPUT) }

    fn accept_all(&mut self, ctl: &mut ChannelControl<'_>) {
        loop {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "cannot disable nagle");
                    }
                    info!(%peer, "connection accepted");
                    ctl.spawn(Association::new(stream, Arc::clone(&self.cfg)).into_channel());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }
}

impl ChannelHandler for Listener {
    fn source(&mut self) -> Option<&mut dyn Source> { Some(&mut self.socket) }

    fn handle(&mut self, ctl: &mut ChannelControl<'_>, event: Event) {
        match event {
            Event::Input => self.accept_all(ctl),
            Event::Output => {}
            Event::Except => warn!("listening socket reported an error"),
            Event::Timeout => {
                info!("listener stopped");
                ctl.destroy();
            }
        }
    }
}
