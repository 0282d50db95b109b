//! Signal-driven shutdown.
//!
//! `SIGINT` and `SIGTERM` are blocked for the whole process and collected by
//! a dedicated thread, which asks the multiplexer to wind down.

use std::{io, thread};

use nix::sys::signal::{SigSet, Signal};
use tracing::{error, info};

use crate::event::ShutdownHandle;

/// Block the shutdown signals and start the thread waiting for them.
///
/// Must be called before other threads are spawned so that they inherit the
/// signal mask.
///
/// # Errors
/// Returns an error if the signal mask cannot be changed or the thread cannot
/// be started.
pub fn spawn_signal_thread(handle: ShutdownHandle) -> io::Result<thread::JoinHandle<()>> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block().map_err(io::Error::from)?;
    thread::Builder::new()
        .name("zgate-signals".to_owned())
        .spawn(move || match signals.wait() {
            Ok(signal) => {
                info!(?signal, "shutdown requested");
                if let Err(e) = handle.shutdown() {
                    error!(error = %e, "cannot wake the event loop");
                }
            }
            Err(e) => error!(error = %e, "waiting for signals failed"),
        })
}
