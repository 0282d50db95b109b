//! Server orchestration.
//!
//! [`Server`] binds the listening socket and drives the multiplexer; [`run`]
//! is the whole daemon: configuration, backend, signals and the event loop.
//! Binaries stay thin wrappers that only need to call [`run`].

pub mod cli;
pub mod listener;
pub mod shutdown;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use mio::net::TcpListener;
use tracing::info;

pub use self::cli::{AppConfig, Cli, ConfigError, ConfigOverrides};
use self::listener::Listener;
use crate::{
    backend::{MemoryBackendFactory, memory::Dataset},
    engine::EngineConfig,
    event::{Multiplexer, ShutdownHandle},
    query::KeywordTranslator,
};

/// A bound server, ready to run.
#[derive(Debug)]
pub struct Server {
    mux: Multiplexer,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind `addr` and register the listener.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound or the poller cannot
    /// be created.
    pub fn bind(addr: SocketAddr, cfg: EngineConfig) -> io::Result<Self> {
        let socket = TcpListener::bind(addr)?;
        let local_addr = socket.local_addr()?;
        let mut mux = Multiplexer::new()?;
        mux.add(Listener::new(socket, Arc::new(cfg)).into_channel())?;
        info!(%local_addr, "listening");
        Ok(Self { mux, local_addr })
    }

    /// Address actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Handle for stopping the server from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle { self.mux.shutdown_handle() }

    /// Serve until shutdown completes.
    pub fn run(mut self) {
        self.mux.run();
        info!("server stopped");
    }
}

/// Build the engine configuration described by `cfg`.
///
/// # Errors
/// Returns an error if the dataset file cannot be loaded.
pub fn engine_config(cfg: &AppConfig) -> Result<EngineConfig> {
    let dataset = match &cfg.data_file {
        Some(path) => Dataset::from_file(path)?,
        None => Dataset::sample(),
    };
    let mut engine = EngineConfig::new(Arc::new(MemoryBackendFactory::new(dataset)))
        .with_sizes(cfg.preferred_message_size, cfg.maximum_record_size)
        .with_max_request_size(cfg.max_request_size)
        .with_timeouts(
            Duration::from_secs(cfg.idle_timeout_secs),
            Duration::from_secs(cfg.close_timeout_secs),
        )
        .with_implementation_name(cfg.implementation_name.clone());
    if cfg.keyword_queries {
        engine = engine.with_keyword_translator(Arc::new(KeywordTranslator));
    }
    Ok(engine)
}

/// Parse the command line and run the daemon.
///
/// # Errors
/// Returns any error raised while loading configuration, binding the socket
/// or installing the signal handler.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load().context("loading configuration")?;
    run_with_config(&cfg)
}

/// Run the daemon with an already merged configuration.
///
/// # Errors
/// See [`run`].
pub fn run_with_config(cfg: &AppConfig) -> Result<()> {
    let engine = engine_config(cfg)?;
    let addr: SocketAddr = cfg
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cfg.bind))?;
    let server = Server::bind(addr, engine).with_context(|| format!("binding {addr}"))?;
    shutdown::spawn_signal_thread(server.shutdown_handle())
        .context("installing signal handler")?;
    server.run();
    Ok(())
}
