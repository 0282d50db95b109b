//! Shared helpers for integration tests.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use zgate::{
    apdu::{Apdu, InitRequest, Query, SearchRequest},
    backend::{MemoryBackendFactory, memory::Dataset},
    codec,
    engine::EngineConfig,
    event::ShutdownHandle,
    server::Server,
    transport::read_u32,
};

/// A server running on its own thread, stopped when dropped.
pub struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server over the sample dataset.
    pub fn start() -> Self { Self::start_with(sample_config()) }

    /// Start a server with `cfg` on an ephemeral loopback port.
    pub fn start_with(cfg: EngineConfig) -> Self {
        let server = Server::bind("127.0.0.1:0".parse().expect("addr"), cfg).expect("bind");
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());
        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Open a client connection with a read timeout.
    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        stream
    }

    /// Request shutdown without waiting for it.
    pub fn request_shutdown(&self) { self.shutdown.shutdown().expect("shutdown"); }

    /// Request shutdown and wait for the server thread to finish.
    pub fn stop(mut self) { self.finish(); }

    fn finish(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shutdown.shutdown().expect("shutdown");
            thread.join().expect("server thread");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) { self.finish(); }
}

/// Engine configuration over the built-in sample dataset.
pub fn sample_config() -> EngineConfig {
    EngineConfig::new(Arc::new(MemoryBackendFactory::new(Dataset::sample())))
        .with_timeouts(Duration::from_secs(30), Duration::from_millis(200))
}

/// Encode and send one APDU.
pub fn send(stream: &mut TcpStream, apdu: &Apdu) {
    let frame = codec::encode_frame(apdu).expect("encode");
    stream.write_all(&frame).expect("write");
}

/// Read one length-prefixed APDU.
pub fn receive(stream: &mut TcpStream) -> Apdu {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).expect("prefix");
    let len = read_u32(&prefix).expect("length") as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("payload");
    codec::decode(&payload).expect("decode")
}

/// Assert the server closed the connection without sending anything more.
pub fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).expect("read to end");
    assert!(rest.is_empty(), "unexpected trailing bytes");
}

/// Init request offering a single protocol version.
pub fn init(version: u8) -> Apdu {
    Apdu::InitRequest(InitRequest {
        protocol_versions: vec![version],
        options: u32::MAX,
        ..InitRequest::default()
    })
}

/// Search request for `term` into a result set of the same name.
pub fn search(term: &str) -> Apdu {
    Apdu::SearchRequest(SearchRequest {
        reference_id: Some(term.as_bytes().to_vec()),
        small_set_upper_bound: 0,
        large_set_lower_bound: 1,
        medium_set_present_number: 0,
        replace_indicator: true,
        result_set_name: term.to_owned(),
        database_names: vec!["Default".to_owned()],
        small_set_element_set: None,
        medium_set_element_set: None,
        preferred_record_syntax: None,
        query: Query::Prefix(term.to_owned()),
    })
}
