//! Constants and helpers for the wire protocol.
//!
//! The protocol module defines the version numbers, negotiated size limits and
//! timeouts shared by the binary session engine and the HTTP variant. It also
//! contains the small pure helpers used during Init negotiation.
use std::time::Duration;

/// Protocol version 1.
pub const VERSION_1: u8 = 1;
/// Protocol version 2.
pub const VERSION_2: u8 = 2;
/// Protocol version 3, the first to negotiate `Close`.
pub const VERSION_3: u8 = 3;
/// Versions this server can speak, highest first.
pub const SUPPORTED_VERSIONS: [u8; 3] = [VERSION_3, VERSION_2, VERSION_1];

/// Implementation identifier reported in Init responses.
pub const IMPLEMENTATION_ID: &str = "zgate";
/// Implementation version reported in Init responses.
pub const IMPLEMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default preferred message size offered by the server (1 MiB).
pub const DEFAULT_PREFERRED_MESSAGE_SIZE: u32 = 1024 * 1024;
/// Default exceptional record size offered by the server (64 MiB).
pub const DEFAULT_MAXIMUM_RECORD_SIZE: u32 = 64 * 1024 * 1024;
/// Largest inbound frame accepted before the connection is dropped.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Idle period after which an association is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// How long a dead association waits for the peer's `Close` acknowledgement.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the number of terms returned by a single Scan.
pub const MAX_SCAN_TERMS: u32 = 100;
/// Result set name used when a request does not name one.
pub const DEFAULT_RESULT_SET: &str = "default";

/// Pick the highest version offered by the client that the server supports.
///
/// Returns `None` if there is no overlap, which rejects the Init.
#[must_use]
pub fn negotiate_version(offered: &[u8]) -> Option<u8> {
    SUPPORTED_VERSIONS
        .iter()
        .copied()
        .find(|version| offered.contains(version))
}

/// Whether `version` supports an explicit `Close` exchange.
#[must_use]
pub const fn supports_close(version: u8) -> bool { version >= VERSION_3 }

/// Negotiate a size limit: the smaller of the client proposal and the server
/// limit, where a zero proposal means "no preference".
#[must_use]
pub const fn negotiate_size(proposed: u32, server_limit: u32) -> u32 {
    if proposed == 0 || proposed > server_limit {
        server_limit
    } else {
        proposed
    }
}
