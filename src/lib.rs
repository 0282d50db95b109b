//! Core library for the zgate search/retrieve frontend server.
//!
//! The crate is organised bottom-up: [`apdu`] and [`codec`] define the
//! binary protocol, [`transport`] and [`http`] recognise and frame inbound
//! bytes, [`event`] multiplexes readiness on a single thread, [`session`]
//! drives each association and [`dispatch`] turns requests into responses
//! through the pluggable [`backend`]. [`server`] wires everything together.

pub mod apdu;
pub mod backend;
pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod http;
pub mod options;
pub mod packer;
pub mod protocol;
pub mod query;
pub mod server;
pub mod session;
pub mod transport;
