//! Association lifecycle and request pipeline.
//!
//! An [`Association`] is the server end of one client connection. It reads
//! and frames inbound bytes, queues decoded requests, hands them to the
//! dispatcher in arrival order and writes the encoded responses back.

pub mod association;
pub mod queue;

pub use self::{
    association::{Association, AssociationState, SessionError},
    queue::{Request, RequestQueue, RequestState},
};
