#![warn(rust_2018_idioms)]

//! Server-side WebRTC data channel endpoint.
//!
//! The endpoint terminates browser-initiated data channel connections: it
//! answers SDP offers, runs STUN connectivity checks over a single UDP
//! socket, completes the DTLS handshake as the active side, brings up an
//! SCTP association inside DTLS and surfaces negotiated [`DataChannel`]s.
//!
//! [`DataChannel`]: crate::data_channel::DataChannel

pub mod candidate;
pub mod credential;
pub mod data_channel;
pub mod endpoint;
pub mod error;
pub mod fingerprint;
pub mod mux;
pub mod session;
pub mod signaling;
pub mod stun_agent;

pub use error::Error;

#[cfg(test)]
mod test_util;

/// Equal to UDP MTU
pub(crate) const RECEIVE_MTU: usize = 1460;
