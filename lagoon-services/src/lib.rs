//! The per-connection request-serving engine.
//!
//! One worker owns one accepted connection for its entire lifetime: it
//! reads request batches, dispatches them to the application, writes
//! responses, loops under the keep-alive policy, and can hand the socket
//! off to the websocket subsystem mid-handshake. See
//! [`http::ConnectionWorker`] for the control loop.

pub mod http;
mod serve;

pub use serve::{serve, Accepted, ErrorSink};
