use std::{net::SocketAddr, os::fd::OwnedFd};

use crate::session::Session;

/// Everything the websocket subsystem needs to take over a connection:
/// the duplicated socket, the peer address, the upgrade request head and
/// the resolved session. `Send`, so the hub may move it to a long-lived
/// execution context of its own.
pub struct WsHandoff {
    pub io: OwnedFd,
    pub peer: SocketAddr,
    pub head: http::request::Parts,
    pub session: Session,
}

/// Entry point of the websocket subsystem.
///
/// `schedule` must not run the session on the calling worker's thread;
/// after it returns, the originating worker treats the connection as
/// transferred and never writes to or shuts down the socket again.
pub trait WsSessionHub {
    fn schedule(&self, handoff: WsHandoff);
}
