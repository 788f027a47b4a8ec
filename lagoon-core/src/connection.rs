use std::{
    cell::Cell,
    io,
    net::SocketAddr,
    os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connected,
    Disconnected,
    Error,
}

/// Metadata for one accepted connection.
///
/// The IO handle itself lives inside the worker's codec halves; this type
/// carries identity, liveness and the last-activity clock, and is the seam
/// through which the socket is duplicated for a protocol handoff. Owned by
/// exactly one worker, never shared.
#[derive(Debug)]
pub struct ConnInfo {
    fd: RawFd,
    peer: SocketAddr,
    last_activity: Cell<Instant>,
    state: Cell<Liveness>,
}

impl ConnInfo {
    pub fn new(fd: RawFd, peer: SocketAddr) -> Self {
        Self {
            fd,
            peer,
            last_activity: Cell::new(Instant::now()),
            state: Cell::new(Liveness::Connected),
        }
    }

    pub fn from_stream(stream: &monoio::net::TcpStream, peer: SocketAddr) -> Self {
        Self::new(stream.as_raw_fd(), peer)
    }

    /// Connection id exposed to the application dispatcher.
    pub fn id(&self) -> u64 {
        self.fd as u64
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn touch(&self) {
        self.last_activity.set(Instant::now());
    }

    pub fn idle_time(&self) -> Duration {
        self.last_activity.get().elapsed()
    }

    pub fn state(&self) -> Liveness {
        self.state.get()
    }

    pub fn set_state(&self, state: Liveness) {
        self.state.set(state);
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == Liveness::Connected
    }

    /// Duplicate the underlying socket for an ownership transfer.
    ///
    /// The returned descriptor shares the OS socket with the original, so
    /// the worker's own handle stays valid for cleanup bookkeeping; once
    /// the worker drops its half without a shutdown, the duplicate is the
    /// only live end performing IO.
    pub fn duplicate(&self) -> io::Result<OwnedFd> {
        unsafe { BorrowedFd::borrow_raw(self.fd) }.try_clone_to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    use super::*;

    #[test]
    fn touch_resets_idle_clock() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let conn = ConnInfo::new(0, addr);
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.idle_time() >= Duration::from_millis(10));
        conn.touch();
        assert!(conn.idle_time() < Duration::from_millis(10));
    }

    #[test]
    fn liveness_starts_connected() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let conn = ConnInfo::new(0, addr);
        assert!(conn.is_connected());
        conn.set_state(Liveness::Disconnected);
        assert!(!conn.is_connected());
        assert_eq!(conn.state(), Liveness::Disconnected);
    }

    #[test]
    fn duplicate_outlives_the_original_handle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut accepted, peer) = listener.accept().unwrap();

        let conn = ConnInfo::new(client.as_raw_fd(), peer);
        let dup = conn.duplicate().unwrap();
        // Closing the original fd must leave the duplicated end usable.
        drop(client);

        let mut transferred = TcpStream::from(dup);
        transferred.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }
}
