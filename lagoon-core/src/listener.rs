use std::{io, net::SocketAddr};

use monoio::net::{ListenerOpts, TcpListener};
use service_async::{AsyncMakeService, MakeService};

/// Rebuildable TCP listener factory.
///
/// Every worker thread builds its own listener from the same builder; the
/// default listener opts enable address/port reuse so the kernel spreads
/// accepts across threads.
pub struct ListenerBuilder {
    addr: SocketAddr,
    opts: ListenerOpts,
}

impl ListenerBuilder {
    pub fn bind_tcp(addr: SocketAddr) -> Self {
        Self {
            addr,
            opts: ListenerOpts::default(),
        }
    }

    pub fn build(&self) -> io::Result<TcpListener> {
        TcpListener::bind_with_config(self.addr, &self.opts)
    }
}

impl MakeService for ListenerBuilder {
    type Service = TcpListener;
    type Error = io::Error;

    fn make_via_ref(&self, _old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        self.build()
    }
}

impl AsyncMakeService for ListenerBuilder {
    type Service = TcpListener;
    type Error = io::Error;

    async fn make_via_ref(
        &self,
        _old: Option<&Self::Service>,
    ) -> Result<Self::Service, Self::Error> {
        self.build()
    }
}
