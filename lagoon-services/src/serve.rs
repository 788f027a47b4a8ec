use std::{fmt::Debug, net::SocketAddr, rc::Rc};

use futures_channel::oneshot::Sender as OSender;
use lagoon_core::TransportError;
use monoio::{io::stream::Stream, net::TcpStream};
use service_async::Service;
use tracing::{debug, error, info, warn};

pub type Accepted = (TcpStream, SocketAddr);

/// Transport-error notification channel.
///
/// Workers report faults that have no HTTP answer (bind failures, upgrade
/// validation faults) here instead of logging in place; the runtime owner
/// drains the receiver.
#[derive(Clone)]
pub struct ErrorSink(local_sync::mpsc::unbounded::Tx<TransportError>);

impl ErrorSink {
    pub fn channel() -> (Self, local_sync::mpsc::unbounded::Rx<TransportError>) {
        let (tx, rx) = local_sync::mpsc::unbounded::channel();
        (Self(tx), rx)
    }

    pub fn report(&self, err: TransportError) {
        if self.0.send(err).is_err() {
            debug!("transport error receiver dropped");
        }
    }
}

/// Serves incoming connections until the listener closes or the `stop`
/// channel's receiver is dropped. Each accepted connection gets its own
/// spawned task running the service to completion.
pub async fn serve<S, L, A, E>(mut listener: L, handler: Rc<S>, mut stop: OSender<()>)
where
    L: Stream<Item = Result<A, E>> + 'static,
    E: Debug,
    S: Service<A> + 'static,
    S::Error: Debug,
    A: 'static,
{
    let mut cancellation = stop.cancellation();
    loop {
        monoio::select! {
            _ = &mut cancellation => {
                info!("serve loop notified to stop");
                break;
            }
            accept_opt = listener.next() => {
                let Some(accept) = accept_opt else {
                    info!("listener closed, serve loop done");
                    return;
                };
                match accept {
                    Ok(accept) => {
                        let svc = handler.clone();
                        monoio::spawn(async move {
                            if let Err(e) = svc.call(accept).await {
                                error!("connection handling error: {e:?}");
                            }
                        });
                    }
                    Err(e) => warn!("accept connection failed: {e:?}"),
                }
            }
        }
    }
}
