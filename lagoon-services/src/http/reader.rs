use std::time::Duration;

use lagoon_core::{
    config::KeepAlive,
    connection::{ConnInfo, Liveness},
};
use monoio::io::{stream::Stream, AsyncReadRent};
use monoio_http::{
    common::{body::HttpBody, request::Request},
    h1::codec::decoder::{FillPayload, RequestDecoder},
};
use tracing::{debug, warn};

/// Poll slice while waiting for the first request of a batch.
pub const BATCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Poll slice while idling between keep-alive batches.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Pipelined requests read together. Empty means "close this connection".
pub type RequestBatch = Vec<Request<HttpBody>>;

/// Pulls bytes from the connection until a complete request batch is
/// decodable, or the idle timeout / a disconnect aborts the read.
pub struct RequestReader<IO> {
    decoder: RequestDecoder<IO>,
}

impl<IO: AsyncReadRent> RequestReader<IO> {
    pub fn new(io: IO) -> Self {
        Self {
            decoder: RequestDecoder::new(io),
        }
    }

    /// Read one batch.
    ///
    /// Decoding is polled in bounded `poll`-sized slices so an idle
    /// timeout or a liveness change is noticed within one slice. The idle
    /// check only applies when keep-alive is enabled; with keep-alive
    /// disabled the first request is awaited without limit.
    ///
    /// The decode future is pinned once and the same future is re-polled
    /// across slices. The codec moves its read buffer into the in-flight
    /// read, so cancelling the future between slices would lose a
    /// partially received request. A request that is already buffered
    /// resolves on the first poll without touching the socket, which is
    /// how pipelined requests behind this one come back promptly from the
    /// following calls.
    pub async fn read_batch(
        &mut self,
        conn: &ConnInfo,
        keepalive: KeepAlive,
        poll: Duration,
    ) -> RequestBatch {
        let mut batch = RequestBatch::new();

        let decoded = {
            let mut next = std::pin::pin!(self.decoder.next());
            loop {
                if !conn.is_connected() {
                    match conn.state() {
                        Liveness::Error => {
                            warn!("aborting read on failed connection {}", conn.id());
                        }
                        state => {
                            debug!("aborting read on connection {} ({state:?})", conn.id());
                        }
                    }
                    return batch;
                }
                if let Some(limit) = keepalive.limit() {
                    if conn.idle_time() >= limit {
                        debug!("keep-alive timeout on connection {}", conn.id());
                        return batch;
                    }
                }

                match monoio::time::timeout(poll, next.as_mut()).await {
                    // Slice elapsed without a complete request; re-check
                    // the exit conditions and resume the same decode.
                    Err(_) => continue,
                    Ok(decoded) => break decoded,
                }
            }
        };

        match decoded {
            None => {
                debug!("connection {} closed by peer", conn.id());
                conn.set_state(Liveness::Disconnected);
            }
            Some(Err(err)) => {
                warn!("decode request failed on connection {}: {err}", conn.id());
                conn.set_state(Liveness::Error);
            }
            Some(Ok(req)) => {
                conn.touch();
                match self.decoder.fill_payload().await {
                    Ok(()) => batch.push(HttpBody::request(req)),
                    Err(err) => {
                        warn!("decode request body failed: {err}");
                        conn.set_state(Liveness::Error);
                    }
                }
            }
        }

        debug!("request batch decoded: {} request(s)", batch.len());
        batch
    }
}
